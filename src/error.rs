// The #[error] attribute from thiserror uses struct fields via string interpolation,
// but Rust's unused_assignments lint doesn't recognize this.
#![allow(unused_assignments)]

//! Pipegraph Error Types with Error Codes
//!
//! Error code ranges:
//! - PIPE-000-019: Concept definition errors
//! - PIPE-020-039: Pipe definition errors
//! - PIPE-040-059: Input resolution / working memory errors
//! - PIPE-060-069: Leaf (operator backend) errors
//! - PIPE-070-089: Control-flow errors
//! - PIPE-090-099: Config / IO errors

use std::fmt;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipeError>;

/// Boxed error returned by operator backends
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// Broad error category, used for reporting and downgrade decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Fatal at load/validate time
    Definition,
    /// Fatal per invocation, fixable by the caller
    InputResolution,
    /// Failure inside a delegated operator call
    Leaf,
    /// Unmatched condition, failed branch, cancellation
    ControlFlow,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Definition => "definition",
            Self::InputResolution => "input_resolution",
            Self::Leaf => "leaf",
            Self::ControlFlow => "control_flow",
            Self::Config => "config",
        };
        f.write_str(s)
    }
}

/// Static validation failures that may be downgraded to log/ignore by config.
///
/// Nothing outside this enum can be downgraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaticValidationKind {
    InadequateInputConcept,
    MissingInputVariable,
    ExtraneousInputVariable,
    AmbiguousInputCandidate,
}

impl fmt::Display for StaticValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InadequateInputConcept => "inadequate_input_concept",
            Self::MissingInputVariable => "missing_input_variable",
            Self::ExtraneousInputVariable => "extraneous_input_variable",
            Self::AmbiguousInputCandidate => "ambiguous_input_candidate",
        };
        f.write_str(s)
    }
}

/// All error variants are part of the public API.
///
/// Implements both `thiserror::Error` for std error compatibility
/// and `miette::Diagnostic` for fancy terminal error display.
#[derive(Error, Debug, Diagnostic)]
pub enum PipeError {
    // ═══════════════════════════════════════════
    // CONCEPT ERRORS (000-019)
    // ═══════════════════════════════════════════
    #[error("[PIPE-001] Invalid concept code '{code}': {reason}")]
    #[diagnostic(
        code(pipegraph::concept_code),
        help("Concept codes are PascalCase identifiers, e.g. 'Invoice' or 'ProductSummary'")
    )]
    ConceptCode { code: String, reason: String },

    #[error("[PIPE-002] Invalid domain '{domain}': {reason}")]
    #[diagnostic(
        code(pipegraph::domain),
        help("Domains are snake_case identifiers, e.g. 'finance' or 'customer_support'")
    )]
    Domain { domain: String, reason: String },

    #[error("[PIPE-003] Concept '{concept}' not found")]
    #[diagnostic(code(pipegraph::concept_not_found))]
    ConceptNotFound { concept: String },

    #[error("[PIPE-004] Concept code '{code}' is ambiguous, candidates: {}", .candidates.join(", "))]
    #[diagnostic(
        code(pipegraph::concept_ambiguous),
        help("Qualify the concept with its domain, e.g. 'domain.Code'")
    )]
    ConceptAmbiguous { code: String, candidates: Vec<String> },

    #[error("[PIPE-005] Concept '{concept}' refines itself: {chain}")]
    #[diagnostic(code(pipegraph::refinement_cycle))]
    RefinementCycle { concept: String, chain: String },

    #[error("[PIPE-006] Refinement chain of '{concept}' exceeds {max_depth} levels")]
    #[diagnostic(code(pipegraph::refinement_too_deep))]
    RefinementTooDeep { concept: String, max_depth: usize },

    #[error("[PIPE-007] Concept '{concept}' is already registered")]
    #[diagnostic(code(pipegraph::concept_duplicate))]
    ConceptDuplicate { concept: String },

    #[error("[PIPE-010] Structure class '{class_name}' not found")]
    #[diagnostic(
        code(pipegraph::structure_not_found),
        help("Register the structure's JSON schema before loading concepts that use it")
    )]
    StructureNotFound { class_name: String },

    #[error("[PIPE-011] Invalid JSON schema for structure '{class_name}': {details}")]
    #[diagnostic(code(pipegraph::structure_schema))]
    StructureSchema { class_name: String, details: String },

    #[error("[PIPE-012] Content does not match structure of concept '{concept}': {details}")]
    #[diagnostic(code(pipegraph::structure_invalid))]
    StructureInvalid { concept: String, details: String },

    // ═══════════════════════════════════════════
    // PIPE DEFINITION ERRORS (020-039)
    // ═══════════════════════════════════════════
    #[error("[PIPE-020] Pipe '{pipe_code}' not found")]
    #[diagnostic(code(pipegraph::pipe_not_found))]
    PipeNotFound { pipe_code: String },

    #[error("[PIPE-021] Invalid definition of pipe '{pipe_code}' ({domain}): {reason}")]
    #[diagnostic(code(pipegraph::pipe_definition))]
    PipeDefinition {
        pipe_code: String,
        domain: String,
        reason: String,
    },

    #[error("[PIPE-022] Cycle detected in pipe dependencies: {cycle}")]
    #[diagnostic(
        code(pipegraph::dependency_cycle),
        help("Controllers cannot reference themselves, directly or through other controllers")
    )]
    DependencyCycle { cycle: String },

    #[error("[PIPE-023] Static validation of pipe '{pipe_code}' ({domain}) failed [{kind}]: {explanation}")]
    #[diagnostic(code(pipegraph::static_validation))]
    StaticValidation {
        pipe_code: String,
        domain: String,
        kind: StaticValidationKind,
        explanation: String,
    },

    #[error("[PIPE-024] Pipe '{pipe_code}' already registered")]
    #[diagnostic(code(pipegraph::pipe_duplicate))]
    PipeDuplicate { pipe_code: String },

    // ═══════════════════════════════════════════
    // INPUT RESOLUTION ERRORS (040-059)
    // ═══════════════════════════════════════════
    #[error("[PIPE-040] Pipe '{pipe_code}' ({domain}) is missing required inputs: {}", .missing.join(", "))]
    #[diagnostic(
        code(pipegraph::missing_inputs),
        help("Add the listed stuff to working memory before running the pipe")
    )]
    MissingInputs {
        pipe_code: String,
        domain: String,
        missing: Vec<String>,
    },

    #[error("[PIPE-041] Input '{variable}' of pipe '{pipe_code}' ({domain}) expects concept '{expected}', got '{actual}'")]
    #[diagnostic(code(pipegraph::concept_mismatch))]
    ConceptMismatch {
        pipe_code: String,
        domain: String,
        variable: String,
        expected: String,
        actual: String,
    },

    #[error("[PIPE-042] Stuff '{name}' not found in working memory")]
    #[diagnostic(code(pipegraph::stuff_not_found))]
    StuffNotFound { name: String },

    #[error("[PIPE-043] Stuff '{name}' has {actual} content, expected {expected}")]
    #[diagnostic(code(pipegraph::stuff_type))]
    StuffTypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("[PIPE-044] Alias '{alias}' would create a cycle: {chain}")]
    #[diagnostic(code(pipegraph::alias_cycle))]
    AliasCycle { alias: String, chain: String },

    #[error("[PIPE-045] Alias '{alias}' exceeds {max_hops} hops")]
    #[diagnostic(code(pipegraph::alias_too_deep))]
    AliasTooDeep { alias: String, max_hops: usize },

    #[error("[PIPE-048] Name '{name}' is {reason}")]
    #[diagnostic(code(pipegraph::name_conflict))]
    NameConflict { name: String, reason: String },

    #[error("[PIPE-046] Cannot make stuff: {reason}")]
    #[diagnostic(code(pipegraph::stuff_factory))]
    StuffFactory { reason: String },

    #[error("[PIPE-047] Invalid path syntax: {path}")]
    #[diagnostic(
        code(pipegraph::invalid_path),
        help("Use stuff.field.subfield or stuff.items[0].field")
    )]
    InvalidPath { path: String },

    // ═══════════════════════════════════════════
    // LEAF ERRORS (060-069)
    // ═══════════════════════════════════════════
    #[error("[PIPE-060] Operator pipe '{pipe_code}' ({domain}) failed: {explanation}")]
    #[diagnostic(code(pipegraph::leaf_failed))]
    Leaf {
        pipe_code: String,
        domain: String,
        explanation: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("[PIPE-061] No backend registered for operator '{operator}' (pipe '{pipe_code}', {domain})")]
    #[diagnostic(
        code(pipegraph::backend_missing),
        help("Register a backend for this operator or run in dry mode")
    )]
    BackendMissing {
        pipe_code: String,
        domain: String,
        operator: String,
    },

    // ═══════════════════════════════════════════
    // CONTROL-FLOW ERRORS (070-089)
    // ═══════════════════════════════════════════
    #[error("[PIPE-070] Condition pipe '{pipe_code}' ({domain}) has no outcome for '{key}' and no default")]
    #[diagnostic(
        code(pipegraph::condition_unmatched),
        help("Add the key to outcomes or declare a default_outcome")
    )]
    ConditionUnmatched {
        pipe_code: String,
        domain: String,
        key: String,
    },

    #[error("[PIPE-071] Condition expression '{expression}' of pipe '{pipe_code}' could not be evaluated: {reason}")]
    #[diagnostic(code(pipegraph::condition_expression))]
    ConditionExpression {
        pipe_code: String,
        domain: String,
        expression: String,
        reason: String,
    },

    #[error("[PIPE-072] Batch input '{input}' of pipe '{pipe_code}' ({domain}): {reason}")]
    #[diagnostic(code(pipegraph::batch_input))]
    BatchInput {
        pipe_code: String,
        domain: String,
        input: String,
        reason: String,
    },

    #[error("[PIPE-073] Pipe '{pipe_code}' ({domain}) was cancelled")]
    #[diagnostic(code(pipegraph::cancelled))]
    Cancelled { pipe_code: String, domain: String },

    #[error("[PIPE-074] Branch of pipe '{pipe_code}' ({domain}) panicked: {reason}")]
    #[diagnostic(code(pipegraph::branch_panicked))]
    BranchPanicked {
        pipe_code: String,
        domain: String,
        reason: String,
    },

    #[error("[PIPE-075] Pipe stack exceeded {limit} levels at '{pipe_code}': {stack}")]
    #[diagnostic(
        code(pipegraph::pipe_stack_overflow),
        help("Check for controllers that recursively call each other at run time")
    )]
    PipeStackOverflow {
        pipe_code: String,
        limit: usize,
        stack: String,
    },

    // ═══════════════════════════════════════════
    // CONFIG / IO ERRORS (090-099)
    // ═══════════════════════════════════════════
    #[error("[PIPE-090] Configuration error: {reason}")]
    #[diagnostic(code(pipegraph::config))]
    Config { reason: String },

    #[error("[PIPE-091] Failed to parse bundle: {details}")]
    #[diagnostic(code(pipegraph::bundle_parse), help("Check YAML syntax: indentation and quoting"))]
    BundleParse { details: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipeError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConceptCode { .. }
            | Self::Domain { .. }
            | Self::ConceptNotFound { .. }
            | Self::RefinementCycle { .. }
            | Self::RefinementTooDeep { .. }
            | Self::ConceptDuplicate { .. }
            | Self::StructureNotFound { .. }
            | Self::StructureSchema { .. }
            | Self::PipeNotFound { .. }
            | Self::PipeDefinition { .. }
            | Self::DependencyCycle { .. }
            | Self::StaticValidation { .. }
            | Self::PipeDuplicate { .. } => ErrorKind::Definition,

            Self::ConceptAmbiguous { .. }
            | Self::StructureInvalid { .. }
            | Self::MissingInputs { .. }
            | Self::ConceptMismatch { .. }
            | Self::StuffNotFound { .. }
            | Self::StuffTypeMismatch { .. }
            | Self::AliasCycle { .. }
            | Self::AliasTooDeep { .. }
            | Self::StuffFactory { .. }
            | Self::InvalidPath { .. }
            | Self::NameConflict { .. } => ErrorKind::InputResolution,

            Self::Leaf { .. } | Self::BackendMissing { .. } => ErrorKind::Leaf,

            Self::ConditionUnmatched { .. }
            | Self::ConditionExpression { .. }
            | Self::BatchInput { .. }
            | Self::Cancelled { .. }
            | Self::BranchPanicked { .. }
            | Self::PipeStackOverflow { .. } => ErrorKind::ControlFlow,

            Self::Config { .. } | Self::BundleParse { .. } | Self::Io(_) => ErrorKind::Config,
        }
    }

    /// Code of the pipe the error originated in, if any
    pub fn pipe_code(&self) -> Option<&str> {
        match self {
            Self::PipeNotFound { pipe_code }
            | Self::PipeDefinition { pipe_code, .. }
            | Self::StaticValidation { pipe_code, .. }
            | Self::PipeDuplicate { pipe_code }
            | Self::MissingInputs { pipe_code, .. }
            | Self::ConceptMismatch { pipe_code, .. }
            | Self::Leaf { pipe_code, .. }
            | Self::BackendMissing { pipe_code, .. }
            | Self::ConditionUnmatched { pipe_code, .. }
            | Self::ConditionExpression { pipe_code, .. }
            | Self::BatchInput { pipe_code, .. }
            | Self::Cancelled { pipe_code, .. }
            | Self::BranchPanicked { pipe_code, .. }
            | Self::PipeStackOverflow { pipe_code, .. } => Some(pipe_code),
            _ => None,
        }
    }

    /// Domain of the pipe the error originated in, if any
    pub fn domain(&self) -> Option<&str> {
        match self {
            Self::PipeDefinition { domain, .. }
            | Self::StaticValidation { domain, .. }
            | Self::MissingInputs { domain, .. }
            | Self::ConceptMismatch { domain, .. }
            | Self::Leaf { domain, .. }
            | Self::BackendMissing { domain, .. }
            | Self::ConditionUnmatched { domain, .. }
            | Self::ConditionExpression { domain, .. }
            | Self::BatchInput { domain, .. }
            | Self::Cancelled { domain, .. }
            | Self::BranchPanicked { domain, .. } => Some(domain),
            _ => None,
        }
    }

    /// Names of missing inputs, for `MissingInputs` errors
    pub fn missing_inputs(&self) -> Option<&[String]> {
        match self {
            Self::MissingInputs { missing, .. } => Some(missing),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl FixSuggestion for PipeError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            PipeError::ConceptCode { .. } => Some("Use a PascalCase concept code"),
            PipeError::Domain { .. } => Some("Use a snake_case domain name"),
            PipeError::ConceptNotFound { .. } => {
                Some("Declare the concept in the bundle or use a native concept")
            }
            PipeError::ConceptAmbiguous { .. } => Some("Qualify the concept as 'domain.Code'"),
            PipeError::RefinementCycle { .. } => {
                Some("Remove the circular refines: a concept cannot refine itself")
            }
            PipeError::StructureNotFound { .. } => Some("Register the structure class schema"),
            PipeError::StructureInvalid { .. } => {
                Some("Fix the content to match the concept's structure schema")
            }
            PipeError::PipeNotFound { .. } => Some("Verify the pipe code exists in the bundle"),
            PipeError::DependencyCycle { .. } => {
                Some("Break the cycle between the listed controllers")
            }
            PipeError::MissingInputs { .. } => {
                Some("Provide every listed input in working memory")
            }
            PipeError::ConceptMismatch { .. } => {
                Some("Pass stuff whose concept equals or refines the expected concept")
            }
            PipeError::ConditionUnmatched { .. } => Some("Declare a default_outcome"),
            PipeError::BackendMissing { .. } => Some("Register a backend or use --dry"),
            PipeError::Config { .. } => Some("Check ~/.config/pipegraph/config.toml"),
            PipeError::BundleParse { .. } => Some("Check YAML syntax: indentation and quoting"),
            PipeError::Io(_) => Some("Check file path and permissions"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_inputs_lists_every_name() {
        let err = PipeError::MissingInputs {
            pipe_code: "summarize".into(),
            domain: "docs".into(),
            missing: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.kind(), ErrorKind::InputResolution);
        assert_eq!(err.missing_inputs().unwrap(), ["a", "b"]);
        assert!(err.to_string().contains("PIPE-040"));
        assert!(err.to_string().contains("a, b"));
    }

    #[test]
    fn leaf_errors_carry_pipe_and_domain() {
        let err = PipeError::Leaf {
            pipe_code: "extract".into(),
            domain: "invoices".into(),
            explanation: "boom".into(),
            source: None,
        };
        assert_eq!(err.kind(), ErrorKind::Leaf);
        assert_eq!(err.pipe_code(), Some("extract"));
        assert_eq!(err.domain(), Some("invoices"));
    }

    #[test]
    fn control_flow_errors_are_classified() {
        let err = PipeError::ConditionUnmatched {
            pipe_code: "route".into(),
            domain: "d".into(),
            key: "x".into(),
        };
        assert_eq!(err.kind(), ErrorKind::ControlFlow);
        assert!(err.fix_suggestion().is_some());
    }

    #[test]
    fn ambiguity_names_candidates() {
        let err = PipeError::ConceptAmbiguous {
            code: "Invoice".into(),
            candidates: vec!["billing.Invoice".into(), "finance.Invoice".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("billing.Invoice"));
        assert!(msg.contains("finance.Invoice"));
    }
}
