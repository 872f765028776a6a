//! Pipe definitions - the closed union of pipe kinds
//!
//! A pipe is immutable once built. Operators delegate to a leaf backend;
//! controllers (sequence, parallel, condition, batch) reference other pipes
//! by code through [`SubPipe`] and friends.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::concept::{Concept, ConceptLibrary, NativeConceptCode};
use crate::util::CONTINUE_OUTCOME;

use super::input::{InputRequirement, PipeInputs};
use super::library::PipeLibrary;
use super::multiplicity::Multiplicity;
use super::template::{root_name, Template};

// ═══════════════════════════════════════════════════════════════
// Operators
// ═══════════════════════════════════════════════════════════════

/// Family of leaf operation; selects the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    /// Text or structured generation from a prompt
    Llm,
    /// Image generation from a prompt
    ImgGen,
    /// Extraction of pages from a document (OCR)
    Extract,
    /// Call of a registered function
    Func,
    /// Deterministic composition of a template
    Compose,
}

impl OperatorKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::ImgGen => "img_gen",
            Self::Extract => "extract",
            Self::Func => "func",
            Self::Compose => "compose",
        }
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperatorSpec {
    pub kind: OperatorKind,
    pub prompt: Option<Template>,
    pub system_prompt: Option<Template>,
    /// Registered function name, for `Func`
    pub function_name: Option<String>,
    /// Opaque backend settings (model choice, temperature, ...)
    pub settings: Value,
}

impl OperatorSpec {
    pub fn new(kind: OperatorKind) -> Self {
        Self {
            kind,
            prompt: None,
            system_prompt: None,
            function_name: None,
            settings: Value::Null,
        }
    }

    pub fn with_prompt(mut self, prompt: Template) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: Template) -> Self {
        self.system_prompt = Some(system_prompt);
        self
    }

    pub fn with_function(mut self, function_name: impl Into<String>) -> Self {
        self.function_name = Some(function_name.into());
        self
    }

    pub fn with_settings(mut self, settings: Value) -> Self {
        self.settings = settings;
        self
    }
}

// ═══════════════════════════════════════════════════════════════
// Controllers
// ═══════════════════════════════════════════════════════════════

/// Reference from a controller to another pipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubPipe {
    pub pipe_code: String,
    pub result_name: Option<String>,
    pub batch_over: Option<String>,
    pub batch_as: Option<String>,
    /// Output multiplicity override applied to the called pipe
    pub output_multiplicity: Option<Multiplicity>,
}

impl SubPipe {
    pub fn new(pipe_code: impl Into<String>) -> Self {
        Self {
            pipe_code: pipe_code.into(),
            result_name: None,
            batch_over: None,
            batch_as: None,
            output_multiplicity: None,
        }
    }

    pub fn result(mut self, name: impl Into<String>) -> Self {
        self.result_name = Some(name.into());
        self
    }

    pub fn batch(mut self, over: impl Into<String>, item: Option<&str>) -> Self {
        self.batch_over = Some(over.into());
        self.batch_as = item.map(str::to_string);
        self
    }

    pub fn with_output_multiplicity(mut self, multiplicity: Option<Multiplicity>) -> Self {
        self.output_multiplicity = multiplicity;
        self
    }

    /// `(list name, item name)` when this step maps over a list
    pub fn batch_params(&self) -> Option<(&str, String)> {
        let over = self.batch_over.as_deref()?;
        let item = self
            .batch_as
            .clone()
            .unwrap_or_else(|| format!("{over}_item"));
        Some((over, item))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceSpec {
    pub steps: Vec<SubPipe>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParallelSpec {
    pub branches: Vec<SubPipe>,
    /// Merge each branch result under its own name
    pub add_each_output: bool,
    /// Package all results into one stuff of this concept
    pub combined_output: Option<Arc<Concept>>,
}

/// Expression a condition evaluates to an outcome key
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionExpression {
    /// `{{ stuff.field }}` style template, rendered to the key
    Template(Template),
    /// Bare `stuff.field` path
    Path(String),
}

impl ConditionExpression {
    /// `{{ ... }}` becomes a template, anything else a path
    pub fn parse(expression: &str) -> crate::error::Result<Self> {
        let trimmed = expression.trim();
        if trimmed.contains("{{") || trimmed.contains('$') || trimmed.contains('@') {
            Template::parse(trimmed).map(Self::Template)
        } else {
            crate::util::jsonpath::parse_stuff_path(trimmed)?;
            Ok(Self::Path(trimmed.to_string()))
        }
    }

    pub fn source(&self) -> &str {
        match self {
            Self::Template(t) => t.source(),
            Self::Path(p) => p,
        }
    }

    pub fn required_variables(&self) -> Vec<String> {
        match self {
            Self::Template(t) => t.required_variables(),
            Self::Path(p) => vec![root_name(p).to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionSpec {
    pub expression: ConditionExpression,
    /// Outcome key → pipe code (or `continue`)
    pub outcomes: BTreeMap<String, String>,
    pub default_outcome: Option<String>,
    /// Store the evaluated key as a Text stuff under this name
    pub add_alias_from_expression_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSpec {
    pub branch_pipe_code: String,
    pub input_list_name: String,
    pub input_item_name: String,
}

/// The closed set of pipe kinds
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipeKind {
    Operator(OperatorSpec),
    Sequence(SequenceSpec),
    Parallel(ParallelSpec),
    Condition(ConditionSpec),
    Batch(BatchSpec),
}

impl PipeKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Operator(_) => "operator",
            Self::Sequence(_) => "sequence",
            Self::Parallel(_) => "parallel",
            Self::Condition(_) => "condition",
            Self::Batch(_) => "batch",
        }
    }

    pub fn is_controller(&self) -> bool {
        !matches!(self, Self::Operator(_))
    }
}

// ═══════════════════════════════════════════════════════════════
// Pipe
// ═══════════════════════════════════════════════════════════════

/// A named unit of work with typed inputs and output.
///
/// Built with [`super::PipeBuilder`], which checks the definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pipe {
    pub(super) code: String,
    pub(super) domain: String,
    pub(super) description: String,
    pub(super) inputs: PipeInputs,
    pub(super) output: Arc<Concept>,
    pub(super) output_multiplicity: Option<Multiplicity>,
    pub(super) kind: PipeKind,
}

impl Pipe {
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn inputs(&self) -> &PipeInputs {
        &self.inputs
    }

    pub fn output(&self) -> &Arc<Concept> {
        &self.output
    }

    pub fn output_multiplicity(&self) -> Option<Multiplicity> {
        self.output_multiplicity
    }

    pub fn kind(&self) -> &PipeKind {
        &self.kind
    }

    /// Variables the pipe itself references (template or expression).
    pub fn required_variables(&self) -> Vec<String> {
        match &self.kind {
            PipeKind::Operator(op) => {
                let mut names = Vec::new();
                for template in [&op.prompt, &op.system_prompt].into_iter().flatten() {
                    for name in template.required_variables() {
                        if !names.contains(&name) {
                            names.push(name);
                        }
                    }
                }
                names
            }
            PipeKind::Condition(cond) => cond.expression.required_variables(),
            PipeKind::Sequence(_) | PipeKind::Parallel(_) | PipeKind::Batch(_) => Vec::new(),
        }
    }

    /// Text-compatible inputs that may serve as the prompt of a template-less
    /// operator. System-prompt variables are not candidates.
    pub fn prompt_candidates<'a>(&'a self, concepts: &ConceptLibrary) -> Vec<&'a str> {
        let PipeKind::Operator(op) = &self.kind else {
            return Vec::new();
        };
        let text = concepts.native(NativeConceptCode::Text);
        let in_system: Vec<String> = op
            .system_prompt
            .as_ref()
            .map(Template::required_variables)
            .unwrap_or_default();
        self.inputs
            .iter()
            .filter(|(name, _)| !in_system.iter().any(|n| n == name))
            .filter(|(_, req)| concepts.is_compatible(&req.concept, &text, false))
            .map(|(name, _)| name)
            .collect()
    }

    /// Codes of pipes referenced directly, in declaration order
    pub fn child_pipe_codes(&self) -> Vec<&str> {
        match &self.kind {
            PipeKind::Operator(_) => Vec::new(),
            PipeKind::Sequence(seq) => seq.steps.iter().map(|s| s.pipe_code.as_str()).collect(),
            PipeKind::Parallel(par) => par.branches.iter().map(|b| b.pipe_code.as_str()).collect(),
            PipeKind::Condition(cond) => cond
                .outcomes
                .values()
                .chain(cond.default_outcome.iter())
                .map(String::as_str)
                .filter(|code| *code != CONTINUE_OUTCOME)
                .collect(),
            PipeKind::Batch(batch) => vec![batch.branch_pipe_code.as_str()],
        }
    }

    /// Inputs needed from outside, through nested controllers.
    ///
    /// `visited` holds the codes on the current path; a pipe already on it
    /// contributes nothing, which cuts reference cycles. Sub-pipes missing
    /// from the library are skipped.
    pub fn needed_inputs(
        &self,
        pipes: &PipeLibrary,
        visited: &mut FxHashSet<String>,
    ) -> PipeInputs {
        if !visited.insert(self.code.clone()) {
            return PipeInputs::new();
        }
        let needed = self.collect_needed_inputs(pipes, visited);
        visited.remove(&self.code);
        needed
    }

    fn requirement_for(&self, name: &str) -> InputRequirement {
        self.inputs.get(name).cloned().unwrap_or_else(|| {
            InputRequirement::new(Arc::new(Concept::native(NativeConceptCode::Anything)))
        })
    }

    fn collect_needed_inputs(
        &self,
        pipes: &PipeLibrary,
        visited: &mut FxHashSet<String>,
    ) -> PipeInputs {
        let mut needed = PipeInputs::new();
        match &self.kind {
            PipeKind::Operator(_) => return self.inputs.clone(),
            PipeKind::Sequence(seq) => {
                let mut produced: FxHashSet<&str> = FxHashSet::default();
                for step in &seq.steps {
                    let Some(sub) = pipes.get(&step.pipe_code) else {
                        continue;
                    };
                    let sub_needed = sub.needed_inputs(pipes, visited);
                    let batch = step.batch_params();
                    for (name, requirement) in sub_needed.iter() {
                        let name = match &batch {
                            Some((list, item)) if name == item => *list,
                            _ => name,
                        };
                        if !produced.contains(name) {
                            let requirement = self.requirement_for_or(name, requirement);
                            needed.insert_if_absent(name, &requirement);
                        }
                    }
                    if let Some(result) = step.result_name.as_deref() {
                        produced.insert(result);
                    }
                }
            }
            PipeKind::Parallel(par) => {
                for branch in &par.branches {
                    if let Some(sub) = pipes.get(&branch.pipe_code) {
                        for (name, requirement) in sub.needed_inputs(pipes, visited).iter() {
                            needed.insert_if_absent(name, requirement);
                        }
                    }
                }
            }
            PipeKind::Condition(cond) => {
                for name in cond.expression.required_variables() {
                    needed.insert_if_absent(&name, &self.requirement_for(&name));
                }
                for code in self.child_pipe_codes() {
                    if let Some(sub) = pipes.get(code) {
                        for (name, requirement) in sub.needed_inputs(pipes, visited).iter() {
                            needed.insert_if_absent(name, requirement);
                        }
                    }
                }
            }
            PipeKind::Batch(batch) => {
                needed.insert_if_absent(
                    &batch.input_list_name,
                    &self.requirement_for(&batch.input_list_name),
                );
                if let Some(sub) = pipes.get(&batch.branch_pipe_code) {
                    for (name, requirement) in sub.needed_inputs(pipes, visited).iter() {
                        if name != batch.input_item_name {
                            needed.insert_if_absent(name, requirement);
                        }
                    }
                }
            }
        }
        needed
    }

    /// Own declaration when present, else what the sub-pipe asks for
    fn requirement_for_or(&self, name: &str, fallback: &InputRequirement) -> InputRequirement {
        self.inputs.get(name).cloned().unwrap_or_else(|| fallback.clone())
    }
}

impl fmt::Display for Pipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) [{}]", self.code, self.domain, self.kind.name())
    }
}
