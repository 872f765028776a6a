//! Builder for pipes - construction is where definitions are checked
//!
//! A pipe that builds is structurally sound: identifiers are well-formed,
//! parallels have an output mode, batches map over a declared input.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::concept::{validate_domain, Concept, NativeConceptCode};
use crate::error::{PipeError, Result};

use super::definition::{OperatorKind, Pipe, PipeKind};
use super::input::{InputRequirement, PipeInputs};
use super::multiplicity::Multiplicity;

/// snake_case pipe code
static PIPE_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").unwrap());

/// Fluent builder for [`Pipe`]
#[derive(Debug, Clone)]
pub struct PipeBuilder {
    code: String,
    domain: String,
    description: String,
    inputs: PipeInputs,
    output: Option<Arc<Concept>>,
    output_multiplicity: Option<Multiplicity>,
}

impl PipeBuilder {
    pub fn new(code: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            domain: domain.into(),
            description: String::new(),
            inputs: PipeInputs::new(),
            output: None,
            output_multiplicity: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn input(mut self, name: impl Into<String>, requirement: InputRequirement) -> Self {
        self.inputs.insert(name, requirement);
        self
    }

    pub fn inputs(mut self, inputs: PipeInputs) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn output(mut self, concept: Arc<Concept>) -> Self {
        self.output = Some(concept);
        self
    }

    pub fn output_multiplicity(mut self, multiplicity: Option<Multiplicity>) -> Self {
        self.output_multiplicity = multiplicity;
        self
    }

    fn definition_error(&self, reason: impl Into<String>) -> PipeError {
        PipeError::PipeDefinition {
            pipe_code: self.code.clone(),
            domain: self.domain.clone(),
            reason: reason.into(),
        }
    }

    /// Check the definition and build the pipe
    pub fn build(self, kind: PipeKind) -> Result<Pipe> {
        if !PIPE_CODE_RE.is_match(&self.code) {
            return Err(self.definition_error("pipe codes must be snake_case"));
        }
        validate_domain(&self.domain)?;
        self.check_kind(&kind)?;

        let output = self
            .output
            .unwrap_or_else(|| Arc::new(Concept::native(NativeConceptCode::Text)));
        Ok(Pipe {
            code: self.code,
            domain: self.domain,
            description: self.description,
            inputs: self.inputs,
            output,
            output_multiplicity: self.output_multiplicity,
            kind,
        })
    }

    fn check_kind(&self, kind: &PipeKind) -> Result<()> {
        match kind {
            PipeKind::Operator(op) => {
                if op.kind == OperatorKind::Func && op.function_name.is_none() {
                    return Err(self.definition_error("function operators need a function_name"));
                }
                if op.kind == OperatorKind::Compose && op.prompt.is_none() {
                    return Err(self.definition_error("compose operators need a template"));
                }
            }
            PipeKind::Sequence(seq) => {
                if seq.steps.is_empty() {
                    return Err(self.definition_error("a sequence needs at least one step"));
                }
            }
            PipeKind::Parallel(par) => {
                if !par.add_each_output && par.combined_output.is_none() {
                    return Err(self.definition_error(
                        "a parallel needs add_each_output or combined_output (or both)",
                    ));
                }
                if par.branches.is_empty() {
                    return Err(self.definition_error("a parallel needs at least one branch"));
                }
                if let Some(branch) = par.branches.iter().find(|b| b.result_name.is_none()) {
                    return Err(self.definition_error(format!(
                        "parallel branch '{}' needs a result name",
                        branch.pipe_code
                    )));
                }
            }
            PipeKind::Condition(cond) => {
                if cond.outcomes.is_empty() && cond.default_outcome.is_none() {
                    return Err(
                        self.definition_error("a condition needs outcomes or a default_outcome")
                    );
                }
            }
            PipeKind::Batch(batch) => {
                if !self.inputs.contains(&batch.input_list_name) {
                    return Err(self.definition_error(format!(
                        "batch list '{}' is not a declared input",
                        batch.input_list_name
                    )));
                }
                if batch.input_list_name == batch.input_item_name {
                    return Err(self.definition_error("batch item and list names must differ"));
                }
            }
        }
        Ok(())
    }
}
