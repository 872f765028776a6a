//! Static validation of a pipe library
//!
//! Runs after a bundle is loaded, before anything executes. Unknown sub-pipe
//! references are always fatal; the four static-validation kinds follow the
//! configured reaction (raise, log, ignore).

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use crate::concept::{Concept, ConceptLibrary, NativeConceptCode};
use crate::config::{ValidationConfig, ValidationReaction};
use crate::error::{PipeError, Result, StaticValidationKind};

use super::definition::{OperatorKind, Pipe, PipeKind};
use super::input::InputRequirement;
use super::library::PipeLibrary;

/// Findings that were downgraded instead of raised
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub checked: usize,
    pub logged: Vec<PipeError>,
    pub ignored: usize,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.logged.is_empty() && self.ignored == 0
    }
}

struct Validator<'a> {
    concepts: &'a ConceptLibrary,
    pipes: &'a PipeLibrary,
    reactions: &'a ValidationConfig,
    report: ValidationReport,
}

/// Validate every pipe of a library, in code order
pub fn validate_library(
    concepts: &ConceptLibrary,
    pipes: &PipeLibrary,
    reactions: &ValidationConfig,
) -> Result<ValidationReport> {
    let mut validator = Validator {
        concepts,
        pipes,
        reactions,
        report: ValidationReport::default(),
    };
    for pipe in pipes.pipes() {
        validator.check_pipe(&pipe)?;
        validator.report.checked += 1;
    }
    debug!(
        checked = validator.report.checked,
        logged = validator.report.logged.len(),
        ignored = validator.report.ignored,
        "static validation done"
    );
    Ok(validator.report)
}

impl Validator<'_> {
    fn finding(
        &mut self,
        pipe: &Pipe,
        kind: StaticValidationKind,
        explanation: String,
    ) -> Result<()> {
        let error = PipeError::StaticValidation {
            pipe_code: pipe.code().to_string(),
            domain: pipe.domain().to_string(),
            kind,
            explanation,
        };
        match self.reactions.reaction(kind) {
            ValidationReaction::Raise => Err(error),
            ValidationReaction::Log => {
                warn!(pipe_code = pipe.code(), %kind, "{error}");
                self.report.logged.push(error);
                Ok(())
            }
            ValidationReaction::Ignore => {
                self.report.ignored += 1;
                Ok(())
            }
        }
    }

    fn check_pipe(&mut self, pipe: &Pipe) -> Result<()> {
        for code in pipe.child_pipe_codes() {
            if !self.pipes.contains(code) {
                return Err(PipeError::PipeNotFound {
                    pipe_code: code.to_string(),
                });
            }
        }

        match pipe.kind() {
            PipeKind::Operator(op) => self.check_operator(pipe, op.kind, op.prompt.is_some()),
            PipeKind::Sequence(seq) => {
                let mut available: FxHashMap<String, Arc<Concept>> = pipe
                    .inputs()
                    .iter()
                    .map(|(name, req)| (name.to_string(), Arc::clone(&req.concept)))
                    .collect();
                for step in &seq.steps {
                    let sub = self.pipes.get_required_pipe(&step.pipe_code)?;
                    let batch = step.batch_params();
                    let needed = sub.needed_inputs(self.pipes, &mut FxHashSet::default());
                    for (name, requirement) in needed.iter() {
                        match &batch {
                            Some((list, item)) if name == item => {
                                self.check_available(pipe, &available, list, requirement)?;
                            }
                            _ => self.check_available(pipe, &available, name, requirement)?,
                        }
                    }
                    if let Some(result) = &step.result_name {
                        available.insert(result.clone(), Arc::clone(sub.output()));
                    }
                }
                Ok(())
            }
            PipeKind::Parallel(par) => {
                let available = self.declared(pipe);
                for branch in &par.branches {
                    let sub = self.pipes.get_required_pipe(&branch.pipe_code)?;
                    let needed = sub.needed_inputs(self.pipes, &mut FxHashSet::default());
                    for (name, requirement) in needed.iter() {
                        self.check_available(pipe, &available, name, requirement)?;
                    }
                }
                Ok(())
            }
            PipeKind::Condition(cond) => {
                for name in cond.expression.required_variables() {
                    if !pipe.inputs().contains(&name) {
                        self.finding(
                            pipe,
                            StaticValidationKind::MissingInputVariable,
                            format!(
                                "expression '{}' uses undeclared '{name}'",
                                cond.expression.source()
                            ),
                        )?;
                    }
                }
                Ok(())
            }
            PipeKind::Batch(batch) => {
                let sub = self.pipes.get_required_pipe(&batch.branch_pipe_code)?;
                let mut available = self.declared(pipe);
                if let Some(list) = pipe.inputs().get(&batch.input_list_name) {
                    available.insert(batch.input_item_name.clone(), Arc::clone(&list.concept));
                }
                let needed = sub.needed_inputs(self.pipes, &mut FxHashSet::default());
                for (name, requirement) in needed.iter() {
                    self.check_available(pipe, &available, name, requirement)?;
                }
                Ok(())
            }
        }
    }

    fn declared(&self, pipe: &Pipe) -> FxHashMap<String, Arc<Concept>> {
        pipe.inputs()
            .iter()
            .map(|(name, req)| (name.to_string(), Arc::clone(&req.concept)))
            .collect()
    }

    fn check_available(
        &mut self,
        pipe: &Pipe,
        available: &FxHashMap<String, Arc<Concept>>,
        name: &str,
        requirement: &InputRequirement,
    ) -> Result<()> {
        match available.get(name) {
            None => self.finding(
                pipe,
                StaticValidationKind::MissingInputVariable,
                format!(
                    "'{name}' is needed by a sub-pipe but neither declared nor produced earlier"
                ),
            ),
            Some(concept) if !self.concepts.is_compatible(concept, &requirement.concept, false) => {
                self.finding(
                    pipe,
                    StaticValidationKind::InadequateInputConcept,
                    format!(
                        "'{name}' is '{concept}' but a sub-pipe expects '{}'",
                        requirement.concept
                    ),
                )
            }
            Some(_) => Ok(()),
        }
    }

    fn check_operator(&mut self, pipe: &Pipe, kind: OperatorKind, has_prompt: bool) -> Result<()> {
        let referenced = pipe.required_variables();
        for name in &referenced {
            if !pipe.inputs().contains(name) {
                self.finding(
                    pipe,
                    StaticValidationKind::MissingInputVariable,
                    format!("template references undeclared input '{name}'"),
                )?;
            }
        }

        let text = self.concepts.native(NativeConceptCode::Text);
        let unused_text_inputs: Vec<&str> = pipe
            .inputs()
            .iter()
            .filter(|(name, _)| !referenced.iter().any(|r| r == name))
            .filter(|(_, req)| self.concepts.is_compatible(&req.concept, &text, false))
            .map(|(name, _)| name)
            .collect();

        match kind {
            OperatorKind::Llm | OperatorKind::ImgGen | OperatorKind::Compose if has_prompt => {
                for name in unused_text_inputs {
                    self.finding(
                        pipe,
                        StaticValidationKind::ExtraneousInputVariable,
                        format!("input '{name}' is declared but never used by the template"),
                    )?;
                }
            }
            OperatorKind::Llm | OperatorKind::ImgGen => {
                let candidates = pipe.prompt_candidates(self.concepts);
                if candidates.len() > 1 {
                    self.finding(
                        pipe,
                        StaticValidationKind::AmbiguousInputCandidate,
                        format!(
                            "no prompt template and several text inputs could be the prompt: {}",
                            candidates.join(", ")
                        ),
                    )?;
                }
            }
            OperatorKind::Compose | OperatorKind::Extract | OperatorKind::Func => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::{OperatorSpec, PipeBuilder, SequenceSpec, SubPipe, Template};

    fn text() -> InputRequirement {
        InputRequirement::new(Arc::new(Concept::native(NativeConceptCode::Text)))
    }

    fn number() -> InputRequirement {
        InputRequirement::new(Arc::new(Concept::native(NativeConceptCode::Number)))
    }

    fn llm(code: &str, prompt: Option<&str>, inputs: &[(&str, InputRequirement)]) -> Pipe {
        let mut builder = PipeBuilder::new(code, "demo");
        for (name, req) in inputs {
            builder = builder.input(*name, req.clone());
        }
        let mut spec = OperatorSpec::new(OperatorKind::Llm);
        if let Some(prompt) = prompt {
            spec = spec.with_prompt(Template::parse(prompt).unwrap());
        }
        builder.build(PipeKind::Operator(spec)).unwrap()
    }

    fn library(pipes: Vec<Pipe>) -> PipeLibrary {
        let mut library = PipeLibrary::new();
        for pipe in pipes {
            library.add_pipe(pipe).unwrap();
        }
        library
    }

    #[test]
    fn clean_library_passes() {
        let concepts = ConceptLibrary::new();
        let pipes = library(vec![llm("greet", Some("Hi $name"), &[("name", text())])]);
        let report = validate_library(&concepts, &pipes, &ValidationConfig::default()).unwrap();
        assert_eq!(report.checked, 1);
        assert!(report.is_clean());
    }

    #[test]
    fn undeclared_template_variable_raises() {
        let concepts = ConceptLibrary::new();
        let pipes = library(vec![llm("greet", Some("Hi $name"), &[])]);
        let err = validate_library(&concepts, &pipes, &ValidationConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            PipeError::StaticValidation {
                kind: StaticValidationKind::MissingInputVariable,
                ..
            }
        ));
    }

    #[test]
    fn extraneous_input_can_be_downgraded_to_log() {
        let concepts = ConceptLibrary::new();
        let pipes = library(vec![llm(
            "greet",
            Some("Hi $name"),
            &[("name", text()), ("unused", text())],
        )]);
        let reactions = ValidationConfig {
            extraneous_input_variable: ValidationReaction::Log,
            ..Default::default()
        };
        let report = validate_library(&concepts, &pipes, &reactions).unwrap();
        assert_eq!(report.logged.len(), 1);
    }

    #[test]
    fn ambiguous_prompt_candidate_is_reported() {
        let concepts = ConceptLibrary::new();
        let pipes = library(vec![llm("guess", None, &[("a", text()), ("b", text())])]);
        let reactions = ValidationConfig {
            ambiguous_input_candidate: ValidationReaction::Ignore,
            ..Default::default()
        };
        let report = validate_library(&concepts, &pipes, &reactions).unwrap();
        assert_eq!(report.ignored, 1);
    }

    #[test]
    fn unknown_sub_pipe_is_always_fatal() {
        let concepts = ConceptLibrary::new();
        let seq = PipeBuilder::new("flow", "demo")
            .build(PipeKind::Sequence(SequenceSpec {
                steps: vec![SubPipe::new("ghost")],
            }))
            .unwrap();
        let pipes = library(vec![seq]);
        let reactions = ValidationConfig {
            missing_input_variable: ValidationReaction::Ignore,
            ..Default::default()
        };
        let err = validate_library(&concepts, &pipes, &reactions).unwrap_err();
        assert!(matches!(err, PipeError::PipeNotFound { .. }));
    }

    #[test]
    fn sequence_wiring_checks_concepts() {
        let concepts = ConceptLibrary::new();
        let count = llm("count", Some("Count $n"), &[("n", number())]);
        let describe = llm("describe", Some("Describe $topic"), &[("topic", text())]);
        let seq = PipeBuilder::new("flow", "demo")
            .input("topic", text())
            .build(PipeKind::Sequence(SequenceSpec {
                steps: vec![
                    SubPipe::new("describe").result("n"),
                    SubPipe::new("count").result("total"),
                ],
            }))
            .unwrap();
        let pipes = library(vec![count, describe, seq]);
        let err = validate_library(&concepts, &pipes, &ValidationConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            PipeError::StaticValidation {
                kind: StaticValidationKind::InadequateInputConcept,
                ..
            }
        ));
    }
}
