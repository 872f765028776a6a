//! Pipe Module - the pipe abstraction
//!
//! - `definition`: `Pipe` and the closed `PipeKind` union
//! - `builder`: construction with definition checks
//! - `input`: ordered input requirements
//! - `multiplicity`: single / many / exact-count rules
//! - `template`: prompt templates and the variables they reference
//! - `library`: the pipe registry
//! - `validate`: static validation of a loaded library

mod builder;
mod definition;
mod input;
mod library;
mod multiplicity;
pub mod template;
mod validate;

pub use builder::PipeBuilder;
pub use definition::{
    BatchSpec, ConditionExpression, ConditionSpec, OperatorKind, OperatorSpec, ParallelSpec, Pipe,
    PipeKind, SequenceSpec, SubPipe,
};
pub use input::{InputRequirement, PipeInputs};
pub use library::PipeLibrary;
pub use multiplicity::{
    make_variable_multiplicity, output_multiplicity_to_apply, Multiplicity,
    OutputMultiplicityResolution,
};
pub use template::Template;
pub use validate::{validate_library, ValidationReport};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concept::{Concept, NativeConceptCode};
    use rustc_hash::FxHashSet;
    use std::sync::Arc;

    fn text() -> InputRequirement {
        InputRequirement::new(Arc::new(Concept::native(NativeConceptCode::Text)))
    }

    fn llm(code: &str, prompt: &str, inputs: &[&str]) -> Pipe {
        let mut builder = PipeBuilder::new(code, "demo");
        for name in inputs {
            builder = builder.input(*name, text());
        }
        builder
            .build(PipeKind::Operator(
                OperatorSpec::new(OperatorKind::Llm).with_prompt(Template::parse(prompt).unwrap()),
            ))
            .unwrap()
    }

    #[test]
    fn needed_inputs_skip_names_produced_by_earlier_steps() {
        let mut pipes = PipeLibrary::new();
        pipes.add_pipe(llm("draft", "Draft on $topic", &["topic"])).unwrap();
        pipes
            .add_pipe(llm("polish", "Polish $draft for $audience", &["draft", "audience"]))
            .unwrap();
        let sequence = PipeBuilder::new("write", "demo")
            .build(PipeKind::Sequence(SequenceSpec {
                steps: vec![
                    SubPipe::new("draft").result("draft"),
                    SubPipe::new("polish").result("final"),
                ],
            }))
            .unwrap();

        let needed = sequence.needed_inputs(&pipes, &mut FxHashSet::default());
        assert_eq!(needed.names().collect::<Vec<_>>(), vec!["topic", "audience"]);
    }

    #[test]
    fn needed_inputs_map_batch_items_to_lists() {
        let mut pipes = PipeLibrary::new();
        pipes.add_pipe(llm("summarize", "Summarize $page", &["page"])).unwrap();
        let sequence = PipeBuilder::new("summarize_all", "demo")
            .build(PipeKind::Sequence(SequenceSpec {
                steps: vec![SubPipe::new("summarize")
                    .result("summaries")
                    .batch("pages", Some("page"))],
            }))
            .unwrap();

        let needed = sequence.needed_inputs(&pipes, &mut FxHashSet::default());
        assert_eq!(needed.names().collect::<Vec<_>>(), vec!["pages"]);
    }

    #[test]
    fn needed_inputs_terminate_on_cycles() {
        let mut pipes = PipeLibrary::new();
        for (code, next) in [("a", "b"), ("b", "a")] {
            pipes
                .add_pipe(
                    PipeBuilder::new(code, "demo")
                        .build(PipeKind::Sequence(SequenceSpec {
                            steps: vec![SubPipe::new(next).result("x")],
                        }))
                        .unwrap(),
                )
                .unwrap();
        }
        let a = pipes.get_required_pipe("a").unwrap();
        assert!(a.needed_inputs(&pipes, &mut FxHashSet::default()).is_empty());
    }

    #[test]
    fn required_variables_come_from_templates() {
        let pipe = PipeBuilder::new("answer", "demo")
            .input("question", text())
            .input("context", text())
            .build(PipeKind::Operator(
                OperatorSpec::new(OperatorKind::Llm)
                    .with_prompt(Template::parse("Answer $question").unwrap())
                    .with_system_prompt(Template::parse("Use @context").unwrap()),
            ))
            .unwrap();
        assert_eq!(pipe.required_variables(), vec!["question", "context"]);
    }

    #[test]
    fn child_codes_skip_continue() {
        let mut outcomes = std::collections::BTreeMap::new();
        outcomes.insert("yes".to_string(), "accept".to_string());
        outcomes.insert("no".to_string(), "continue".to_string());
        let pipe = PipeBuilder::new("route", "demo")
            .input("verdict", text())
            .build(PipeKind::Condition(ConditionSpec {
                expression: ConditionExpression::parse("verdict").unwrap(),
                outcomes,
                default_outcome: Some("reject".into()),
                add_alias_from_expression_to: None,
            }))
            .unwrap();
        assert_eq!(pipe.child_pipe_codes(), vec!["accept", "reject"]);
    }
}
