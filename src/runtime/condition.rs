//! Condition controller - evaluate a key, run exactly one outcome

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::{PipeError, Result};
use crate::event::EventKind;
use crate::pipe::template::root_name;
use crate::pipe::{ConditionExpression, ConditionSpec, Pipe};
use crate::store::WorkingMemory;
use crate::stuff::{StuffContent, StuffFactory};
use crate::util::CONTINUE_OUTCOME;

use super::output::PipeOutput;
use super::params::{JobMetadata, PipeRunParams};
use super::router::PipeRouter;

impl PipeRouter {
    /// `outcomes[key]`, else the default outcome, else a control-flow error.
    ///
    /// The `continue` outcome runs nothing: memory passes through and the
    /// main stuff stays as it was. Without one, the first stuff the
    /// expression reads becomes the main stuff, or the routed key itself
    /// when the expression reads nothing.
    pub(super) async fn run_condition(
        &self,
        pipe: &Pipe,
        cond: &ConditionSpec,
        mut memory: WorkingMemory,
        params: &PipeRunParams,
        job: &JobMetadata,
    ) -> Result<PipeOutput> {
        let key = evaluate_expression(pipe, &cond.expression, &memory)?;
        let outcome = cond
            .outcomes
            .get(&key)
            .or(cond.default_outcome.as_ref())
            .ok_or_else(|| PipeError::ConditionUnmatched {
                pipe_code: pipe.code().to_string(),
                domain: pipe.domain().to_string(),
                key: key.clone(),
            })?
            .clone();

        self.event_log().emit(EventKind::ConditionRouted {
            pipe_code: Arc::from(pipe.code()),
            key: key.clone(),
            outcome: outcome.clone(),
        });
        debug!(condition = pipe.code(), %key, %outcome, "condition routed");

        let factory = StuffFactory::new(self.library().concepts());
        if let Some(alias) = cond.add_alias_from_expression_to.as_deref() {
            let stuff = factory.make_stuff(
                StuffContent::text(key.as_str()),
                None,
                Some(alias),
                None,
            )?;
            memory.add_new_stuff(alias, stuff)?;
        }

        if outcome == CONTINUE_OUTCOME {
            if memory.main_stuff_name().is_none() {
                let source = cond
                    .expression
                    .required_variables()
                    .into_iter()
                    .find(|name| memory.contains(name));
                match source {
                    Some(name) => memory.set_main_stuff_name(&name)?,
                    None => {
                        let content = StuffContent::text(key.as_str());
                        let stuff = factory.make_stuff(content, None, None, None)?;
                        memory.set_new_main_stuff(stuff, None)?;
                    }
                }
            }
            return PipeOutput::from_memory(memory);
        }

        let branch = self.library().pipes().get_required_pipe(&outcome)?;
        // The branch output is the condition's output: forward the override
        self.run_pipe(&branch, memory, params, job, None).await
    }
}

/// Evaluate a condition expression to an outcome key
fn evaluate_expression(
    pipe: &Pipe,
    expression: &ConditionExpression,
    memory: &WorkingMemory,
) -> Result<String> {
    let evaluation_error = |reason: String| PipeError::ConditionExpression {
        pipe_code: pipe.code().to_string(),
        domain: pipe.domain().to_string(),
        expression: expression.source().to_string(),
        reason,
    };

    match expression {
        ConditionExpression::Template(template) => template
            .render(memory)
            .map(|rendered| rendered.trim().to_string())
            .map_err(|e| evaluation_error(e.to_string())),
        ConditionExpression::Path(path) => {
            if !memory.contains(root_name(path)) {
                return Err(evaluation_error(format!(
                    "stuff '{}' is not in working memory",
                    root_name(path)
                )));
            }
            memory
                .resolve_path(path)
                .map(|value| value_to_key(&value))
                .map_err(|e| evaluation_error(e.to_string()))
        }
    }
}

/// Outcome key of a JSON value: strings verbatim, everything else as JSON
fn value_to_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}
