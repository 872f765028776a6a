//! Parallel controller - branches on isolated memory copies

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::Result;
use crate::event::EventKind;
use crate::pipe::{ParallelSpec, Pipe};
use crate::store::WorkingMemory;
use crate::stuff::StuffFactory;

use super::fanout::ChildRun;
use super::output::PipeOutput;
use super::params::{JobMetadata, PipeRunParams};
use super::router::PipeRouter;

impl PipeRouter {
    /// Every branch gets its own copy of memory; results are merged by this
    /// task alone once all branches have settled.
    ///
    /// The main stuff is the combined stuff when configured, else the result
    /// of the last declared branch.
    pub(super) async fn run_parallel(
        &self,
        pipe: &Pipe,
        par: &ParallelSpec,
        mut memory: WorkingMemory,
        params: &PipeRunParams,
        job: &JobMetadata,
        output_name: Option<&str>,
    ) -> Result<PipeOutput> {
        let children = par
            .branches
            .iter()
            .map(|branch| {
                Ok(ChildRun {
                    pipe: self.library().pipes().get_required_pipe(&branch.pipe_code)?,
                    memory: memory.clone(),
                    output_name: branch.result_name.clone(),
                    output_multiplicity: branch.output_multiplicity,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        self.event_log().emit(EventKind::ParallelScheduled {
            pipe_code: Arc::from(pipe.code()),
            branches: par
                .branches
                .iter()
                .map(|b| Arc::from(b.pipe_code.as_str()))
                .collect(),
        });

        let outputs = self.join_children(pipe, children, params, job, None).await?;

        // Declared order; builder guarantees a result name per branch
        let results: Vec<(&str, _)> = par
            .branches
            .iter()
            .zip(outputs)
            .map(|(branch, output)| {
                let name = branch.result_name.as_deref().unwrap_or(&branch.pipe_code);
                (name, output.main_stuff)
            })
            .collect();

        if par.add_each_output {
            for (name, stuff) in &results {
                memory.add_new_stuff(name, Arc::clone(stuff))?;
            }
        }

        match &par.combined_output {
            Some(concept) => {
                let fields: Map<String, Value> = results
                    .iter()
                    .map(|(name, stuff)| (name.to_string(), stuff.content.to_json()))
                    .collect();
                let factory = StuffFactory::new(self.library().concepts());
                let content = factory.content_from_value(concept, Value::Object(fields))?;
                let combined =
                    factory.make_stuff_with_concept(Arc::clone(concept), content, None, None)?;
                let name = memory.set_new_main_stuff(combined, output_name)?;
                debug!(parallel = pipe.code(), combined = %name, "branches combined");
            }
            None => {
                if let Some((last, _)) = results.last() {
                    memory.set_main_stuff_name(last)?;
                }
            }
        }
        PipeOutput::from_memory(memory)
    }
}
