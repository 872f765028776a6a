//! Sequence controller - steps in order over one memory

use tracing::debug;

use crate::error::Result;
use crate::pipe::{Pipe, SequenceSpec};
use crate::store::WorkingMemory;

use super::output::PipeOutput;
use super::params::{JobMetadata, PipeRunParams};
use super::router::PipeRouter;

impl PipeRouter {
    /// Each step's result is bound under its name and becomes the main
    /// stuff. A step with `batch_over` maps its pipe over that list. The
    /// first failure aborts the sequence.
    pub(super) async fn run_sequence(
        &self,
        pipe: &Pipe,
        seq: &SequenceSpec,
        mut memory: WorkingMemory,
        params: &PipeRunParams,
        job: &JobMetadata,
    ) -> Result<PipeOutput> {
        for (index, step) in seq.steps.iter().enumerate() {
            let sub_pipe = self.library().pipes().get_required_pipe(&step.pipe_code)?;
            let step_params = params.for_sub_pipe(step.output_multiplicity);
            debug!(
                sequence = pipe.code(),
                step = index,
                sub_pipe = %step.pipe_code,
                "running step"
            );

            let output = match step.batch_params() {
                Some((list_name, item_name)) => {
                    self.map_over_list(
                        pipe,
                        &sub_pipe,
                        list_name,
                        &item_name,
                        memory,
                        &step_params,
                        job,
                        step.result_name.as_deref(),
                    )
                    .await?
                }
                None => {
                    self.run_pipe(
                        &sub_pipe,
                        memory,
                        &step_params,
                        job,
                        step.result_name.as_deref(),
                    )
                    .await?
                }
            };
            memory = output.memory;
        }
        PipeOutput::from_memory(memory)
    }
}
