//! Batch controller - map a pipe over every item of a list

use std::sync::Arc;

use tracing::debug;

use crate::error::{PipeError, Result};
use crate::event::EventKind;
use crate::pipe::{BatchSpec, Pipe};
use crate::store::WorkingMemory;
use crate::stuff::{StuffContent, StuffFactory};

use super::fanout::ChildRun;
use super::output::PipeOutput;
use super::params::{JobMetadata, PipeRunParams};
use super::router::PipeRouter;

impl PipeRouter {
    pub(super) async fn run_batch(
        &self,
        pipe: &Pipe,
        batch: &BatchSpec,
        memory: WorkingMemory,
        params: &PipeRunParams,
        job: &JobMetadata,
        output_name: Option<&str>,
    ) -> Result<PipeOutput> {
        let branch = self
            .library()
            .pipes()
            .get_required_pipe(&batch.branch_pipe_code)?;
        self.map_over_list(
            pipe,
            &branch,
            &batch.input_list_name,
            &batch.input_item_name,
            memory,
            params,
            job,
            output_name,
        )
        .await
    }

    /// Run `branch` once per item of `list_name`, each item bound as
    /// `item_name` in its own memory copy.
    ///
    /// Outputs are collected in input order into one list stuff of the
    /// branch's output concept. An empty list yields an empty list without
    /// invoking the branch. Any item failure fails the whole batch.
    #[allow(clippy::too_many_arguments)]
    pub(super) async fn map_over_list(
        &self,
        owner: &Pipe,
        branch: &Arc<Pipe>,
        list_name: &str,
        item_name: &str,
        mut memory: WorkingMemory,
        params: &PipeRunParams,
        job: &JobMetadata,
        output_name: Option<&str>,
    ) -> Result<PipeOutput> {
        let batch_error = |reason: String| PipeError::BatchInput {
            pipe_code: owner.code().to_string(),
            domain: owner.domain().to_string(),
            input: list_name.to_string(),
            reason,
        };

        let list = memory
            .get_optional_stuff(list_name)
            .ok_or_else(|| batch_error("not found in working memory".to_string()))?;
        let StuffContent::List(items) = &list.content else {
            return Err(batch_error(format!(
                "expected a list, got {} content",
                list.content.kind_name()
            )));
        };

        self.event_log().emit(EventKind::BatchScheduled {
            pipe_code: Arc::from(owner.code()),
            branch_pipe_code: Arc::from(branch.code()),
            items: items.items.len(),
        });
        debug!(
            batch = owner.code(),
            branch = branch.code(),
            items = items.items.len(),
            "batch scheduled"
        );

        let factory = StuffFactory::new(self.library().concepts());
        let children = items
            .items
            .iter()
            .map(|item| {
                let item_stuff = factory.make_stuff_with_concept(
                    Arc::clone(&list.concept),
                    item.clone(),
                    Some(item_name),
                    None,
                )?;
                let mut item_memory = memory.clone();
                item_memory.add_new_stuff(item_name, item_stuff)?;
                Ok(ChildRun {
                    pipe: Arc::clone(branch),
                    memory: item_memory,
                    output_name: None,
                    // The override shapes the batch result, never the items
                    output_multiplicity: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let outputs = if children.is_empty() {
            Vec::new()
        } else {
            let limit = self.settings().max_batch_concurrency;
            self.join_children(owner, children, params, job, limit)
                .await?
        };

        let results = outputs
            .into_iter()
            .map(|output| output.main_stuff.content.clone())
            .collect();
        let stuff = factory.make_stuff_with_concept(
            Arc::clone(branch.output()),
            StuffContent::list(results),
            None,
            None,
        )?;
        memory.set_new_main_stuff(stuff, output_name)?;
        PipeOutput::from_memory(memory)
    }
}
