//! Fan-out - concurrent child runs joined in declared order
//!
//! Shared by parallel branches and batch items:
//! - JoinSet for parallel task collection
//! - results sorted by index, never completion order
//! - fail-fast: the first failure cancels the siblings' token and aborts
//!   the set; no partial output is returned

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::error::{PipeError, Result};
use crate::pipe::{Multiplicity, Pipe};
use crate::store::WorkingMemory;

use super::output::PipeOutput;
use super::params::{JobMetadata, PipeRunParams};
use super::router::PipeRouter;

/// One child invocation, with its own isolated memory
pub(super) struct ChildRun {
    pub pipe: Arc<Pipe>,
    pub memory: WorkingMemory,
    pub output_name: Option<String>,
    pub output_multiplicity: Option<Multiplicity>,
}

impl PipeRouter {
    /// Run every child concurrently; outputs come back in input order.
    ///
    /// `limit` bounds how many children run at once.
    pub(super) async fn join_children(
        &self,
        owner: &Pipe,
        children: Vec<ChildRun>,
        params: &PipeRunParams,
        job: &JobMetadata,
        limit: Option<usize>,
    ) -> Result<Vec<PipeOutput>> {
        let total = children.len();
        let token = params.cancellation().child_token();
        let semaphore = limit.map(|n| Arc::new(Semaphore::new(n.max(1))));
        let mut join_set = JoinSet::new();

        for (index, child) in children.into_iter().enumerate() {
            let router = self.clone();
            let job = job.clone();
            let semaphore = semaphore.clone();
            let child_params = params
                .for_sub_pipe(child.output_multiplicity)
                .with_cancellation(token.clone());

            join_set.spawn(async move {
                let _permit = match semaphore {
                    Some(semaphore) => match semaphore.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => {
                            let cancelled = PipeError::Cancelled {
                                pipe_code: child.pipe.code().to_string(),
                                domain: child.pipe.domain().to_string(),
                            };
                            return (index, Err(cancelled));
                        }
                    },
                    None => None,
                };
                let result = router
                    .run_pipe(
                        &child.pipe,
                        child.memory,
                        &child_params,
                        &job,
                        child.output_name.as_deref(),
                    )
                    .await;
                (index, result)
            });
        }

        let mut outputs: Vec<(usize, PipeOutput)> = Vec::with_capacity(total);
        while let Some(joined) = join_set.join_next().await {
            let failure = match joined {
                Ok((index, Ok(output))) => {
                    outputs.push((index, output));
                    continue;
                }
                Ok((index, Err(e))) => {
                    debug!(owner = owner.code(), index, error = %e, "child failed");
                    e
                }
                Err(join_error) if join_error.is_panic() => PipeError::BranchPanicked {
                    pipe_code: owner.code().to_string(),
                    domain: owner.domain().to_string(),
                    reason: join_error.to_string(),
                },
                Err(_) => PipeError::Cancelled {
                    pipe_code: owner.code().to_string(),
                    domain: owner.domain().to_string(),
                },
            };
            token.cancel();
            join_set.abort_all();
            return Err(failure);
        }

        outputs.sort_by_key(|(index, _)| *index);
        Ok(outputs.into_iter().map(|(_, output)| output).collect())
    }
}
