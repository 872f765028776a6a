//! Run parameters threaded through every pipe invocation

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tokio_util::sync::CancellationToken;

use crate::error::{PipeError, Result};
use crate::pipe::Multiplicity;

/// Whether operators reach their backends or produce placeholders
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Live,
    /// Deterministic placeholder content, no I/O
    Dry,
}

impl RunMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Dry => "dry",
        }
    }

    pub fn is_dry(&self) -> bool {
        matches!(self, Self::Dry)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = PipeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "dry" => Ok(Self::Dry),
            other => Err(PipeError::Config {
                reason: format!("unknown run mode '{other}', expected 'live' or 'dry'"),
            }),
        }
    }
}

/// Lifecycle of one pipe invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipeRunState {
    Pending,
    ValidatingInputs,
    FailedMissingInput,
    Running,
    Completed,
    Failed,
}

impl PipeRunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::FailedMissingInput | Self::Completed | Self::Failed
        )
    }
}

/// Codes of the pipes currently running, outermost first
pub type PipeStack = SmallVec<[Arc<str>; 8]>;

/// Per-invocation parameters.
///
/// Cheap to clone; controllers derive a copy for each child call.
#[derive(Debug, Clone)]
pub struct PipeRunParams {
    pub run_mode: RunMode,
    /// Override of the called pipe's output multiplicity
    pub output_multiplicity: Option<Multiplicity>,
    pipe_stack: PipeStack,
    cancellation: CancellationToken,
}

impl PipeRunParams {
    pub fn new(run_mode: RunMode) -> Self {
        Self {
            run_mode,
            output_multiplicity: None,
            pipe_stack: PipeStack::new(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_output_multiplicity(mut self, multiplicity: Option<Multiplicity>) -> Self {
        self.output_multiplicity = multiplicity;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn pipe_stack(&self) -> &[Arc<str>] {
        &self.pipe_stack
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Params for running `pipe_code` one level deeper.
    ///
    /// Fails once the stack already holds `max_depth` pipes.
    pub fn enter(&self, pipe_code: &str, max_depth: usize) -> Result<Self> {
        if self.pipe_stack.len() >= max_depth {
            let stack = self
                .pipe_stack
                .iter()
                .map(|code| &**code)
                .chain(std::iter::once(pipe_code))
                .collect::<Vec<_>>()
                .join(" → ");
            return Err(PipeError::PipeStackOverflow {
                pipe_code: pipe_code.to_string(),
                limit: max_depth,
                stack,
            });
        }
        let mut entered = self.clone();
        entered.pipe_stack.push(Arc::from(pipe_code));
        Ok(entered)
    }

    /// Params for a sub-pipe call with its own multiplicity override
    pub fn for_sub_pipe(&self, output_multiplicity: Option<Multiplicity>) -> Self {
        self.clone().with_output_multiplicity(output_multiplicity)
    }
}

/// Correlation context for one pipeline run. Never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobMetadata {
    pub pipeline_run_id: Arc<str>,
    pub job_name: Option<String>,
}

impl JobMetadata {
    /// Fresh run id (uuid v4)
    pub fn new(job_name: Option<&str>) -> Self {
        Self {
            pipeline_run_id: Arc::from(uuid::Uuid::new_v4().to_string()),
            job_name: job_name.map(str::to_string),
        }
    }

    pub fn with_run_id(run_id: impl Into<Arc<str>>, job_name: Option<&str>) -> Self {
        Self {
            pipeline_run_id: run_id.into(),
            job_name: job_name.map(str::to_string),
        }
    }
}

impl Default for JobMetadata {
    fn default() -> Self {
        Self::new(None)
    }
}
