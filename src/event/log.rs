//! Event Log - append-only record of a pipeline run
//!
//! Every invocation's state transitions (`Pending → ValidatingInputs →
//! Running → Completed`, or one of the failure states) are recorded here,
//! together with routing decisions of controllers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::runtime::{PipeRunState, RunMode};

/// Single event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic ID within this log
    pub id: u64,
    /// Milliseconds since the log was created
    pub timestamp_ms: u64,
    pub kind: EventKind,
}

/// Event types, in two levels: pipeline and pipe
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════
    // PIPELINE LEVEL
    // ═══════════════════════════════════════════
    PipelineStarted {
        pipeline_run_id: Arc<str>,
        pipe_code: Arc<str>,
    },
    PipelineCompleted {
        pipeline_run_id: Arc<str>,
        duration_ms: u64,
    },
    PipelineFailed {
        pipeline_run_id: Arc<str>,
        error: String,
        /// Code of the pipe the error originated in
        failed_pipe: Option<Arc<str>>,
    },

    // ═══════════════════════════════════════════
    // PIPE LEVEL
    // ═══════════════════════════════════════════
    PipeState {
        pipe_code: Arc<str>,
        state: PipeRunState,
    },
    ConditionRouted {
        pipe_code: Arc<str>,
        key: String,
        /// Pipe code run, or `continue`
        outcome: String,
    },
    BatchScheduled {
        pipe_code: Arc<str>,
        branch_pipe_code: Arc<str>,
        items: usize,
    },
    ParallelScheduled {
        pipe_code: Arc<str>,
        branches: Vec<Arc<str>>,
    },
    OperatorDelegated {
        pipe_code: Arc<str>,
        operator: String,
        run_mode: RunMode,
    },
}

impl EventKind {
    /// Pipe code this event concerns, if pipe-level
    pub fn pipe_code(&self) -> Option<&str> {
        match self {
            Self::PipeState { pipe_code, .. }
            | Self::ConditionRouted { pipe_code, .. }
            | Self::BatchScheduled { pipe_code, .. }
            | Self::ParallelScheduled { pipe_code, .. }
            | Self::OperatorDelegated { pipe_code, .. } => Some(pipe_code),
            Self::PipelineStarted { .. }
            | Self::PipelineCompleted { .. }
            | Self::PipelineFailed { .. } => None,
        }
    }

    pub fn is_pipeline_event(&self) -> bool {
        matches!(
            self,
            Self::PipelineStarted { .. }
                | Self::PipelineCompleted { .. }
                | Self::PipelineFailed { .. }
        )
    }
}

/// Thread-safe, append-only event log
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event (thread-safe, returns event ID)
    pub fn emit(&self, kind: EventKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event = Event {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        };

        self.events.write().push(event);
        id
    }

    /// All events, cloned
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Zero-copy access to events via callback.
    ///
    /// Holds the read lock for the duration of the callback.
    pub fn with_events<T>(&self, f: impl FnOnce(&[Event]) -> T) -> T {
        f(&self.events.read())
    }

    /// Events concerning one pipe
    pub fn filter_pipe(&self, pipe_code: &str) -> Vec<Event> {
        self.with_events(|events| {
            events
                .iter()
                .filter(|e| e.kind.pipe_code() == Some(pipe_code))
                .cloned()
                .collect()
        })
    }

    /// State transitions recorded for one pipe, in order
    pub fn pipe_states(&self, pipe_code: &str) -> Vec<PipeRunState> {
        self.with_events(|events| {
            events
                .iter()
                .filter_map(|e| match &e.kind {
                    EventKind::PipeState {
                        pipe_code: code,
                        state,
                    } if &**code == pipe_code => Some(*state),
                    _ => None,
                })
                .collect()
        })
    }

    pub fn pipeline_events(&self) -> Vec<Event> {
        self.with_events(|events| {
            events
                .iter()
                .filter(|e| e.kind.is_pipeline_event())
                .cloned()
                .collect()
        })
    }

    /// Serialize to JSON for persistence/debugging
    pub fn to_json(&self) -> Value {
        self.with_events(|events| serde_json::to_value(events).unwrap_or(Value::Null))
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("len", &self.len())
            .finish()
    }
}
