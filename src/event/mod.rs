//! Event Module - audit trail of pipeline runs
//!
//! Key types:
//! - `Event`: Envelope with id + timestamp + kind
//! - `EventKind`: pipeline-level and pipe-level variants
//! - `EventLog`: Thread-safe, append-only log

mod log;

pub use log::{Event, EventKind, EventLog};
