//! DAG Module - static dependency ordering of pipe bundles
//!
//! - `sort`: cycle detection and pre-order listing of pipe codes, each pipe
//!   ahead of the sub-pipes it references
//!
//! Works on declared references only, never on runtime state.

mod sort;

pub use sort::{sort_pipes_by_dependencies, PipeReferences};
