//! Runtime Module - pipe execution
//!
//! - `router`: input resolution, dispatch by pipe kind, output binding
//! - `sequence` / `parallel` / `condition` / `batch`: the controllers
//! - `fanout`: concurrent child runs with fail-fast cancellation
//! - `operator`: the injected leaf backends
//! - `dry_run`: deterministic placeholder content
//! - `params` / `output`: what goes in and comes out of a run

mod batch;
mod condition;
mod dry_run;
mod fanout;
mod operator;
mod output;
mod parallel;
mod params;
mod router;
mod sequence;

pub use dry_run::DryRunGenerator;
pub use operator::{
    FunctionBackend, OperatorBackend, OperatorRegistry, OperatorRequest, PipeFunction,
};
pub use output::PipeOutput;
pub use params::{JobMetadata, PipeRunParams, PipeRunState, PipeStack, RunMode};
pub use router::PipeRouter;
