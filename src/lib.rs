//! Pipegraph - declarative pipeline runtime
//!
//! Typed concepts, a named working memory of stuff, and pipes: operators
//! that delegate to injected backends, and controllers (sequence, parallel,
//! condition, batch) that compose other pipes.
//!
//! ```no_run
//! use std::sync::Arc;
//! use pipegraph::{JobMetadata, Library, PipeRouter, RunMode, WorkingMemory};
//!
//! # async fn demo() -> pipegraph::Result<()> {
//! let mut library = Library::new();
//! library.load_file(std::path::Path::new("bundle.yaml"))?;
//! let router = PipeRouter::new(Arc::new(library));
//! let memory = WorkingMemory::new();
//! let output = router
//!     .execute_pipeline("summarize", memory, Some(RunMode::Dry), JobMetadata::default())
//!     .await?;
//! println!("{}", output.main_stuff.content.rendered());
//! # Ok(())
//! # }
//! ```

pub mod blueprint;
pub mod concept;
pub mod config;
pub mod dag;
pub mod error;
pub mod event;
pub mod library;
pub mod pipe;
pub mod runtime;
pub mod store;
pub mod stuff;
pub mod util;

pub use concept::{Concept, ConceptLibrary, NativeConceptCode};
pub use config::RuntimeConfig;
pub use error::{ErrorKind, FixSuggestion, PipeError, Result};
pub use event::{Event, EventKind, EventLog};
pub use library::Library;
pub use pipe::{Pipe, PipeBuilder, PipeKind, PipeLibrary};
pub use runtime::{
    JobMetadata, OperatorBackend, OperatorRegistry, OperatorRequest, PipeOutput, PipeRouter,
    PipeRunParams, RunMode,
};
pub use store::WorkingMemory;
pub use stuff::{Stuff, StuffContent, StuffFactory};
