//! Store Module - working memory
//!
//! Key types:
//! - `WorkingMemory`: named stuff with an alias layer and the `main_stuff`
//!   convention, cloned per concurrent branch

mod memory;

pub use memory::WorkingMemory;
