//! Pipe output - the memory after a run and the stuff it produced

use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;
use crate::store::WorkingMemory;
use crate::stuff::Stuff;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipeOutput {
    pub memory: WorkingMemory,
    /// What `main_stuff` resolves to in `memory`
    pub main_stuff: Arc<Stuff>,
}

impl PipeOutput {
    /// Output whose main stuff is the memory's current `main_stuff`
    pub fn from_memory(memory: WorkingMemory) -> Result<Self> {
        let main_stuff = memory.get_main_stuff()?;
        Ok(Self { memory, main_stuff })
    }

    pub fn main_stuff_name(&self) -> Option<&str> {
        self.memory.main_stuff_name()
    }

    pub fn main_stuff_as_str(&self) -> Result<&str> {
        self.main_stuff.as_str()
    }

    pub fn into_memory(self) -> WorkingMemory {
        self.memory
    }
}
