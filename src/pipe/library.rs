//! PipeLibrary - explicit registry of built pipes

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{PipeError, Result};

use super::definition::Pipe;

/// Pipes keyed by code
#[derive(Debug, Default, Clone)]
pub struct PipeLibrary {
    pipes: FxHashMap<String, Arc<Pipe>>,
}

impl PipeLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pipe(&mut self, pipe: Pipe) -> Result<Arc<Pipe>> {
        if self.pipes.contains_key(pipe.code()) {
            return Err(PipeError::PipeDuplicate {
                pipe_code: pipe.code().to_string(),
            });
        }
        debug!(pipe_code = pipe.code(), kind = pipe.kind().name(), "registering pipe");
        let pipe = Arc::new(pipe);
        self.pipes
            .insert(pipe.code().to_string(), Arc::clone(&pipe));
        Ok(pipe)
    }

    pub fn get(&self, code: &str) -> Option<&Arc<Pipe>> {
        self.pipes.get(code)
    }

    pub fn get_required_pipe(&self, code: &str) -> Result<Arc<Pipe>> {
        self.pipes
            .get(code)
            .cloned()
            .ok_or_else(|| PipeError::PipeNotFound {
                pipe_code: code.to_string(),
            })
    }

    pub fn contains(&self, code: &str) -> bool {
        self.pipes.contains_key(code)
    }

    /// All pipes, sorted by code
    pub fn pipes(&self) -> Vec<Arc<Pipe>> {
        let mut all: Vec<_> = self.pipes.values().cloned().collect();
        all.sort_by(|a, b| a.code().cmp(b.code()));
        all
    }

    pub fn clear(&mut self) {
        self.pipes.clear();
    }

    pub fn len(&self) -> usize {
        self.pipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipes.is_empty()
    }
}
