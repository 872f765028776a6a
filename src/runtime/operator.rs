//! Operator backends - the injected leaf capability
//!
//! Operators never do I/O themselves: each operator family is served by an
//! [`OperatorBackend`] registered in an [`OperatorRegistry`]. Backends are
//! cached lock-free in a `DashMap`, so the registry can be shared by every
//! concurrently running branch.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::concept::Concept;
use crate::error::BoxError;
use crate::pipe::{OperatorKind, OutputMultiplicityResolution};
use crate::stuff::{Stuff, StuffContent};

use super::params::JobMetadata;

/// Everything a backend needs to produce an operator's output
#[derive(Debug, Clone)]
pub struct OperatorRequest {
    pub pipe_code: String,
    pub domain: String,
    pub operator: OperatorKind,
    /// Declared inputs, resolved, in declaration order
    pub inputs: Vec<(String, Arc<Stuff>)>,
    pub prompt: Option<String>,
    pub system_prompt: Option<String>,
    pub function_name: Option<String>,
    pub settings: Value,
    pub output_concept: Arc<Concept>,
    pub multiplicity: OutputMultiplicityResolution,
    pub job: JobMetadata,
}

impl OperatorRequest {
    pub fn input(&self, name: &str) -> Option<&Arc<Stuff>> {
        self.inputs
            .iter()
            .find(|(input_name, _)| input_name == name)
            .map(|(_, stuff)| stuff)
    }
}

/// Leaf capability serving one operator family
#[async_trait]
pub trait OperatorBackend: Send + Sync {
    /// Produce new content for the request.
    ///
    /// When `request.multiplicity.is_multiple_enabled` the content should be
    /// a list.
    async fn run(&self, request: OperatorRequest) -> Result<StuffContent, BoxError>;
}

/// Backends by operator family
#[derive(Clone, Default)]
pub struct OperatorRegistry {
    backends: Arc<DashMap<OperatorKind, Arc<dyn OperatorBackend>>>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the backend of an operator family
    pub fn register(&self, kind: OperatorKind, backend: Arc<dyn OperatorBackend>) {
        self.backends.insert(kind, backend);
    }

    pub fn unregister(&self, kind: OperatorKind) -> Option<Arc<dyn OperatorBackend>> {
        self.backends.remove(&kind).map(|(_, backend)| backend)
    }

    pub fn get(&self, kind: OperatorKind) -> Option<Arc<dyn OperatorBackend>> {
        self.backends.get(&kind).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, kind: OperatorKind) -> bool {
        self.backends.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl std::fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.backends.iter().map(|e| e.key().as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("OperatorRegistry")
            .field("backends", &kinds)
            .finish()
    }
}

/// Synchronous function callable by `PipeFunc` pipes
pub type PipeFunction =
    Arc<dyn Fn(&OperatorRequest) -> Result<StuffContent, BoxError> + Send + Sync>;

/// Backend for the `func` family: dispatches on `function_name`
#[derive(Clone, Default)]
pub struct FunctionBackend {
    functions: Arc<DashMap<String, PipeFunction>>,
}

impl FunctionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, name: impl Into<String>, function: F)
    where
        F: Fn(&OperatorRequest) -> Result<StuffContent, BoxError> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

#[async_trait]
impl OperatorBackend for FunctionBackend {
    async fn run(&self, request: OperatorRequest) -> Result<StuffContent, BoxError> {
        let name = request
            .function_name
            .as_deref()
            .ok_or("request carries no function name")?;
        // Clone out of the map so no shard lock is held while the function runs
        let function = self
            .functions
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| format!("function '{name}' is not registered"))?;
        function(&request)
    }
}
