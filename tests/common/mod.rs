//! Shared helpers for integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pipegraph::blueprint::BundleBlueprint;
use pipegraph::config::RunSettings;
use pipegraph::error::BoxError;
use pipegraph::pipe::OperatorKind;
use pipegraph::{
    Library, OperatorBackend, OperatorRegistry, OperatorRequest, PipeRouter, StuffContent,
    StuffFactory, WorkingMemory,
};

// ═══════════════════════════════════════════════════════════════
// Libraries and memories
// ═══════════════════════════════════════════════════════════════

pub fn library(yaml: &str) -> Library {
    let mut library = Library::new();
    let bundle = BundleBlueprint::from_yaml(yaml).expect("bundle parses");
    library.load_bundle(&bundle).expect("bundle loads");
    library
}

pub fn router(yaml: &str) -> PipeRouter {
    PipeRouter::new(Arc::new(library(yaml)))
}

/// Router whose `llm` family is served by `backend`
pub fn router_with_backend(
    yaml: &str,
    backend: Arc<EchoBackend>,
    settings: RunSettings,
) -> PipeRouter {
    let operators = OperatorRegistry::new();
    operators.register(OperatorKind::Llm, backend);
    router(yaml).with_operators(operators).with_settings(settings)
}

/// Memory holding native Text stuff under the given names
pub fn text_memory(library: &Library, entries: &[(&str, &str)]) -> WorkingMemory {
    let factory = StuffFactory::new(library.concepts());
    let mut memory = WorkingMemory::new();
    for (name, text) in entries {
        let stuff = factory
            .make_stuff(StuffContent::text(*text), None, Some(name), None)
            .expect("text stuff");
        memory.add_new_stuff(name, stuff).expect("stored");
    }
    memory
}

/// Memory holding one list of Text stuff
pub fn text_list_memory(library: &Library, name: &str, items: &[&str]) -> WorkingMemory {
    let factory = StuffFactory::new(library.concepts());
    let content = StuffContent::list(items.iter().map(|t| StuffContent::text(*t)).collect());
    let stuff = factory
        .make_stuff(content, Some("Text"), Some(name), None)
        .expect("list stuff");
    let mut memory = WorkingMemory::new();
    memory.add_new_stuff(name, stuff).expect("stored");
    memory
}

// ═══════════════════════════════════════════════════════════════
// Backends
// ═══════════════════════════════════════════════════════════════

/// Echoes `pipe_code:prompt`, steered by the pipe's settings:
/// - `delay_ms`: sleep before answering
/// - `delay_from_prompt`: sleep as many ms as the prompt says
/// - `fail`: answer with an error
/// - `fail_on`: answer with an error when the prompt equals this value
#[derive(Default)]
pub struct EchoBackend {
    pub started: AtomicUsize,
    pub completed: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl EchoBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl OperatorBackend for EchoBackend {
    async fn run(&self, request: OperatorRequest) -> Result<StuffContent, BoxError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let prompt = request.prompt.clone().unwrap_or_default();
        let mut delay = request
            .settings
            .get("delay_ms")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        if request.settings.get("delay_from_prompt").and_then(|v| v.as_bool()) == Some(true) {
            delay = prompt.trim().parse().unwrap_or(0);
        }
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let fail_on = request.settings.get("fail_on").and_then(|v| v.as_str());
        if request.settings.get("fail").and_then(|v| v.as_bool()) == Some(true)
            || fail_on == Some(prompt.as_str())
        {
            return Err(format!("{} refused", request.pipe_code).into());
        }
        self.completed.fetch_add(1, Ordering::SeqCst);

        let answer = format!("{}:{}", request.pipe_code, prompt);
        if request.multiplicity.is_multiple_enabled {
            let count = request.multiplicity.specific_count.unwrap_or(2).max(0) as usize;
            return Ok(StuffContent::list(
                (0..count)
                    .map(|i| StuffContent::text(format!("{answer}#{i}")))
                    .collect(),
            ));
        }
        Ok(StuffContent::text(answer))
    }
}
