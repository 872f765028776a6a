//! Pipe router - resolves inputs, dispatches by kind, binds the output
//!
//! Every invocation walks `Pending → ValidatingInputs → Running →
//! Completed`, or ends in `FailedMissingInput` / `Failed`. Transitions are
//! recorded in the event log.
//!
//! Controllers recurse through [`PipeRouter::run_pipe`], which returns a
//! boxed future. The router is cheap to clone (everything behind `Arc`), so
//! fan-out controllers move a clone into each spawned task.

use std::sync::Arc;
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use tracing::{debug, debug_span, info, instrument, warn, Instrument};

use crate::config::RunSettings;
use crate::error::{PipeError, Result};
use crate::event::{EventKind, EventLog};
use crate::library::Library;
use crate::pipe::{
    output_multiplicity_to_apply, OperatorKind, OperatorSpec, OutputMultiplicityResolution, Pipe,
    PipeKind, Template,
};
use crate::store::WorkingMemory;
use crate::stuff::{Stuff, StuffContent, StuffFactory};

use super::dry_run::DryRunGenerator;
use super::operator::{OperatorRegistry, OperatorRequest};
use super::output::PipeOutput;
use super::params::{JobMetadata, PipeRunParams, PipeRunState, RunMode};

/// Executes pipes of one library
#[derive(Clone)]
pub struct PipeRouter {
    library: Arc<Library>,
    operators: OperatorRegistry,
    settings: Arc<RunSettings>,
    event_log: EventLog,
}

impl PipeRouter {
    pub fn new(library: Arc<Library>) -> Self {
        Self {
            library,
            operators: OperatorRegistry::new(),
            settings: Arc::new(RunSettings::default()),
            event_log: EventLog::new(),
        }
    }

    pub fn with_operators(mut self, operators: OperatorRegistry) -> Self {
        self.operators = operators;
        self
    }

    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    pub fn with_event_log(mut self, event_log: EventLog) -> Self {
        self.event_log = event_log;
        self
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn operators(&self) -> &OperatorRegistry {
        &self.operators
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    // ═══════════════════════════════════════════════════════════════
    // Entry points
    // ═══════════════════════════════════════════════════════════════

    /// Run a pipe by code as a whole pipeline.
    ///
    /// `run_mode` defaults to the configured mode.
    #[instrument(skip(self, memory, job), fields(pipeline_run_id = %job.pipeline_run_id))]
    pub async fn execute_pipeline(
        &self,
        pipe_code: &str,
        memory: WorkingMemory,
        run_mode: Option<RunMode>,
        job: JobMetadata,
    ) -> Result<PipeOutput> {
        let pipe = self.library.pipes().get_required_pipe(pipe_code)?;
        let params = PipeRunParams::new(run_mode.unwrap_or(self.settings.default_run_mode));

        self.event_log.emit(EventKind::PipelineStarted {
            pipeline_run_id: Arc::clone(&job.pipeline_run_id),
            pipe_code: Arc::from(pipe_code),
        });
        info!(pipe_code, run_mode = %params.run_mode, "pipeline started");
        let start = Instant::now();

        let result = self.run_pipe(&pipe, memory, &params, &job, None).await;

        match &result {
            Ok(output) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                self.event_log.emit(EventKind::PipelineCompleted {
                    pipeline_run_id: Arc::clone(&job.pipeline_run_id),
                    duration_ms,
                });
                info!(
                    pipe_code,
                    duration_ms,
                    main_stuff = output.main_stuff_name().unwrap_or_default(),
                    "pipeline completed"
                );
            }
            Err(e) => {
                self.event_log.emit(EventKind::PipelineFailed {
                    pipeline_run_id: Arc::clone(&job.pipeline_run_id),
                    error: e.to_string(),
                    failed_pipe: e.pipe_code().map(Arc::from),
                });
                warn!(pipe_code, error = %e, "pipeline failed");
            }
        }
        result
    }

    /// Run one pipe against `memory`.
    ///
    /// The produced stuff is stored under `output_name` (or a name derived
    /// from its concept) and becomes the main stuff.
    pub fn run_pipe<'a>(
        &'a self,
        pipe: &'a Arc<Pipe>,
        memory: WorkingMemory,
        params: &'a PipeRunParams,
        job: &'a JobMetadata,
        output_name: Option<&'a str>,
    ) -> BoxFuture<'a, Result<PipeOutput>> {
        let span = debug_span!(
            "run_pipe",
            pipe_code = %pipe.code(),
            kind = pipe.kind().name(),
            pipeline_run_id = %job.pipeline_run_id,
        );
        async move {
            let code: Arc<str> = Arc::from(pipe.code());
            self.emit_state(&code, PipeRunState::Pending);

            let result = self
                .execute(pipe, &code, memory, params, job, output_name)
                .await;

            let state = match &result {
                Ok(_) => PipeRunState::Completed,
                Err(PipeError::MissingInputs { .. }) => PipeRunState::FailedMissingInput,
                Err(_) => PipeRunState::Failed,
            };
            self.emit_state(&code, state);
            result
        }
        .instrument(span)
        .boxed()
    }

    /// Run a pipe looked up by code
    pub async fn run_pipe_code(
        &self,
        pipe_code: &str,
        memory: WorkingMemory,
        params: &PipeRunParams,
        job: &JobMetadata,
        output_name: Option<&str>,
    ) -> Result<PipeOutput> {
        let pipe = self.library.pipes().get_required_pipe(pipe_code)?;
        self.run_pipe(&pipe, memory, params, job, output_name).await
    }

    async fn execute(
        &self,
        pipe: &Arc<Pipe>,
        code: &Arc<str>,
        memory: WorkingMemory,
        params: &PipeRunParams,
        job: &JobMetadata,
        output_name: Option<&str>,
    ) -> Result<PipeOutput> {
        let params = params.enter(pipe.code(), self.settings.max_pipe_depth)?;
        if params.is_cancelled() {
            return Err(PipeError::Cancelled {
                pipe_code: pipe.code().to_string(),
                domain: pipe.domain().to_string(),
            });
        }

        self.emit_state(code, PipeRunState::ValidatingInputs);
        let inputs = self.resolve_inputs(pipe, &memory)?;

        self.emit_state(code, PipeRunState::Running);
        debug!(inputs = inputs.len(), run_mode = %params.run_mode, "dispatching");

        let output = match pipe.kind() {
            PipeKind::Operator(op) => {
                self.run_operator(pipe, op, inputs, memory, &params, job, output_name)
                    .await?
            }
            PipeKind::Sequence(seq) => self.run_sequence(pipe, seq, memory, &params, job).await?,
            PipeKind::Parallel(par) => {
                self.run_parallel(pipe, par, memory, &params, job, output_name)
                    .await?
            }
            PipeKind::Condition(cond) => {
                self.run_condition(pipe, cond, memory, &params, job).await?
            }
            PipeKind::Batch(batch) => {
                self.run_batch(pipe, batch, memory, &params, job, output_name)
                    .await?
            }
        };

        bind_output(output, output_name)
    }

    // ═══════════════════════════════════════════════════════════════
    // Inputs
    // ═══════════════════════════════════════════════════════════════

    /// Resolve every declared input.
    ///
    /// All missing names are reported together; present inputs must be
    /// compatible (non-strict) with the declared concept.
    fn resolve_inputs(
        &self,
        pipe: &Pipe,
        memory: &WorkingMemory,
    ) -> Result<Vec<(String, Arc<Stuff>)>> {
        let mut resolved = Vec::with_capacity(pipe.inputs().len());
        let mut missing = Vec::new();
        for (name, _) in pipe.inputs().iter() {
            match memory.get_optional_stuff(name) {
                Some(stuff) => resolved.push((name.to_string(), stuff)),
                None => missing.push(name.to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(PipeError::MissingInputs {
                pipe_code: pipe.code().to_string(),
                domain: pipe.domain().to_string(),
                missing,
            });
        }

        let concepts = self.library.concepts();
        for (name, stuff) in &resolved {
            let Some(requirement) = pipe.inputs().get(name) else {
                continue;
            };
            if !concepts.is_compatible(&stuff.concept, &requirement.concept, false) {
                return Err(PipeError::ConceptMismatch {
                    pipe_code: pipe.code().to_string(),
                    domain: pipe.domain().to_string(),
                    variable: name.clone(),
                    expected: requirement.concept.concept_string(),
                    actual: stuff.concept.concept_string(),
                });
            }
        }
        Ok(resolved)
    }

    // ═══════════════════════════════════════════════════════════════
    // Operators
    // ═══════════════════════════════════════════════════════════════

    #[allow(clippy::too_many_arguments)]
    async fn run_operator(
        &self,
        pipe: &Pipe,
        op: &OperatorSpec,
        inputs: Vec<(String, Arc<Stuff>)>,
        mut memory: WorkingMemory,
        params: &PipeRunParams,
        job: &JobMetadata,
        output_name: Option<&str>,
    ) -> Result<PipeOutput> {
        let multiplicity =
            output_multiplicity_to_apply(pipe.output_multiplicity(), params.output_multiplicity);
        self.event_log.emit(EventKind::OperatorDelegated {
            pipe_code: Arc::from(pipe.code()),
            operator: op.kind.to_string(),
            run_mode: params.run_mode,
        });

        let factory = StuffFactory::new(self.library.concepts());
        let content = match (params.run_mode, op.kind) {
            (RunMode::Dry, _) => {
                DryRunGenerator::new(self.library.concepts(), self.settings.dry_run_list_size)
                    .content_for(pipe.output(), &multiplicity, pipe.code())
            }
            (RunMode::Live, OperatorKind::Compose) => {
                let rendered = match &op.prompt {
                    Some(template) => {
                        template.render(&memory).map_err(|e| leaf_error(pipe, e))?
                    }
                    None => String::new(),
                };
                factory
                    .content_from_value(pipe.output(), Value::String(rendered))
                    .map_err(|e| leaf_error(pipe, e))?
            }
            (RunMode::Live, _) => {
                let request = self.operator_request(pipe, op, inputs, &memory, multiplicity, job)?;
                self.delegate(pipe, request, params).await?
            }
        };

        let content = shape_output(pipe, content, &multiplicity)?;
        let stuff = factory
            .make_stuff_with_concept(Arc::clone(pipe.output()), content, None, None)
            .map_err(|e| leaf_error(pipe, e))?;
        let name = memory.set_new_main_stuff(stuff, output_name)?;
        debug!(stored_as = %name, "operator output stored");
        PipeOutput::from_memory(memory)
    }

    fn operator_request(
        &self,
        pipe: &Pipe,
        op: &OperatorSpec,
        inputs: Vec<(String, Arc<Stuff>)>,
        memory: &WorkingMemory,
        multiplicity: OutputMultiplicityResolution,
        job: &JobMetadata,
    ) -> Result<OperatorRequest> {
        let render =
            |template: &Template| template.render(memory).map_err(|e| leaf_error(pipe, e));
        let prompt = match &op.prompt {
            Some(template) => Some(render(template)?),
            // Template-less: the single text-compatible input is the prompt
            None => match pipe.prompt_candidates(self.library.concepts()).as_slice() {
                [only] => Some(
                    memory
                        .stuff_ref(only)
                        .map_err(|e| leaf_error(pipe, e))?
                        .content
                        .rendered(),
                ),
                _ => None,
            },
        };
        let system_prompt = op.system_prompt.as_ref().map(render).transpose()?;

        Ok(OperatorRequest {
            pipe_code: pipe.code().to_string(),
            domain: pipe.domain().to_string(),
            operator: op.kind,
            inputs,
            prompt,
            system_prompt,
            function_name: op.function_name.clone(),
            settings: op.settings.clone(),
            output_concept: Arc::clone(pipe.output()),
            multiplicity,
            job: job.clone(),
        })
    }

    /// Hand the request to the backend, racing cancellation
    async fn delegate(
        &self,
        pipe: &Pipe,
        request: OperatorRequest,
        params: &PipeRunParams,
    ) -> Result<StuffContent> {
        let backend =
            self.operators
                .get(request.operator)
                .ok_or_else(|| PipeError::BackendMissing {
                    pipe_code: pipe.code().to_string(),
                    domain: pipe.domain().to_string(),
                    operator: request.operator.to_string(),
                })?;

        tokio::select! {
            biased;
            _ = params.cancellation().cancelled() => Err(PipeError::Cancelled {
                pipe_code: pipe.code().to_string(),
                domain: pipe.domain().to_string(),
            }),
            result = backend.run(request) => result.map_err(|source| PipeError::Leaf {
                pipe_code: pipe.code().to_string(),
                domain: pipe.domain().to_string(),
                explanation: source.to_string(),
                source: Some(source),
            }),
        }
    }

    fn emit_state(&self, pipe_code: &Arc<str>, state: PipeRunState) {
        self.event_log.emit(EventKind::PipeState {
            pipe_code: Arc::clone(pipe_code),
            state,
        });
    }
}

impl std::fmt::Debug for PipeRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeRouter")
            .field("pipes", &self.library.pipes().len())
            .field("operators", &self.operators)
            .field("settings", &self.settings)
            .finish()
    }
}

/// Store the main stuff under the caller's name and re-point `main_stuff`
fn bind_output(mut output: PipeOutput, output_name: Option<&str>) -> Result<PipeOutput> {
    let Some(name) = output_name else {
        return Ok(output);
    };
    if output.memory.main_stuff_name() == Some(name) {
        return Ok(output);
    }
    output
        .memory
        .add_new_stuff(name, Arc::clone(&output.main_stuff))?;
    output.memory.set_main_stuff_name(name)?;
    output.main_stuff = output.memory.get_main_stuff()?;
    Ok(output)
}

/// Check backend content against the resolved multiplicity
fn shape_output(
    pipe: &Pipe,
    content: StuffContent,
    multiplicity: &OutputMultiplicityResolution,
) -> Result<StuffContent> {
    let shape_error = |explanation: String| PipeError::Leaf {
        pipe_code: pipe.code().to_string(),
        domain: pipe.domain().to_string(),
        explanation,
        source: None,
    };

    if !multiplicity.is_multiple_enabled {
        return match content {
            StuffContent::List(_) => Err(shape_error(
                "expected a single item, got a list".to_string(),
            )),
            single => Ok(single),
        };
    }

    let items = match content {
        StuffContent::List(list) => list.items,
        single => vec![single],
    };
    if let Some(expected) = multiplicity.specific_count.filter(|n| *n >= 0) {
        if items.len() as i64 != expected {
            return Err(shape_error(format!(
                "expected {expected} items, got {}",
                items.len()
            )));
        }
    }
    Ok(StuffContent::list(items))
}

fn leaf_error(pipe: &Pipe, error: PipeError) -> PipeError {
    PipeError::Leaf {
        pipe_code: pipe.code().to_string(),
        domain: pipe.domain().to_string(),
        explanation: error.to_string(),
        source: Some(Box::new(error)),
    }
}
