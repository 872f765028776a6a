//! Library - concepts and pipes of one isolated scope
//!
//! The factory layer: turns bundle blueprints into registered concepts and
//! built pipes. Each library is constructed explicitly and torn down with
//! [`Library::teardown`], so tests and bundles never share registries.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::blueprint::{
    BundleBlueprint, ConceptBlueprint, PipeBlueprint, PipeKindBlueprint, SubPipeBlueprint,
};
use crate::concept::{
    split_concept_string, validate_domain, Concept, ConceptLibrary, NativeConceptCode,
    DEFAULT_STRUCTURE_CLASS,
};
use crate::config::ValidationConfig;
use crate::dag::sort_pipes_by_dependencies;
use crate::error::{PipeError, Result};
use crate::pipe::{
    make_variable_multiplicity, validate_library, BatchSpec, ConditionExpression, ConditionSpec,
    InputRequirement, Multiplicity, OperatorKind, OperatorSpec, ParallelSpec, Pipe, PipeBuilder,
    PipeKind, PipeLibrary, SequenceSpec, SubPipe, Template, ValidationReport,
};
use crate::util::NATIVE_DOMAIN;

/// Bound on `refines` hops followed when inheriting a structure
const MAX_STRUCTURE_INHERITANCE: usize = 16;

#[derive(Debug, Default, Clone)]
pub struct Library {
    concepts: ConceptLibrary,
    pipes: PipeLibrary,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn concepts(&self) -> &ConceptLibrary {
        &self.concepts
    }

    pub fn concepts_mut(&mut self) -> &mut ConceptLibrary {
        &mut self.concepts
    }

    pub fn pipes(&self) -> &PipeLibrary {
        &self.pipes
    }

    /// Register an already built pipe
    pub fn add_pipe(&mut self, pipe: Pipe) -> Result<()> {
        self.pipes.add_pipe(pipe).map(|_| ())
    }

    /// Drop everything but the native concepts
    pub fn teardown(&mut self) {
        self.concepts.clear();
        self.pipes.clear();
    }

    /// Read and load a YAML or JSON bundle file
    pub fn load_file(&mut self, path: &Path) -> Result<Vec<String>> {
        let text = std::fs::read_to_string(path)?;
        let bundle = BundleBlueprint::from_yaml(&text)?;
        self.load_bundle(&bundle)
    }

    /// Register a bundle's structures, concepts and pipes.
    ///
    /// All or nothing: the bundle is built against a copy of the registries,
    /// which replaces them only once every part succeeded. Returns the loaded
    /// pipe codes in dependency order.
    #[instrument(skip(self, bundle), fields(domain = %bundle.domain))]
    pub fn load_bundle(&mut self, bundle: &BundleBlueprint) -> Result<Vec<String>> {
        let mut staged = self.clone();
        let codes = staged.stage_bundle(bundle)?;
        *self = staged;
        info!(
            concepts = bundle.concept.len(),
            pipes = codes.len(),
            "bundle loaded"
        );
        Ok(codes)
    }

    fn stage_bundle(&mut self, bundle: &BundleBlueprint) -> Result<Vec<String>> {
        validate_domain(&bundle.domain)?;

        for (class_name, schema) in &bundle.structure {
            self.concepts
                .structures_mut()
                .register(class_name.clone(), schema.clone())?;
        }

        let concepts = bundle
            .concept
            .iter()
            .map(|(code, blueprint)| {
                let structure = self.structure_for(&bundle.domain, code, blueprint, bundle);
                Concept::make(
                    code,
                    &bundle.domain,
                    blueprint.description(),
                    Some(structure.as_str()),
                    blueprint.refines(),
                )
            })
            .collect::<Result<Vec<_>>>()?;
        self.concepts.add_concepts(concepts)?;

        // Cycles are fatal before anything is built
        let order = sort_pipes_by_dependencies(&bundle.pipe)?;

        let mut built = Vec::with_capacity(order.len());
        for (code, blueprint) in order {
            if self.pipes.contains(code) {
                return Err(PipeError::PipeDuplicate {
                    pipe_code: code.to_string(),
                });
            }
            built.push(self.build_pipe(&bundle.domain, code, blueprint)?);
        }

        let codes: Vec<String> = built.iter().map(|p| p.code().to_string()).collect();
        for pipe in built {
            self.pipes.add_pipe(pipe)?;
        }
        Ok(codes)
    }

    /// Static validation with the given reactions
    pub fn validate(&self, reactions: &ValidationConfig) -> Result<ValidationReport> {
        validate_library(&self.concepts, &self.pipes, reactions)
    }

    // ═══════════════════════════════════════════════════════════════
    // Concepts
    // ═══════════════════════════════════════════════════════════════

    /// Structure class of a declared concept.
    ///
    /// Explicit structure, else the refined concept's structure, else a
    /// registered structure named like the concept, else plain text.
    fn structure_for<'a>(
        &self,
        domain: &str,
        code: &'a str,
        blueprint: &'a ConceptBlueprint,
        bundle: &'a BundleBlueprint,
    ) -> String {
        let mut current_code = code;
        let mut current_blueprint = blueprint;
        for _ in 0..MAX_STRUCTURE_INHERITANCE {
            if let Some(structure) = current_blueprint.structure() {
                return structure.to_string();
            }
            if self.concepts.structures().contains(current_code) {
                return current_code.to_string();
            }
            let Some(refines) = current_blueprint.refines() else {
                break;
            };
            let (ref_domain, ref_code) = split_concept_string(refines);
            if let Ok(native) = ref_code.parse::<NativeConceptCode>() {
                if matches!(ref_domain, None | Some(NATIVE_DOMAIN)) {
                    return native.structure_class_name().to_string();
                }
            }
            if ref_domain.is_none() || ref_domain == Some(domain) {
                if let Some((parent_code, parent)) = bundle.concept.get_key_value(ref_code) {
                    current_code = parent_code;
                    current_blueprint = parent;
                    continue;
                }
            }
            let registered = match ref_domain {
                Some(_) => self.concepts.get_required_concept(refines),
                None => self.concepts.search(ref_code, &[domain]),
            };
            if let Ok(parent) = registered {
                return parent.structure_class_name.clone();
            }
            break;
        }
        DEFAULT_STRUCTURE_CLASS.to_string()
    }

    // ═══════════════════════════════════════════════════════════════
    // Pipes
    // ═══════════════════════════════════════════════════════════════

    fn definition_error(domain: &str, code: &str, reason: impl Into<String>) -> PipeError {
        PipeError::PipeDefinition {
            pipe_code: code.to_string(),
            domain: domain.to_string(),
            reason: reason.into(),
        }
    }

    /// `Page[]` / `Idea[3]` / `Text` → concept + multiplicity
    fn resolve_typed_reference(
        &mut self,
        domain: &str,
        code: &str,
        reference: &str,
    ) -> Result<(Arc<Concept>, Option<Multiplicity>)> {
        let (base, multiplicity) = parse_multiplicity_suffix(reference).ok_or_else(|| {
            Self::definition_error(
                domain,
                code,
                format!("malformed concept reference '{reference}'"),
            )
        })?;
        let concept = self
            .concepts
            .resolve_reference(base, domain, &[])?
            .into_concept();
        Ok((concept, multiplicity))
    }

    fn build_pipe(&mut self, domain: &str, code: &str, blueprint: &PipeBlueprint) -> Result<Pipe> {
        debug!(pipe_code = code, "building pipe");
        let mut builder = PipeBuilder::new(code, domain).description(blueprint.description.clone());

        for (name, reference) in &blueprint.inputs {
            let (concept, multiplicity) = self.resolve_typed_reference(domain, code, reference)?;
            builder = builder.input(
                name.clone(),
                InputRequirement::new(concept).with_multiplicity(multiplicity),
            );
        }

        let (output, suffix_multiplicity) =
            self.resolve_typed_reference(domain, code, &blueprint.output)?;
        let output_multiplicity = suffix_multiplicity
            .or_else(|| make_variable_multiplicity(blueprint.nb_output, blueprint.multiple_output));
        builder = builder.output(output).output_multiplicity(output_multiplicity);

        let parse_template =
            |source: &Option<String>| source.as_deref().map(Template::parse).transpose();

        let kind = match &blueprint.kind {
            PipeKindBlueprint::Llm {
                prompt_template,
                system_prompt,
                settings,
            } => {
                let mut spec = OperatorSpec::new(OperatorKind::Llm).with_settings(settings.clone());
                spec.prompt = parse_template(prompt_template)?;
                spec.system_prompt = parse_template(system_prompt)?;
                PipeKind::Operator(spec)
            }
            PipeKindBlueprint::ImgGen {
                prompt_template,
                settings,
            } => {
                let mut spec =
                    OperatorSpec::new(OperatorKind::ImgGen).with_settings(settings.clone());
                spec.prompt = parse_template(prompt_template)?;
                PipeKind::Operator(spec)
            }
            PipeKindBlueprint::Extract { settings } => PipeKind::Operator(
                OperatorSpec::new(OperatorKind::Extract).with_settings(settings.clone()),
            ),
            PipeKindBlueprint::Func { function_name } => PipeKind::Operator(
                OperatorSpec::new(OperatorKind::Func).with_function(function_name.clone()),
            ),
            PipeKindBlueprint::Compose { template } => PipeKind::Operator(
                OperatorSpec::new(OperatorKind::Compose)
                    .with_prompt(Template::parse(template.as_str())?),
            ),
            PipeKindBlueprint::Sequence { steps } => PipeKind::Sequence(SequenceSpec {
                steps: steps.iter().map(sub_pipe).collect(),
            }),
            PipeKindBlueprint::Parallel {
                parallels,
                add_each_output,
                combined_output,
            } => {
                let combined_output = match combined_output {
                    Some(reference) => Some(
                        self.concepts
                            .resolve_reference(reference, domain, &[])?
                            .into_concept(),
                    ),
                    None => None,
                };
                PipeKind::Parallel(ParallelSpec {
                    branches: parallels.iter().map(sub_pipe).collect(),
                    add_each_output: *add_each_output,
                    combined_output,
                })
            }
            PipeKindBlueprint::Condition {
                expression,
                expression_template,
                outcomes,
                default_outcome,
                add_alias_from_expression_to,
            } => {
                let source = expression_template
                    .as_deref()
                    .or(expression.as_deref())
                    .ok_or_else(|| {
                        Self::definition_error(
                            domain,
                            code,
                            "a condition needs an expression or expression_template",
                        )
                    })?;
                PipeKind::Condition(ConditionSpec {
                    expression: ConditionExpression::parse(source)?,
                    outcomes: outcomes.clone(),
                    default_outcome: default_outcome.clone(),
                    add_alias_from_expression_to: add_alias_from_expression_to.clone(),
                })
            }
            PipeKindBlueprint::Batch {
                branch_pipe_code,
                input_list_name,
                input_item_name,
            } => {
                let input_list_name = match input_list_name {
                    Some(name) => name.clone(),
                    None => match blueprint.inputs.as_slice() {
                        [(only, _)] => only.clone(),
                        _ => {
                            return Err(Self::definition_error(
                                domain,
                                code,
                                "input_list_name is required when a batch has several inputs",
                            ))
                        }
                    },
                };
                let input_item_name = input_item_name
                    .clone()
                    .unwrap_or_else(|| format!("{input_list_name}_item"));
                PipeKind::Batch(BatchSpec {
                    branch_pipe_code: branch_pipe_code.clone(),
                    input_list_name,
                    input_item_name,
                })
            }
        };

        builder.build(kind)
    }
}

fn sub_pipe(blueprint: &SubPipeBlueprint) -> SubPipe {
    SubPipe {
        pipe_code: blueprint.pipe.clone(),
        result_name: blueprint.result.clone(),
        batch_over: blueprint.batch_over.clone(),
        batch_as: blueprint.batch_as.clone(),
        output_multiplicity: make_variable_multiplicity(
            blueprint.nb_output,
            blueprint.multiple_output,
        ),
    }
}

/// Split `Code[]` / `Code[N]` / `Code`; `None` when malformed
fn parse_multiplicity_suffix(reference: &str) -> Option<(&str, Option<Multiplicity>)> {
    let reference = reference.trim();
    let Some(open) = reference.find('[') else {
        return Some((reference, None));
    };
    let base = &reference[..open];
    let inner = reference[open + 1..].strip_suffix(']')?;
    if base.is_empty() {
        return None;
    }
    if inner.is_empty() {
        return Some((base, make_variable_multiplicity(None, Some(true))));
    }
    let count: i64 = inner.parse().ok()?;
    Some((base, make_variable_multiplicity(Some(count), None)))
}
