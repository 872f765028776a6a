//! ConceptLibrary - explicit concept registry
//!
//! Constructed per bundle scope (natives pre-registered), injected into the
//! router and validators, torn down with [`ConceptLibrary::clear`].
//! Refinement cycles are rejected when concepts are added, so compatibility
//! checks only ever walk finite, bounded chains.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::error::{PipeError, Result};
use crate::util::{IMPLICIT_DOMAIN, MAX_REFINEMENT_DEPTH, NATIVE_DOMAIN};

use super::native::NativeConceptCode;
use super::structure::StructureRegistry;
use super::{split_concept_string, validate_concept_code, Concept, DEFAULT_STRUCTURE_CLASS};

/// How a concept reference was resolved
#[derive(Debug, Clone, PartialEq)]
pub enum ConceptResolution {
    /// Found in the native catalog
    Native(Arc<Concept>),
    /// Found among registered concepts
    Declared(Arc<Concept>),
    /// Synthesized in the implicit domain
    Implicit(Arc<Concept>),
}

impl ConceptResolution {
    pub fn concept(&self) -> &Arc<Concept> {
        match self {
            Self::Native(c) | Self::Declared(c) | Self::Implicit(c) => c,
        }
    }

    pub fn into_concept(self) -> Arc<Concept> {
        match self {
            Self::Native(c) | Self::Declared(c) | Self::Implicit(c) => c,
        }
    }
}

/// Registry of concepts keyed by concept string
#[derive(Debug, Clone)]
pub struct ConceptLibrary {
    concepts: FxHashMap<String, Arc<Concept>>,
    structures: StructureRegistry,
}

impl Default for ConceptLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl ConceptLibrary {
    /// Create a library with the native catalog registered
    pub fn new() -> Self {
        let mut library = Self {
            concepts: FxHashMap::default(),
            structures: StructureRegistry::new(),
        };
        library.register_natives();
        library
    }

    fn register_natives(&mut self) {
        for code in NativeConceptCode::ALL {
            let concept = Concept::native(code);
            self.concepts
                .insert(concept.concept_string(), Arc::new(concept));
        }
    }

    /// Drop every non-native concept and structure
    pub fn clear(&mut self) {
        self.concepts.clear();
        self.structures.clear();
        self.register_natives();
    }

    pub fn structures(&self) -> &StructureRegistry {
        &self.structures
    }

    pub fn structures_mut(&mut self) -> &mut StructureRegistry {
        &mut self.structures
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    /// All concepts, sorted by concept string
    pub fn concepts(&self) -> Vec<Arc<Concept>> {
        let mut all: Vec<_> = self.concepts.values().cloned().collect();
        all.sort_by(|a, b| a.concept_string().cmp(&b.concept_string()));
        all
    }

    pub fn native(&self, code: NativeConceptCode) -> Arc<Concept> {
        let key = format!("{NATIVE_DOMAIN}.{code}");
        match self.concepts.get(&key) {
            Some(concept) => Arc::clone(concept),
            None => Arc::new(Concept::native(code)),
        }
    }

    /// Register one concept
    pub fn add_concept(&mut self, concept: Concept) -> Result<Arc<Concept>> {
        let mut added = self.add_concepts(vec![concept])?;
        Ok(added.remove(0))
    }

    /// Register a batch of concepts that may refine each other.
    ///
    /// `refines` references are canonicalized to `domain.Code`. Either every
    /// concept is registered or none is.
    pub fn add_concepts(&mut self, concepts: Vec<Concept>) -> Result<Vec<Arc<Concept>>> {
        let mut staged: FxHashMap<String, Concept> = FxHashMap::default();
        let mut order = Vec::with_capacity(concepts.len());

        for concept in concepts {
            let key = concept.concept_string();
            if concept.domain == NATIVE_DOMAIN
                || self.concepts.contains_key(&key)
                || staged.contains_key(&key)
            {
                return Err(PipeError::ConceptDuplicate { concept: key });
            }
            order.push(key.clone());
            staged.insert(key, concept);
        }

        // Canonicalize refines against registered + staged concepts
        for key in &order {
            let Some(concept) = staged.get(key) else {
                continue;
            };
            let Some(refines) = concept.refines.clone() else {
                continue;
            };
            let canonical = self.canonical_refines(&refines, &concept.domain, &staged)?;
            if let Some(concept) = staged.get_mut(key) {
                concept.refines = Some(canonical);
            }
        }

        for key in &order {
            self.check_refinement_chain(key, &staged)?;
            if let Some(concept) = staged.get(key) {
                self.check_structure(concept)?;
            }
        }

        let mut added = Vec::with_capacity(order.len());
        for key in order {
            if let Some(concept) = staged.remove(&key) {
                debug!(concept = %key, "registering concept");
                let concept = Arc::new(concept);
                self.concepts.insert(key, Arc::clone(&concept));
                added.push(concept);
            }
        }
        Ok(added)
    }

    fn lookup<'a>(
        &'a self,
        key: &str,
        staged: &'a FxHashMap<String, Concept>,
    ) -> Option<&'a Concept> {
        staged
            .get(key)
            .or_else(|| self.concepts.get(key).map(|c| c.as_ref()))
    }

    fn canonical_refines(
        &self,
        refines: &str,
        domain: &str,
        staged: &FxHashMap<String, Concept>,
    ) -> Result<String> {
        let (ref_domain, code) = split_concept_string(refines);
        if let Some(ref_domain) = ref_domain {
            let key = format!("{ref_domain}.{code}");
            return match self.lookup(&key, staged) {
                Some(_) => Ok(key),
                None => Err(PipeError::ConceptNotFound { concept: key }),
            };
        }
        if code.parse::<NativeConceptCode>().is_ok() {
            return Ok(format!("{NATIVE_DOMAIN}.{code}"));
        }
        let local = format!("{domain}.{code}");
        if self.lookup(&local, staged).is_some() {
            return Ok(local);
        }
        let mut candidates: Vec<String> = self
            .concepts
            .values()
            .filter(|c| c.code == code)
            .map(|c| c.concept_string())
            .chain(staged.values().filter(|c| c.code == code).map(Concept::concept_string))
            .collect();
        candidates.sort();
        candidates.dedup();
        match candidates.len() {
            0 => Err(PipeError::ConceptNotFound {
                concept: refines.to_string(),
            }),
            1 => Ok(candidates.remove(0)),
            _ => Err(PipeError::ConceptAmbiguous {
                code: code.to_string(),
                candidates,
            }),
        }
    }

    /// Walk the refinement chain starting at `key`, bounded by MAX_REFINEMENT_DEPTH
    fn check_refinement_chain(&self, key: &str, staged: &FxHashMap<String, Concept>) -> Result<()> {
        let mut visited: FxHashSet<&str> = FxHashSet::default();
        let mut chain: Vec<&str> = vec![key];
        visited.insert(key);

        let mut current = self.lookup(key, staged);
        while let Some(concept) = current {
            let Some(parent) = concept.refines.as_deref() else {
                return Ok(());
            };
            chain.push(parent);
            if !visited.insert(parent) {
                return Err(PipeError::RefinementCycle {
                    concept: key.to_string(),
                    chain: chain.join(" → "),
                });
            }
            if chain.len() > MAX_REFINEMENT_DEPTH {
                return Err(PipeError::RefinementTooDeep {
                    concept: key.to_string(),
                    max_depth: MAX_REFINEMENT_DEPTH,
                });
            }
            current = self.lookup(parent, staged);
            if current.is_none() {
                return Err(PipeError::ConceptNotFound {
                    concept: parent.to_string(),
                });
            }
        }
        Ok(())
    }

    fn check_structure(&self, concept: &Concept) -> Result<()> {
        let class_name = concept.structure_class_name.as_str();
        let is_native_shape = NativeConceptCode::ALL
            .iter()
            .any(|c| c.structure_class_name() == class_name);
        if class_name == DEFAULT_STRUCTURE_CLASS
            || is_native_shape
            || self.structures.contains(class_name)
        {
            Ok(())
        } else {
            Err(PipeError::StructureNotFound {
                class_name: class_name.to_string(),
            })
        }
    }

    /// Exact lookup by concept string; bare codes go through [`Self::search`]
    pub fn get_required_concept(&self, concept_string: &str) -> Result<Arc<Concept>> {
        let (domain, code) = split_concept_string(concept_string);
        match domain {
            Some(_) => self.concepts.get(concept_string).cloned().ok_or_else(|| {
                PipeError::ConceptNotFound {
                    concept: concept_string.to_string(),
                }
            }),
            None => {
                if let Ok(native) = code.parse::<NativeConceptCode>() {
                    return Ok(self.native(native));
                }
                self.search(code, &[])
            }
        }
    }

    /// Search a bare code across domains.
    ///
    /// With domain hints, the first hinted domain holding the code wins.
    /// Without hints, two or more matches is an ambiguity error.
    pub fn search(&self, code: &str, domain_hints: &[&str]) -> Result<Arc<Concept>> {
        for domain in domain_hints {
            if let Some(concept) = self.concepts.get(&format!("{domain}.{code}")) {
                return Ok(Arc::clone(concept));
            }
        }
        let mut candidates: Vec<&Arc<Concept>> =
            self.concepts.values().filter(|c| c.code == code).collect();
        candidates.sort_by_key(|c| c.concept_string());
        match candidates.as_slice() {
            [] => Err(PipeError::ConceptNotFound {
                concept: code.to_string(),
            }),
            [only] => Ok(Arc::clone(only)),
            many => Err(PipeError::ConceptAmbiguous {
                code: code.to_string(),
                candidates: many.iter().map(|c| c.concept_string()).collect(),
            }),
        }
    }

    /// Find the concept whose structure (or code) is named `shape_name`
    pub fn search_by_structure(&self, shape_name: &str) -> Result<Arc<Concept>> {
        let mut candidates: Vec<&Arc<Concept>> = self
            .concepts
            .values()
            .filter(|c| !c.is_native())
            .filter(|c| c.structure_class_name == shape_name || c.code == shape_name)
            .collect();
        candidates.sort_by_key(|c| c.concept_string());
        match candidates.as_slice() {
            [] => Err(PipeError::ConceptNotFound {
                concept: shape_name.to_string(),
            }),
            [only] => Ok(Arc::clone(only)),
            many => Err(PipeError::ConceptAmbiguous {
                code: shape_name.to_string(),
                candidates: many.iter().map(|c| c.concept_string()).collect(),
            }),
        }
    }

    /// Resolve a concept reference found in a blueprint.
    ///
    /// Qualified references must exist. Bare codes are looked up in the native
    /// table, then the current domain, then the candidate domains, then as a
    /// unique match across all domains; failing that an implicit concept is
    /// synthesized in the reserved implicit domain.
    pub fn resolve_reference(
        &mut self,
        reference: &str,
        current_domain: &str,
        candidate_domains: &[&str],
    ) -> Result<ConceptResolution> {
        let (domain, code) = split_concept_string(reference);
        if domain.is_some() {
            return self
                .get_required_concept(reference)
                .map(|c| match c.is_native() {
                    true => ConceptResolution::Native(c),
                    false => ConceptResolution::Declared(c),
                });
        }

        // Phase 1: explicit tables
        if let Ok(native) = code.parse::<NativeConceptCode>() {
            return Ok(ConceptResolution::Native(self.native(native)));
        }
        let mut hints = Vec::with_capacity(candidate_domains.len() + 1);
        hints.push(current_domain);
        hints.extend_from_slice(candidate_domains);
        for domain in &hints {
            if let Some(concept) = self.concepts.get(&format!("{domain}.{code}")) {
                return Ok(ConceptResolution::Declared(Arc::clone(concept)));
            }
        }
        match self.search(code, &[]) {
            Ok(concept) => return Ok(ConceptResolution::Declared(concept)),
            Err(PipeError::ConceptNotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        // Phase 2: synthesize
        validate_concept_code(code)?;
        let key = format!("{IMPLICIT_DOMAIN}.{code}");
        if let Some(existing) = self.concepts.get(&key) {
            return Ok(ConceptResolution::Implicit(Arc::clone(existing)));
        }
        debug!(concept = %key, "synthesizing implicit concept");
        let concept = Arc::new(Concept {
            domain: IMPLICIT_DOMAIN.to_string(),
            code: code.to_string(),
            description: format!("Implicit concept '{code}'"),
            refines: None,
            structure_class_name: DEFAULT_STRUCTURE_CLASS.to_string(),
        });
        self.concepts.insert(key, Arc::clone(&concept));
        Ok(ConceptResolution::Implicit(concept))
    }

    /// Ancestors of a concept (excluding itself), nearest first
    pub fn refinement_chain(&self, concept: &Concept) -> Vec<Arc<Concept>> {
        let mut chain = Vec::new();
        let mut next = concept.refines.as_deref();
        while let Some(parent_key) = next {
            if chain.len() >= MAX_REFINEMENT_DEPTH {
                break;
            }
            let Some(parent) = self.concepts.get(parent_key) else {
                break;
            };
            chain.push(Arc::clone(parent));
            next = parent.refines.as_deref();
        }
        chain
    }

    /// Whether stuff of concept `tested` may flow where `wanted` is expected.
    ///
    /// True when equal, when `wanted` is in `tested`'s refinement chain, or when
    /// `wanted` is native Anything. Non-strict mode also lets the fixed
    /// Text-compatible allow-list stand in for native Text.
    pub fn is_compatible(&self, tested: &Concept, wanted: &Concept, strict: bool) -> bool {
        let wanted_key = wanted.concept_string();
        if tested.concept_string() == wanted_key {
            return true;
        }
        if wanted.native_code() == Some(NativeConceptCode::Anything) {
            return true;
        }

        let chain = self.refinement_chain(tested);
        if chain.iter().any(|c| c.concept_string() == wanted_key) {
            return true;
        }

        if !strict && wanted.native_code() == Some(NativeConceptCode::Text) {
            return std::iter::once(tested)
                .chain(chain.iter().map(|c| c.as_ref()))
                .filter_map(Concept::native_code)
                .any(|code| code.is_text_compatible());
        }
        false
    }
}
