//! Concept Module - the typed vocabulary of stuff
//!
//! A concept is a named, domain-scoped type (`domain.Code`) that may refine
//! another concept and may carry a structural schema.
//!
//! - `native`: the fixed catalog living in the `native` domain
//! - `library`: registry with refinement checks, compatibility and search
//! - `structure`: JSON-schema registry for structured content

mod library;
mod native;
mod structure;

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{PipeError, Result};
use crate::util::NATIVE_DOMAIN;

pub use library::{ConceptLibrary, ConceptResolution};
pub use native::NativeConceptCode;
pub use structure::{mock_value_for_schema, StructureRegistry};

/// PascalCase concept code
static CONCEPT_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Za-z0-9]*$").unwrap());

/// snake_case domain
static DOMAIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").unwrap());

/// Default content shape for concepts that declare no structure
pub const DEFAULT_STRUCTURE_CLASS: &str = "TextContent";

/// A named, domain-scoped type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub domain: String,
    pub code: String,
    pub description: String,
    /// Concept string (`domain.Code`) of the refined concept
    #[serde(default)]
    pub refines: Option<String>,
    pub structure_class_name: String,
}

impl Concept {
    /// Build a concept, validating code and domain identifiers
    pub fn make(
        code: &str,
        domain: &str,
        description: &str,
        structure_class_name: Option<&str>,
        refines: Option<&str>,
    ) -> Result<Self> {
        validate_concept_code(code)?;
        validate_domain(domain)?;

        Ok(Self {
            domain: domain.to_string(),
            code: code.to_string(),
            description: description.to_string(),
            refines: refines.map(str::to_string),
            structure_class_name: structure_class_name
                .unwrap_or(DEFAULT_STRUCTURE_CLASS)
                .to_string(),
        })
    }

    /// Concept from the native catalog
    pub fn native(code: NativeConceptCode) -> Self {
        Self {
            domain: NATIVE_DOMAIN.to_string(),
            code: code.as_str().to_string(),
            description: code.description().to_string(),
            refines: None,
            structure_class_name: code.structure_class_name().to_string(),
        }
    }

    /// Canonical identity: `domain.Code`
    pub fn concept_string(&self) -> String {
        format!("{}.{}", self.domain, self.code)
    }

    pub fn is_native(&self) -> bool {
        self.domain == NATIVE_DOMAIN
    }

    /// The native code, when this concept is in the native domain
    pub fn native_code(&self) -> Option<NativeConceptCode> {
        if self.is_native() {
            self.code.parse().ok()
        } else {
            None
        }
    }
}

impl fmt::Display for Concept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.code)
    }
}

/// Split `domain.Code` or bare `Code`
pub fn split_concept_string(concept_string: &str) -> (Option<&str>, &str) {
    match concept_string.rsplit_once('.') {
        Some((domain, code)) => (Some(domain), code),
        None => (None, concept_string),
    }
}

pub fn validate_concept_code(code: &str) -> Result<()> {
    if code.is_empty() {
        return Err(PipeError::ConceptCode {
            code: code.to_string(),
            reason: "code is empty".to_string(),
        });
    }
    if !CONCEPT_CODE_RE.is_match(code) {
        return Err(PipeError::ConceptCode {
            code: code.to_string(),
            reason: "must be PascalCase (letters and digits, starting uppercase)".to_string(),
        });
    }
    Ok(())
}

pub fn validate_domain(domain: &str) -> Result<()> {
    if !DOMAIN_RE.is_match(domain) {
        return Err(PipeError::Domain {
            domain: domain.to_string(),
            reason: "must be snake_case (lowercase letters, digits, underscores)".to_string(),
        });
    }
    Ok(())
}
