//! Blueprints - declarative bundle definitions
//!
//! Plain serde data, deserialized from YAML or JSON. A bundle declares one
//! domain with its structures (JSON schemas), concepts and pipes:
//!
//! ```yaml
//! domain: finance
//! structure:
//!   InvoiceSummary: { type: object, properties: { total: { type: number } } }
//! concept:
//!   Invoice: "A customer invoice"
//!   InvoiceSummary:
//!     description: "Key facts of an invoice"
//!     refines: Text
//! pipe:
//!   summarize_invoice:
//!     type: PipeLLM
//!     inputs: { invoice: Invoice }
//!     output: InvoiceSummary
//!     prompt_template: "Summarize $invoice"
//! ```
//!
//! Inputs and outputs use concept references with an optional multiplicity
//! suffix: `Page[]` (many) or `Idea[3]` (exactly three).

mod ordered;

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{PipeError, Result};

/// One domain's worth of definitions
#[derive(Debug, Clone, Deserialize)]
pub struct BundleBlueprint {
    pub domain: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Structure class name → JSON schema
    #[serde(default)]
    pub structure: BTreeMap<String, Value>,
    #[serde(default)]
    pub concept: BTreeMap<String, ConceptBlueprint>,
    #[serde(default)]
    pub pipe: BTreeMap<String, PipeBlueprint>,
}

impl BundleBlueprint {
    /// Parse YAML (JSON being a subset)
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| PipeError::BundleParse {
            details: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ConceptBlueprint {
    /// Shorthand: the description alone
    Description(String),
    Full {
        #[serde(default)]
        description: String,
        #[serde(default)]
        refines: Option<String>,
        /// Structure class name
        #[serde(default)]
        structure: Option<String>,
    },
}

impl ConceptBlueprint {
    pub fn description(&self) -> &str {
        match self {
            Self::Description(d) => d,
            Self::Full { description, .. } => description,
        }
    }

    pub fn refines(&self) -> Option<&str> {
        match self {
            Self::Description(_) => None,
            Self::Full { refines, .. } => refines.as_deref(),
        }
    }

    pub fn structure(&self) -> Option<&str> {
        match self {
            Self::Description(_) => None,
            Self::Full { structure, .. } => structure.as_deref(),
        }
    }
}

/// A pipe definition: common signature plus the kind-specific part
#[derive(Debug, Clone, Deserialize)]
pub struct PipeBlueprint {
    #[serde(default)]
    pub description: String,
    /// Input name → concept reference, in declaration order
    #[serde(default, deserialize_with = "ordered::deserialize")]
    pub inputs: Vec<(String, String)>,
    /// Output concept reference
    pub output: String,
    #[serde(default)]
    pub nb_output: Option<i64>,
    #[serde(default)]
    pub multiple_output: Option<bool>,
    #[serde(flatten)]
    pub kind: PipeKindBlueprint,
}

impl PipeBlueprint {
    /// Codes of pipes referenced directly, in declaration order
    pub fn referenced_pipe_codes(&self) -> Vec<&str> {
        match &self.kind {
            PipeKindBlueprint::Llm { .. }
            | PipeKindBlueprint::ImgGen { .. }
            | PipeKindBlueprint::Extract { .. }
            | PipeKindBlueprint::Func { .. }
            | PipeKindBlueprint::Compose { .. } => Vec::new(),
            PipeKindBlueprint::Sequence { steps } => {
                steps.iter().map(|s| s.pipe.as_str()).collect()
            }
            PipeKindBlueprint::Parallel { parallels, .. } => {
                parallels.iter().map(|s| s.pipe.as_str()).collect()
            }
            PipeKindBlueprint::Condition {
                outcomes,
                default_outcome,
                ..
            } => outcomes
                .values()
                .chain(default_outcome.iter())
                .map(String::as_str)
                .collect(),
            PipeKindBlueprint::Batch {
                branch_pipe_code, ..
            } => vec![branch_pipe_code.as_str()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum PipeKindBlueprint {
    #[serde(rename = "PipeLLM")]
    Llm {
        #[serde(default, alias = "prompt")]
        prompt_template: Option<String>,
        #[serde(default)]
        system_prompt: Option<String>,
        #[serde(default)]
        settings: Value,
    },
    #[serde(rename = "PipeImgGen")]
    ImgGen {
        #[serde(default, alias = "prompt")]
        prompt_template: Option<String>,
        #[serde(default)]
        settings: Value,
    },
    #[serde(rename = "PipeExtract")]
    Extract {
        #[serde(default)]
        settings: Value,
    },
    #[serde(rename = "PipeFunc")]
    Func { function_name: String },
    #[serde(rename = "PipeCompose")]
    Compose { template: String },
    #[serde(rename = "PipeSequence")]
    Sequence { steps: Vec<SubPipeBlueprint> },
    #[serde(rename = "PipeParallel")]
    Parallel {
        parallels: Vec<SubPipeBlueprint>,
        #[serde(default)]
        add_each_output: bool,
        #[serde(default)]
        combined_output: Option<String>,
    },
    #[serde(rename = "PipeCondition")]
    Condition {
        #[serde(default)]
        expression: Option<String>,
        #[serde(default)]
        expression_template: Option<String>,
        outcomes: BTreeMap<String, String>,
        #[serde(default)]
        default_outcome: Option<String>,
        #[serde(default)]
        add_alias_from_expression_to: Option<String>,
    },
    #[serde(rename = "PipeBatch")]
    Batch {
        branch_pipe_code: String,
        #[serde(default)]
        input_list_name: Option<String>,
        #[serde(default)]
        input_item_name: Option<String>,
    },
}

/// Step, branch or call of another pipe inside a controller
#[derive(Debug, Clone, Deserialize)]
pub struct SubPipeBlueprint {
    pub pipe: String,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub batch_over: Option<String>,
    #[serde(default)]
    pub batch_as: Option<String>,
    #[serde(default)]
    pub nb_output: Option<i64>,
    #[serde(default)]
    pub multiple_output: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BUNDLE: &str = r#"
domain: docs
concept:
  Summary: "A short summary"
  Report:
    description: "A structured report"
    refines: Text
pipe:
  summarize:
    type: PipeLLM
    inputs:
      zeta: Text
      alpha: "Page[]"
    output: Summary
    prompt_template: "Summarize $alpha"
  flow:
    type: PipeSequence
    output: Summary
    steps:
      - pipe: summarize
        result: summary
        nb_output: 2
"#;

    #[test]
    fn parses_bundle() {
        let bundle = BundleBlueprint::from_yaml(BUNDLE).unwrap();
        assert_eq!(bundle.domain, "docs");
        assert_eq!(bundle.concept["Summary"].description(), "A short summary");
        assert_eq!(bundle.concept["Report"].refines(), Some("Text"));

        let summarize = &bundle.pipe["summarize"];
        assert_eq!(
            summarize.inputs,
            vec![
                ("zeta".to_string(), "Text".to_string()),
                ("alpha".to_string(), "Page[]".to_string())
            ]
        );
        assert!(matches!(summarize.kind, PipeKindBlueprint::Llm { .. }));
        assert_eq!(bundle.pipe["flow"].referenced_pipe_codes(), vec!["summarize"]);
    }

    #[test]
    fn unknown_pipe_type_is_a_parse_error() {
        let err = BundleBlueprint::from_yaml(
            "domain: d\npipe:\n  x:\n    type: PipeTeleport\n    output: Text\n",
        )
        .unwrap_err();
        assert!(matches!(err, PipeError::BundleParse { .. }));
    }
}
