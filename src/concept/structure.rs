//! Structure registry - JSON schemas for structured stuff content
//!
//! Replaces a global class registry: one explicitly constructed registry per
//! library, compiled once at registration.

use std::fmt;
use std::sync::Arc;

use jsonschema::Validator;
use rustc_hash::FxHashMap;
use serde_json::{json, Map, Value};

use crate::error::{PipeError, Result};

struct Structure {
    schema: Arc<Value>,
    validator: Validator,
}

/// Registry of structure classes by name.
///
/// Compiled structures are shared, so cloning a registry is cheap.
#[derive(Default, Clone)]
pub struct StructureRegistry {
    structures: FxHashMap<String, Arc<Structure>>,
}

impl fmt::Debug for StructureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.structures.keys().collect();
        names.sort();
        f.debug_struct("StructureRegistry")
            .field("structures", &names)
            .finish()
    }
}

impl StructureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a structure class with its JSON schema
    pub fn register(&mut self, class_name: impl Into<String>, schema: Value) -> Result<()> {
        let class_name = class_name.into();
        let validator =
            jsonschema::validator_for(&schema).map_err(|e| PipeError::StructureSchema {
                class_name: class_name.clone(),
                details: e.to_string(),
            })?;
        self.structures.insert(
            class_name,
            Arc::new(Structure {
                schema: Arc::new(schema),
                validator,
            }),
        );
        Ok(())
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.structures.contains_key(class_name)
    }

    pub fn schema(&self, class_name: &str) -> Option<Arc<Value>> {
        self.structures
            .get(class_name)
            .map(|s| Arc::clone(&s.schema))
    }

    /// Validate a value against a registered structure
    ///
    /// `concept` is only used for the error message.
    pub fn validate(&self, class_name: &str, concept: &str, value: &Value) -> Result<()> {
        let structure =
            self.structures
                .get(class_name)
                .ok_or_else(|| PipeError::StructureNotFound {
                    class_name: class_name.to_string(),
                })?;

        let errors: Vec<String> = structure
            .validator
            .iter_errors(value)
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("[{path}] {e}")
                }
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PipeError::StructureInvalid {
                concept: concept.to_string(),
                details: errors.join("; "),
            })
        }
    }

    pub fn clear(&mut self) {
        self.structures.clear();
    }

    pub fn len(&self) -> usize {
        self.structures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structures.is_empty()
    }
}

/// Deterministic placeholder value satisfying the common shape of a schema.
///
/// Used by dry runs: strings become `"dry_run_<field>"`, numbers 0, booleans
/// false, arrays empty unless `minItems` asks otherwise, objects recurse into
/// their declared properties.
pub fn mock_value_for_schema(schema: &Value, field_name: &str) -> Value {
    if let Some(values) = schema.get("enum").and_then(Value::as_array) {
        if let Some(first) = values.first() {
            return first.clone();
        }
    }
    if let Some(constant) = schema.get("const") {
        return constant.clone();
    }

    let type_name = match schema.get("type") {
        Some(Value::String(t)) => t.as_str(),
        // ["string", "null"] style unions: first non-null type
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null")
            .unwrap_or("null"),
        _ if schema.get("properties").is_some() => "object",
        _ => "string",
    };

    match type_name {
        "object" => {
            let mut object = Map::new();
            if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
                for (name, sub_schema) in properties {
                    object.insert(name.clone(), mock_value_for_schema(sub_schema, name));
                }
            }
            Value::Object(object)
        }
        "array" => {
            let min_items = schema.get("minItems").and_then(Value::as_u64).unwrap_or(0);
            let item_schema = schema.get("items").cloned().unwrap_or_else(|| json!({}));
            Value::Array(
                (0..min_items)
                    .map(|_| mock_value_for_schema(&item_schema, field_name))
                    .collect(),
            )
        }
        "integer" | "number" => {
            let minimum = schema.get("minimum").and_then(Value::as_i64).unwrap_or(0);
            json!(minimum.max(0))
        }
        "boolean" => Value::Bool(false),
        "null" => Value::Null,
        _ => Value::String(format!("dry_run_{field_name}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "number": {"type": "string"},
                "total": {"type": "number", "minimum": 0},
                "paid": {"type": "boolean"},
                "lines": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["number", "total"]
        })
    }

    #[test]
    fn validate_accepts_matching_value() {
        let mut registry = StructureRegistry::new();
        registry.register("InvoiceContent", invoice_schema()).unwrap();

        let value = json!({"number": "F-001", "total": 12.5});
        assert!(registry
            .validate("InvoiceContent", "finance.Invoice", &value)
            .is_ok());
    }

    #[test]
    fn validate_reports_mismatch() {
        let mut registry = StructureRegistry::new();
        registry.register("InvoiceContent", invoice_schema()).unwrap();

        let err = registry
            .validate("InvoiceContent", "finance.Invoice", &json!({"number": 3}))
            .unwrap_err();
        assert!(matches!(err, PipeError::StructureInvalid { .. }));
        assert!(err.to_string().contains("finance.Invoice"));
    }

    #[test]
    fn unknown_structure_is_an_error() {
        let registry = StructureRegistry::new();
        let err = registry.validate("Nope", "x.Nope", &json!({})).unwrap_err();
        assert!(matches!(err, PipeError::StructureNotFound { .. }));
    }

    #[test]
    fn invalid_schema_is_rejected_at_registration() {
        let mut registry = StructureRegistry::new();
        let err = registry
            .register("Broken", json!({"type": "no-such-type"}))
            .unwrap_err();
        assert!(matches!(err, PipeError::StructureSchema { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn mock_value_satisfies_schema() {
        let mut registry = StructureRegistry::new();
        registry.register("InvoiceContent", invoice_schema()).unwrap();

        let mock = mock_value_for_schema(&invoice_schema(), "invoice");
        assert_eq!(mock["number"], "dry_run_number");
        assert_eq!(mock["total"], 0);
        assert_eq!(mock["paid"], false);
        assert!(registry
            .validate("InvoiceContent", "finance.Invoice", &mock)
            .is_ok());
    }

    #[test]
    fn mock_value_prefers_enum_members() {
        let schema = json!({"type": "string", "enum": ["urgent", "normal"]});
        assert_eq!(mock_value_for_schema(&schema, "priority"), "urgent");
    }
}
