//! StuffFactory - builds stuff from raw values
//!
//! Concept inference:
//! - bare string ⇒ native Text
//! - list of strings ⇒ list of native Text
//! - structured object without concept ⇒ search by the object's shape name
//! - `{"concept": ..., "content": ...}` ⇒ concept hint
//!
//! Every produced stuff has content validated against its concept's structure.

use std::sync::Arc;

use serde_json::Value;

use crate::concept::{Concept, ConceptLibrary, NativeConceptCode};
use crate::error::{PipeError, Result};

use super::content::{
    HtmlContent, ImageContent, NumberContent, PdfContent, StructuredContent, StuffContent,
};
use super::Stuff;

/// Stuff factory bound to a concept library
#[derive(Clone, Copy)]
pub struct StuffFactory<'a> {
    concepts: &'a ConceptLibrary,
}

impl<'a> StuffFactory<'a> {
    pub fn new(concepts: &'a ConceptLibrary) -> Self {
        Self { concepts }
    }

    /// Wrap content into a stuff.
    ///
    /// `concept` is a concept string (qualified or bare); when absent the
    /// concept is inferred from the content shape.
    pub fn make_stuff(
        &self,
        content: StuffContent,
        concept: Option<&str>,
        name: Option<&str>,
        code: Option<&str>,
    ) -> Result<Stuff> {
        let concept = match concept {
            Some(concept_string) => self.concepts.get_required_concept(concept_string)?,
            None => self.infer_concept(&content)?,
        };
        self.make_stuff_with_concept(concept, content, name, code)
    }

    /// Wrap content under an already-resolved concept, validating its shape
    pub fn make_stuff_with_concept(
        &self,
        concept: Arc<Concept>,
        content: StuffContent,
        name: Option<&str>,
        code: Option<&str>,
    ) -> Result<Stuff> {
        let content = self.conform_content(&concept, content)?;
        Ok(Stuff {
            stuff_code: code.map_or_else(new_stuff_code, str::to_string),
            stuff_name: name.map(str::to_string),
            concept,
            content,
        })
    }

    /// Build stuff from a raw JSON value
    pub fn make_stuff_from_value(&self, raw: Value, name: Option<&str>) -> Result<Stuff> {
        match raw {
            Value::String(text) => self.make_stuff(StuffContent::text(text), None, name, None),
            Value::Array(items) => {
                let texts = items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(text) => Ok(StuffContent::text(text)),
                        other => Err(PipeError::StuffFactory {
                            reason: format!(
                                "bare lists must contain strings only, found {other}; use {{\"concept\", \"content\"}}"
                            ),
                        }),
                    })
                    .collect::<Result<Vec<_>>>()?;
                let text = self.concepts.native(NativeConceptCode::Text);
                self.make_stuff_with_concept(text, StuffContent::list(texts), name, None)
            }
            Value::Object(mut object) => {
                let (Some(Value::String(concept_string)), Some(content)) =
                    (object.remove("concept"), object.remove("content"))
                else {
                    return Err(PipeError::StuffFactory {
                        reason: "objects need both a 'concept' string and a 'content' value"
                            .to_string(),
                    });
                };
                let concept = self.concepts.get_required_concept(&concept_string)?;
                let content = self.content_from_value(&concept, content)?;
                self.make_stuff_with_concept(concept, content, name, None)
            }
            Value::Number(number) => {
                let number = number.as_f64().ok_or_else(|| PipeError::StuffFactory {
                    reason: format!("number {number} is not representable"),
                })?;
                self.make_stuff(StuffContent::number(number), None, name, None)
            }
            other => Err(PipeError::StuffFactory {
                reason: format!("cannot make stuff from {other}"),
            }),
        }
    }

    /// Infer a concept from content alone
    pub fn infer_concept(&self, content: &StuffContent) -> Result<Arc<Concept>> {
        let native = |code| Ok(self.concepts.native(code));
        match content {
            StuffContent::Text(_) => native(NativeConceptCode::Text),
            StuffContent::Number(_) => native(NativeConceptCode::Number),
            StuffContent::Image(_) => native(NativeConceptCode::Image),
            StuffContent::Pdf(_) => native(NativeConceptCode::Pdf),
            StuffContent::Html(_) => native(NativeConceptCode::Html),
            StuffContent::Page(_) => native(NativeConceptCode::Page),
            StuffContent::TextAndImages(_) => native(NativeConceptCode::TextAndImages),
            StuffContent::Structured(s) => self.concepts.search_by_structure(&s.class_name),
            StuffContent::List(list) => {
                let Some(first) = list.items.first() else {
                    return Err(PipeError::StuffFactory {
                        reason: "cannot infer the concept of an empty list".to_string(),
                    });
                };
                let concept = self.infer_concept(first)?;
                for item in &list.items[1..] {
                    let other = self.infer_concept(item)?;
                    if other.concept_string() != concept.concept_string() {
                        return Err(PipeError::StuffFactory {
                            reason: format!(
                                "list mixes concepts '{concept}' and '{other}'"
                            ),
                        });
                    }
                }
                Ok(concept)
            }
        }
    }

    /// Convert a JSON value into content of the given concept
    pub fn content_from_value(&self, concept: &Concept, value: Value) -> Result<StuffContent> {
        if let Value::Array(items) = value {
            return items
                .into_iter()
                .map(|item| self.content_from_value(concept, item))
                .collect::<Result<Vec<_>>>()
                .map(StuffContent::list);
        }

        let shape_error = |value: &Value| PipeError::StuffFactory {
            reason: format!("value {value} does not fit concept '{concept}'"),
        };

        match concept.structure_class_name.as_str() {
            "TextContent" => match value {
                Value::String(text) => Ok(StuffContent::text(text)),
                other => Err(shape_error(&other)),
            },
            "NumberContent" => value
                .as_f64()
                .map(StuffContent::number)
                .ok_or_else(|| shape_error(&value)),
            "HtmlContent" => match value {
                Value::String(inner_html) => Ok(StuffContent::Html(HtmlContent { inner_html })),
                other => Err(shape_error(&other)),
            },
            "ImageContent" => match value {
                Value::String(url) => Ok(StuffContent::image(url)),
                other => serde_json::from_value::<ImageContent>(other.clone())
                    .map(StuffContent::Image)
                    .map_err(|_| shape_error(&other)),
            },
            "PdfContent" => match value {
                Value::String(url) => Ok(StuffContent::Pdf(PdfContent { url })),
                other => serde_json::from_value::<PdfContent>(other.clone())
                    .map(StuffContent::Pdf)
                    .map_err(|_| shape_error(&other)),
            },
            "PageContent" | "TextAndImagesContent" | "AnyContent" => {
                serde_json::from_value::<StuffContent>(value.clone())
                    .map_err(|_| shape_error(&value))
            }
            class_name => Ok(StuffContent::structured(class_name, value)),
        }
    }

    /// Check content shape against the concept, filling in structure names.
    fn conform_content(&self, concept: &Concept, content: StuffContent) -> Result<StuffContent> {
        if let StuffContent::List(list) = content {
            return list
                .items
                .into_iter()
                .map(|item| self.conform_content(concept, item))
                .collect::<Result<Vec<_>>>()
                .map(StuffContent::list);
        }

        let class_name = concept.structure_class_name.as_str();
        let accepted = match class_name {
            "AnyContent" => true,
            "TextContent" => matches!(content, StuffContent::Text(_)),
            "NumberContent" => matches!(content, StuffContent::Number(_)),
            "ImageContent" => matches!(content, StuffContent::Image(_)),
            "PdfContent" => matches!(content, StuffContent::Pdf(_)),
            "HtmlContent" => matches!(content, StuffContent::Html(_)),
            "PageContent" => matches!(content, StuffContent::Page(_)),
            "TextAndImagesContent" => matches!(content, StuffContent::TextAndImages(_)),
            "JsonContent" => matches!(content, StuffContent::Structured(_)),
            _ => {
                let StuffContent::Structured(structured) = content else {
                    return Err(PipeError::StructureInvalid {
                        concept: concept.concept_string(),
                        details: format!(
                            "expected structured '{class_name}' content, got {}",
                            content.kind_name()
                        ),
                    });
                };
                self.concepts.structures().validate(
                    class_name,
                    &concept.concept_string(),
                    &structured.value,
                )?;
                return Ok(StuffContent::Structured(StructuredContent {
                    class_name: class_name.to_string(),
                    value: structured.value,
                }));
            }
        };

        if accepted {
            Ok(content)
        } else {
            Err(PipeError::StructureInvalid {
                concept: concept.concept_string(),
                details: format!(
                    "expected {class_name}, got {} content",
                    content.kind_name()
                ),
            })
        }
    }

    /// Native Number content helper used by dry runs and tests
    pub fn number(&self, number: f64, name: Option<&str>) -> Result<Stuff> {
        let concept = self.concepts.native(NativeConceptCode::Number);
        self.make_stuff_with_concept(
            concept,
            StuffContent::Number(NumberContent { number }),
            name,
            None,
        )
    }
}

fn new_stuff_code() -> String {
    let mut code = uuid::Uuid::new_v4().simple().to_string();
    code.truncate(12);
    code
}

/// `ProductSummary` → `product_summary`
pub fn snake_case(code: &str) -> String {
    let mut out = String::with_capacity(code.len() + 4);
    let mut prev_lower_or_digit = false;
    for ch in code.chars() {
        if ch.is_uppercase() {
            if prev_lower_or_digit {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            prev_lower_or_digit = false;
        } else {
            out.push(ch);
            prev_lower_or_digit = ch.is_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn library_with_invoice() -> ConceptLibrary {
        let mut library = ConceptLibrary::new();
        library
            .structures_mut()
            .register(
                "Invoice",
                json!({
                    "type": "object",
                    "properties": {"total": {"type": "number"}},
                    "required": ["total"]
                }),
            )
            .unwrap();
        library
            .add_concept(Concept::make("Invoice", "finance", "", Some("Invoice"), None).unwrap())
            .unwrap();
        library
    }

    #[test]
    fn bare_string_is_text() {
        let library = ConceptLibrary::new();
        let stuff = StuffFactory::new(&library)
            .make_stuff_from_value(json!("hello"), Some("greeting"))
            .unwrap();
        assert_eq!(stuff.concept.concept_string(), "native.Text");
        assert_eq!(stuff.as_str().unwrap(), "hello");
        assert_eq!(stuff.stuff_name.as_deref(), Some("greeting"));
    }

    #[test]
    fn list_of_strings_is_list_of_text() {
        let library = ConceptLibrary::new();
        let stuff = StuffFactory::new(&library)
            .make_stuff_from_value(json!(["a", "b"]), None)
            .unwrap();
        assert_eq!(stuff.concept.concept_string(), "native.Text");
        assert_eq!(stuff.as_list().unwrap().len(), 2);
    }

    #[test]
    fn structured_object_resolves_by_shape_name() {
        let library = library_with_invoice();
        let stuff = StuffFactory::new(&library)
            .make_stuff(
                StuffContent::structured("Invoice", json!({"total": 10})),
                None,
                None,
                None,
            )
            .unwrap();
        assert_eq!(stuff.concept.concept_string(), "finance.Invoice");
    }

    #[test]
    fn structured_object_with_ambiguous_shape_fails() {
        let mut library = library_with_invoice();
        library
            .add_concept(Concept::make("Invoice", "billing", "", Some("Invoice"), None).unwrap())
            .unwrap();
        let err = StuffFactory::new(&library)
            .make_stuff(
                StuffContent::structured("Invoice", json!({"total": 10})),
                None,
                None,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, PipeError::ConceptAmbiguous { .. }));
    }

    #[test]
    fn structured_object_with_unknown_shape_fails() {
        let library = ConceptLibrary::new();
        let err = StuffFactory::new(&library)
            .make_stuff(StuffContent::structured("Receipt", json!({})), None, None, None)
            .unwrap_err();
        assert!(matches!(err, PipeError::ConceptNotFound { .. }));
    }

    #[test]
    fn concept_hint_builds_structured_content() {
        let library = library_with_invoice();
        let stuff = StuffFactory::new(&library)
            .make_stuff_from_value(
                json!({"concept": "finance.Invoice", "content": {"total": 42}}),
                Some("invoice"),
            )
            .unwrap();
        assert_eq!(stuff.as_structured().unwrap().value["total"], 42);
    }

    #[test]
    fn content_is_validated_against_structure() {
        let library = library_with_invoice();
        let err = StuffFactory::new(&library)
            .make_stuff_from_value(
                json!({"concept": "finance.Invoice", "content": {"total": "lots"}}),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, PipeError::StructureInvalid { .. }));
    }

    #[test]
    fn wrong_native_shape_is_rejected() {
        let library = ConceptLibrary::new();
        let err = StuffFactory::new(&library)
            .make_stuff(StuffContent::number(1.0), Some("native.Text"), None, None)
            .unwrap_err();
        assert!(matches!(err, PipeError::StructureInvalid { .. }));
    }

    #[test]
    fn snake_case_conversion() {
        assert_eq!(snake_case("ProductSummary"), "product_summary");
        assert_eq!(snake_case("Text"), "text");
        assert_eq!(snake_case("PDF"), "pdf");
        assert_eq!(snake_case("Page2Image"), "page2_image");
    }
}
