//! Dry runs - deterministic placeholder content, zero I/O
//!
//! Every operator supports DRY mode: instead of calling its backend it gets
//! content shaped after the output concept. Structured concepts get a value
//! generated from their JSON schema, so downstream paths resolve.

use serde_json::{json, Value};
use tracing::debug;

use crate::concept::{mock_value_for_schema, Concept, ConceptLibrary};
use crate::error::Result;
use crate::pipe::{OutputMultiplicityResolution, PipeInputs};
use crate::store::WorkingMemory;
use crate::stuff::{
    snake_case, HtmlContent, PageContent, PdfContent, Stuff, StuffContent, StuffFactory,
    TextAndImagesContent,
};

/// Placeholder generator bound to a concept library
#[derive(Clone, Copy)]
pub struct DryRunGenerator<'a> {
    concepts: &'a ConceptLibrary,
    /// Items produced when the count is undetermined
    list_size: usize,
}

impl<'a> DryRunGenerator<'a> {
    pub fn new(concepts: &'a ConceptLibrary, list_size: usize) -> Self {
        Self {
            concepts,
            list_size,
        }
    }

    /// Content an operator would produce, honoring the resolved multiplicity
    pub fn content_for(
        &self,
        concept: &Concept,
        multiplicity: &OutputMultiplicityResolution,
        pipe_code: &str,
    ) -> StuffContent {
        if !multiplicity.is_multiple_enabled {
            return self.single(concept, pipe_code, None);
        }
        let count = match multiplicity.specific_count {
            Some(n) => usize::try_from(n).unwrap_or(0),
            None => self.list_size,
        };
        StuffContent::list(
            (0..count)
                .map(|index| self.single(concept, pipe_code, Some(index)))
                .collect(),
        )
    }

    fn single(&self, concept: &Concept, pipe_code: &str, index: Option<usize>) -> StuffContent {
        let label = match index {
            Some(i) => format!("DRY RUN: {} #{} from pipe '{pipe_code}'", concept.code, i + 1),
            None => format!("DRY RUN: {} from pipe '{pipe_code}'", concept.code),
        };
        let slug = snake_case(&concept.code);

        match concept.structure_class_name.as_str() {
            "TextContent" | "AnyContent" => StuffContent::text(label),
            "NumberContent" => StuffContent::number(0.0),
            "ImageContent" => StuffContent::image(format!("https://dry-run.invalid/{slug}.png")),
            "PdfContent" => StuffContent::Pdf(PdfContent {
                url: format!("https://dry-run.invalid/{slug}.pdf"),
            }),
            "HtmlContent" => StuffContent::Html(HtmlContent {
                inner_html: format!("<p>{label}</p>"),
            }),
            "PageContent" => StuffContent::Page(PageContent {
                text_and_images: TextAndImagesContent {
                    text: Some(label),
                    images: Vec::new(),
                },
                page_view: None,
            }),
            "TextAndImagesContent" => StuffContent::TextAndImages(TextAndImagesContent {
                text: Some(label),
                images: Vec::new(),
            }),
            "JsonContent" => StuffContent::structured("JsonContent", json!({ "dry_run": label })),
            class_name => {
                let value = self
                    .concepts
                    .structures()
                    .schema(class_name)
                    .map(|schema| mock_value_for_schema(&schema, &slug))
                    .unwrap_or_else(|| Value::Object(Default::default()));
                StuffContent::structured(class_name, value)
            }
        }
    }

    /// Mock stuff for one input requirement
    pub fn mock_input(
        &self,
        name: &str,
        concept: &std::sync::Arc<Concept>,
        multiple: bool,
    ) -> Result<Stuff> {
        let multiplicity = OutputMultiplicityResolution {
            resolved: None,
            is_multiple_enabled: multiple,
            specific_count: None,
        };
        let content = self.content_for(concept, &multiplicity, name);
        StuffFactory::new(self.concepts).make_stuff_with_concept(
            std::sync::Arc::clone(concept),
            content,
            Some(name),
            None,
        )
    }

    /// Add placeholders for every needed input absent from memory.
    ///
    /// Returns the names that were filled, in requirement order.
    pub fn fill_missing_inputs(
        &self,
        needed: &PipeInputs,
        memory: &mut WorkingMemory,
    ) -> Result<Vec<String>> {
        let mut filled = Vec::new();
        for (name, requirement) in needed.iter() {
            if memory.contains(name) {
                continue;
            }
            let stuff = self.mock_input(name, &requirement.concept, requirement.is_multiple())?;
            debug!(name, concept = %requirement.concept, "mocked missing input");
            memory.add_new_stuff(name, stuff)?;
            filled.push(name.to_string());
        }
        Ok(filled)
    }
}
