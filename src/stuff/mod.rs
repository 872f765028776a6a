//! Stuff Module - concrete typed values flowing through pipes
//!
//! - `content`: the capability-typed value shapes
//! - `factory`: building stuff from raw values with concept inference

mod content;
mod factory;

use std::sync::Arc;

use serde::Serialize;

use crate::concept::Concept;
use crate::error::{PipeError, Result};

pub use content::{
    HtmlContent, ImageContent, ListContent, NumberContent, PageContent, PdfContent,
    StructuredContent, StuffContent, TextAndImagesContent, TextContent,
};
pub use factory::{snake_case, StuffFactory};

/// A typed value: concept + content, optionally named
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stuff {
    pub stuff_code: String,
    pub stuff_name: Option<String>,
    pub concept: Arc<Concept>,
    pub content: StuffContent,
}

impl Stuff {
    fn label(&self) -> String {
        self.stuff_name
            .clone()
            .unwrap_or_else(|| self.stuff_code.clone())
    }

    fn mismatch(&self, expected: &str) -> PipeError {
        PipeError::StuffTypeMismatch {
            name: self.label(),
            expected: expected.to_string(),
            actual: self.content.kind_name().to_string(),
        }
    }

    pub fn is_list(&self) -> bool {
        self.content.is_list()
    }

    pub fn as_str(&self) -> Result<&str> {
        self.content.as_text().ok_or_else(|| self.mismatch("text"))
    }

    pub fn as_number(&self) -> Result<f64> {
        match &self.content {
            StuffContent::Number(n) => Ok(n.number),
            _ => Err(self.mismatch("number")),
        }
    }

    pub fn as_image(&self) -> Result<&ImageContent> {
        match &self.content {
            StuffContent::Image(i) => Ok(i),
            _ => Err(self.mismatch("image")),
        }
    }

    pub fn as_list(&self) -> Result<&[StuffContent]> {
        match &self.content {
            StuffContent::List(l) => Ok(&l.items),
            _ => Err(self.mismatch("list")),
        }
    }

    pub fn as_structured(&self) -> Result<&StructuredContent> {
        match &self.content {
            StuffContent::Structured(s) => Ok(s),
            _ => Err(self.mismatch("structured")),
        }
    }

    /// Copy of this stuff under another name
    pub fn renamed(&self, name: &str) -> Self {
        Self {
            stuff_name: Some(name.to_string()),
            ..self.clone()
        }
    }
}
