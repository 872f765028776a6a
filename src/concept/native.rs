//! Native concept catalog
//!
//! The fixed set of concepts living in the reserved `native` domain.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PipeError;

/// Codes of the native concepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NativeConceptCode {
    Text,
    Image,
    #[serde(rename = "PDF")]
    Pdf,
    Number,
    Page,
    TextAndImages,
    #[serde(rename = "HTML")]
    Html,
    #[serde(rename = "JSON")]
    Json,
    LlmPrompt,
    ImgGenPrompt,
    Anything,
}

impl NativeConceptCode {
    pub const ALL: [NativeConceptCode; 11] = [
        Self::Text,
        Self::Image,
        Self::Pdf,
        Self::Number,
        Self::Page,
        Self::TextAndImages,
        Self::Html,
        Self::Json,
        Self::LlmPrompt,
        Self::ImgGenPrompt,
        Self::Anything,
    ];

    /// Concepts treated as Text-compatible in non-strict compatibility checks.
    ///
    /// Fixed allow-list, not a general string-likeness rule.
    pub const TEXT_COMPATIBLE: [NativeConceptCode; 3] =
        [Self::LlmPrompt, Self::ImgGenPrompt, Self::Html];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "Text",
            Self::Image => "Image",
            Self::Pdf => "PDF",
            Self::Number => "Number",
            Self::Page => "Page",
            Self::TextAndImages => "TextAndImages",
            Self::Html => "HTML",
            Self::Json => "JSON",
            Self::LlmPrompt => "LlmPrompt",
            Self::ImgGenPrompt => "ImgGenPrompt",
            Self::Anything => "Anything",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Text => "A text",
            Self::Image => "An image",
            Self::Pdf => "A PDF document",
            Self::Number => "A number",
            Self::Page => "The content of a page of a document, text and images",
            Self::TextAndImages => "Some text and images",
            Self::Html => "HTML markup",
            Self::Json => "A JSON value",
            Self::LlmPrompt => "A prompt for an LLM",
            Self::ImgGenPrompt => "A prompt for an image generator",
            Self::Anything => "Anything at all",
        }
    }

    /// Name of the content shape this concept carries
    pub fn structure_class_name(&self) -> &'static str {
        match self {
            Self::Text | Self::LlmPrompt | Self::ImgGenPrompt => "TextContent",
            Self::Image => "ImageContent",
            Self::Pdf => "PdfContent",
            Self::Number => "NumberContent",
            Self::Page => "PageContent",
            Self::TextAndImages => "TextAndImagesContent",
            Self::Html => "HtmlContent",
            Self::Json => "JsonContent",
            Self::Anything => "AnyContent",
        }
    }

    pub fn is_text_compatible(&self) -> bool {
        Self::TEXT_COMPATIBLE.contains(self)
    }
}

impl fmt::Display for NativeConceptCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NativeConceptCode {
    type Err = PipeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| PipeError::ConceptNotFound {
                concept: format!("native.{s}"),
            })
    }
}
