//! Stuff content - the value shapes stuff can carry

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberContent {
    pub number: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageContent {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfContent {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtmlContent {
    pub inner_html: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TextAndImagesContent {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    pub text_and_images: TextAndImagesContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_view: Option<ImageContent>,
}

/// A structured object of a named structure class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredContent {
    pub class_name: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ListContent {
    pub items: Vec<StuffContent>,
}

/// Capability-typed value held by a stuff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StuffContent {
    Text(TextContent),
    Number(NumberContent),
    Image(ImageContent),
    Pdf(PdfContent),
    Html(HtmlContent),
    Page(PageContent),
    TextAndImages(TextAndImagesContent),
    Structured(StructuredContent),
    List(ListContent),
}

impl StuffContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(TextContent { text: text.into() })
    }

    pub fn number(number: f64) -> Self {
        Self::Number(NumberContent { number })
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self::Image(ImageContent {
            url: url.into(),
            caption: None,
        })
    }

    pub fn structured(class_name: impl Into<String>, value: Value) -> Self {
        Self::Structured(StructuredContent {
            class_name: class_name.into(),
            value,
        })
    }

    pub fn list(items: Vec<StuffContent>) -> Self {
        Self::List(ListContent { items })
    }

    /// Short name of the shape, for error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Number(_) => "number",
            Self::Image(_) => "image",
            Self::Pdf(_) => "pdf",
            Self::Html(_) => "html",
            Self::Page(_) => "page",
            Self::TextAndImages(_) => "text_and_images",
            Self::Structured(_) => "structured",
            Self::List(_) => "list",
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(&t.text),
            _ => None,
        }
    }

    /// JSON view of the content, used for path resolution and templates
    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(t) => Value::String(t.text.clone()),
            Self::Number(n) => json!(n.number),
            Self::Image(i) => json!({"url": i.url, "caption": i.caption}),
            Self::Pdf(p) => json!({"url": p.url}),
            Self::Html(h) => Value::String(h.inner_html.clone()),
            Self::Page(p) => serde_json::to_value(p).unwrap_or(Value::Null),
            Self::TextAndImages(t) => serde_json::to_value(t).unwrap_or(Value::Null),
            Self::Structured(s) => s.value.clone(),
            Self::List(l) => Value::Array(l.items.iter().map(Self::to_json).collect()),
        }
    }

    /// Text rendering inserted into prompt templates
    pub fn rendered(&self) -> String {
        match self {
            Self::Text(t) => t.text.clone(),
            Self::Number(n) => n.number.to_string(),
            Self::Image(i) => i.url.clone(),
            Self::Pdf(p) => p.url.clone(),
            Self::Html(h) => h.inner_html.clone(),
            Self::Page(p) => p.text_and_images.text.clone().unwrap_or_default(),
            Self::TextAndImages(t) => t.text.clone().unwrap_or_default(),
            Self::Structured(s) => {
                serde_json::to_string_pretty(&s.value).unwrap_or_else(|_| s.value.to_string())
            }
            Self::List(l) => l
                .items
                .iter()
                .map(Self::rendered)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_tag_is_kind() {
        let content = StuffContent::text("hello");
        let value = serde_json::to_value(&content).unwrap();
        assert_eq!(value, json!({"kind": "text", "text": "hello"}));
        let back: StuffContent = serde_json::from_value(value).unwrap();
        assert_eq!(back, content);
    }

    #[test]
    fn list_renders_items_line_by_line() {
        let list = StuffContent::list(vec![StuffContent::text("a"), StuffContent::number(2.0)]);
        assert_eq!(list.rendered(), "a\n2");
        assert_eq!(list.to_json(), json!(["a", 2.0]));
    }

    #[test]
    fn structured_json_view_is_the_value() {
        let content = StuffContent::structured("InvoiceContent", json!({"total": 3}));
        assert_eq!(content.to_json()["total"], 3);
        assert_eq!(content.kind_name(), "structured");
    }
}
