//! Prompt templates - single-pass tokenizer and renderer
//!
//! Three reference forms, all addressing working memory:
//! - `$name` or `$name.field`: inline insertion
//! - `@name`: block insertion (content on its own fenced lines)
//! - `{{ name.field }}`: inline insertion, path may contain `[i]`
//!
//! Templates are tokenized once when the pipe is built; rendering walks the
//! token list.

use std::ops::Range;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::{PipeError, Result};
use crate::store::WorkingMemory;

/// Token of a parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Literal text (range in the source string)
    Literal(Range<usize>),
    /// `$path`
    Inline(String),
    /// `@path`
    Block(String),
    /// `{{ path }}`
    Expr(String),
}

impl Token {
    fn path(&self) -> Option<&str> {
        match self {
            Self::Literal(_) => None,
            Self::Inline(p) | Self::Block(p) | Self::Expr(p) => Some(p),
        }
    }
}

/// A tokenized template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    tokens: Vec<Token>,
}

impl Serialize for Template {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

fn is_name_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

/// `@` only opens a reference at a word start, so `user@example.com` stays literal
fn at_word_start(text: &str, at: usize) -> bool {
    !text[..at].chars().next_back().is_some_and(is_name_char)
}

impl Template {
    pub fn parse(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let tokens = tokenize(&source)?;
        Ok(Self { source, tokens })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Root stuff names referenced, deduplicated, in order of first use
    pub fn required_variables(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for path in self.tokens.iter().filter_map(Token::path) {
            let root = root_name(path).to_string();
            if !names.contains(&root) {
                names.push(root);
            }
        }
        names
    }

    /// Render against working memory
    pub fn render(&self, memory: &WorkingMemory) -> Result<String> {
        let mut out = String::with_capacity(self.source.len());
        for token in &self.tokens {
            match token {
                Token::Literal(range) => out.push_str(&self.source[range.clone()]),
                Token::Inline(path) | Token::Expr(path) => {
                    out.push_str(&render_path(memory, path)?);
                }
                Token::Block(path) => {
                    out.push_str("\n```\n");
                    out.push_str(&render_path(memory, path)?);
                    out.push_str("\n```\n");
                }
            }
        }
        Ok(out)
    }
}

/// `invoice.lines[0]` → `invoice`
pub fn root_name(path: &str) -> &str {
    let end = path.find(['.', '[']).unwrap_or(path.len());
    &path[..end]
}

fn render_path(memory: &WorkingMemory, path: &str) -> Result<String> {
    if root_name(path) == path {
        return Ok(memory.stuff_ref(path)?.content.rendered());
    }
    Ok(match memory.resolve_path(path)? {
        Value::String(s) => s,
        other => other.to_string(),
    })
}

fn tokenize(template: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = template.char_indices().peekable();
    let mut literal_start = 0;

    while let Some((i, ch)) = chars.next() {
        match ch {
            '{' if chars.peek().map(|(_, c)| *c) == Some('{') => {
                chars.next();
                let Some(close) = template[i + 2..].find("}}") else {
                    return Err(PipeError::InvalidPath {
                        path: template[i..].to_string(),
                    });
                };
                let path = template[i + 2..i + 2 + close].trim();
                if path.is_empty() {
                    return Err(PipeError::InvalidPath {
                        path: "{{}}".to_string(),
                    });
                }
                if i > literal_start {
                    tokens.push(Token::Literal(literal_start..i));
                }
                tokens.push(Token::Expr(path.to_string()));
                let end = i + 2 + close + 2;
                while chars.peek().is_some_and(|(j, _)| *j < end) {
                    chars.next();
                }
                literal_start = end;
            }
            '$' | '@'
                if chars.peek().is_some_and(|(_, c)| is_name_start(*c))
                    && (ch == '$' || at_word_start(template, i)) =>
            {
                // scan name(.name)*; a trailing dot is punctuation
                let start = i + 1;
                let mut end = start;
                while let Some(&(j, c)) = chars.peek() {
                    if is_name_char(c) {
                        chars.next();
                        end = j + c.len_utf8();
                    } else if c == '.'
                        && template[j + 1..]
                            .chars()
                            .next()
                            .is_some_and(is_name_start)
                    {
                        chars.next();
                        end = j + 1;
                    } else {
                        break;
                    }
                }
                if i > literal_start {
                    tokens.push(Token::Literal(literal_start..i));
                }
                let path = template[start..end].to_string();
                tokens.push(if ch == '$' {
                    Token::Inline(path)
                } else {
                    Token::Block(path)
                });
                literal_start = end;
            }
            _ => {}
        }
    }

    if literal_start < template.len() {
        tokens.push(Token::Literal(literal_start..template.len()));
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concept::{Concept, NativeConceptCode};
    use crate::stuff::{Stuff, StuffContent};
    use serde_json::json;
    use std::sync::Arc;

    fn memory() -> WorkingMemory {
        let text = Arc::new(Concept::native(NativeConceptCode::Text));
        let mut memory = WorkingMemory::new();
        memory
            .add_new_stuff(
                "topic",
                Stuff {
                    stuff_code: "t".into(),
                    stuff_name: None,
                    concept: Arc::clone(&text),
                    content: StuffContent::text("rust"),
                },
            )
            .unwrap();
        memory
            .add_new_stuff(
                "profile",
                Stuff {
                    stuff_code: "p".into(),
                    stuff_name: None,
                    concept: text,
                    content: StuffContent::structured(
                        "Profile",
                        json!({"name": "Ada", "tags": ["x", "y"]}),
                    ),
                },
            )
            .unwrap();
        memory
    }

    #[test]
    fn tokenize_mixed_forms() {
        let template =
            Template::parse("Write about $topic for @profile, {{ profile.name }}.").unwrap();
        assert_eq!(
            template.required_variables(),
            vec!["topic".to_string(), "profile".to_string()]
        );
        assert!(matches!(template.tokens()[1], Token::Inline(ref p) if p == "topic"));
        assert!(matches!(template.tokens()[3], Token::Block(ref p) if p == "profile"));
        assert!(matches!(template.tokens()[5], Token::Expr(ref p) if p == "profile.name"));
    }

    #[test]
    fn trailing_dot_is_punctuation() {
        let template = Template::parse("About $topic.").unwrap();
        assert_eq!(template.render(&memory()).unwrap(), "About rust.");
    }

    #[test]
    fn dollar_without_name_is_literal() {
        let template = Template::parse("costs $5 @ noon").unwrap();
        assert!(template.required_variables().is_empty());
        assert_eq!(template.render(&memory()).unwrap(), "costs $5 @ noon");
    }

    #[test]
    fn at_inside_a_word_is_literal() {
        let template = Template::parse("Mail user@example.com about (@topic)").unwrap();
        assert_eq!(template.required_variables(), vec!["topic".to_string()]);
        assert_eq!(
            template.render(&memory()).unwrap(),
            "Mail user@example.com about (\n```\nrust\n```\n)"
        );
    }

    #[test]
    fn render_paths_and_blocks() {
        let template = Template::parse("{{ profile.tags[1] }} $profile.name @topic").unwrap();
        assert_eq!(
            template.render(&memory()).unwrap(),
            "y Ada \n```\nrust\n```\n"
        );
    }

    #[test]
    fn render_missing_variable_fails() {
        let template = Template::parse("$nope").unwrap();
        let err = template.render(&memory()).unwrap_err();
        assert!(matches!(err, PipeError::StuffNotFound { .. }));
    }

    #[test]
    fn unclosed_expression_is_rejected() {
        assert!(Template::parse("{{ topic").is_err());
    }
}
