//! Stuff paths - minimal subset
//!
//! A stuff path names a working-memory entry and optionally walks into its
//! structured content:
//! - `invoice` (whole stuff)
//! - `invoice.total.currency` (dot notation)
//! - `invoice.lines[0].label` or `invoice.lines.0.label` (array index)
//!
//! Filters, wildcards and slices are rejected.

use serde_json::Value;

use crate::error::{PipeError, Result};

/// A parsed path segment
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Object field access: .field
    Field(String),
    /// Array index access: [0]
    Index(usize),
}

/// A stuff name plus the segments to walk inside its content
#[derive(Debug, Clone, PartialEq)]
pub struct StuffPath {
    pub stuff_name: String,
    pub segments: Vec<Segment>,
}

/// Parse `stuff.field[0].sub` into a [`StuffPath`]
pub fn parse_stuff_path(path: &str) -> Result<StuffPath> {
    let path = path.trim();
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };

    // The stuff name itself may carry an index: items[0]
    let (stuff_name, head_index) = match head.find('[') {
        Some(pos) => (&head[..pos], Some(&head[pos..])),
        None => (head, None),
    };
    if stuff_name.is_empty() {
        return Err(invalid(path));
    }

    let mut segments = Vec::new();
    if let Some(index_part) = head_index {
        segments.extend(parse_segments(index_part).map_err(|_| invalid(path))?);
    }
    if let Some(rest) = rest {
        segments.extend(parse_segments(rest).map_err(|_| invalid(path))?);
    }

    Ok(StuffPath {
        stuff_name: stuff_name.to_string(),
        segments,
    })
}

/// Parse a relative path into segments
///
/// Examples:
/// - "total.currency" → [Field("total"), Field("currency")]
/// - "lines[0].label" → [Field("lines"), Index(0), Field("label")]
pub fn parse_segments(path: &str) -> Result<Vec<Segment>> {
    if path.is_empty() {
        return Ok(vec![]);
    }

    let mut segments = Vec::new();

    for part in path.split('.') {
        if part.is_empty() {
            return Err(invalid(path));
        }

        // Field with one or more trailing indices: lines[0] or [0][1]
        if let Some(bracket_pos) = part.find('[') {
            let field = &part[..bracket_pos];
            if !field.is_empty() {
                segments.push(Segment::Field(field.to_string()));
            }

            let mut rest = &part[bracket_pos..];
            while !rest.is_empty() {
                let close = rest.find(']').ok_or_else(|| invalid(path))?;
                if !rest.starts_with('[') {
                    return Err(invalid(path));
                }
                let index: usize = rest[1..close].parse().map_err(|_| invalid(path))?;
                segments.push(Segment::Index(index));
                rest = &rest[close + 1..];
            }
        } else if let Ok(index) = part.parse::<usize>() {
            segments.push(Segment::Index(index));
        } else {
            segments.push(Segment::Field(part.to_string()));
        }
    }

    Ok(segments)
}

/// Walk segments into a JSON value by reference
pub fn apply<'a>(value: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    let mut current = value;

    for segment in segments {
        current = match segment {
            Segment::Field(name) => current.get(name)?,
            Segment::Index(idx) => current.get(*idx)?,
        };
    }

    Some(current)
}

fn invalid(path: &str) -> PipeError {
    PipeError::InvalidPath {
        path: path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_bare_stuff_name() {
        let path = parse_stuff_path("invoice").unwrap();
        assert_eq!(path.stuff_name, "invoice");
        assert!(path.segments.is_empty());
    }

    #[test]
    fn parse_nested_fields() {
        let path = parse_stuff_path("invoice.total.currency").unwrap();
        assert_eq!(path.stuff_name, "invoice");
        assert_eq!(
            path.segments,
            vec![
                Segment::Field("total".to_string()),
                Segment::Field("currency".to_string()),
            ]
        );
    }

    #[test]
    fn parse_array_index_forms() {
        let bracket = parse_stuff_path("invoice.lines[1].label").unwrap();
        let dotted = parse_stuff_path("invoice.lines.1.label").unwrap();
        assert_eq!(bracket.segments, dotted.segments);
        assert_eq!(bracket.segments[1], Segment::Index(1));
    }

    #[test]
    fn parse_index_on_stuff_name() {
        let path = parse_stuff_path("pages[2]").unwrap();
        assert_eq!(path.stuff_name, "pages");
        assert_eq!(path.segments, vec![Segment::Index(2)]);
    }

    #[test]
    fn rejects_unsupported_syntax() {
        assert!(parse_stuff_path("").is_err());
        assert!(parse_stuff_path("a..b").is_err());
        assert!(parse_stuff_path("a.b[*]").is_err());
        assert!(parse_stuff_path("a.b[0:2]").is_err());
        assert!(parse_stuff_path(".a").is_err());
    }

    #[test]
    fn apply_walks_by_reference() {
        let value = json!({"lines": [{"label": "first"}, {"label": "second"}]});
        let segments = parse_segments("lines[1].label").unwrap();
        assert_eq!(apply(&value, &segments), Some(&json!("second")));
        assert_eq!(apply(&value, &parse_segments("lines[5]").unwrap()), None);
    }
}
