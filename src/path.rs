//! Restricted path queries over JSON documents
//!
//! Used by the sequence runner (variable extraction) and the assertion
//! engine. Syntax:
//!
//! - `$` -- optional root marker; `""` and `"$"` select the whole document
//! - `.field` / `['field']` / `["field"]` -- object member
//! - `[N]` / `.N` -- array index (on an object, the member named `"N"`)
//! - `*` / `[*]` -- wildcard
//!
//! Evaluation rules:
//!
//! - A wildcard applied to an array returns the whole array and ignores the
//!   rest of the path. Applied to anything else it yields undefined.
//! - A field segment applied to an array is mapped over the elements; the
//!   elements where it is undefined are dropped.
//! - Any segment applied to `null` or to a missing value yields undefined.
//!
//! Undefined is `None`. A path that does not parse also evaluates to `None`
//! through [`extract`]; use [`parse_path`] to report syntax errors.

use std::borrow::Cow;

use serde_json::Value;

use crate::error::ProbeError;

/// One step of a parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Object member
    Field(String),
    /// Array position
    Index(usize),
    /// `*`
    Wildcard,
}

fn push_dotted(token: &str, out: &mut Vec<Segment>) {
    if token == "*" {
        out.push(Segment::Wildcard);
    } else if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
        match token.parse() {
            Ok(n) => out.push(Segment::Index(n)),
            Err(_) => out.push(Segment::Field(token.to_string())),
        }
    } else {
        out.push(Segment::Field(token.to_string()));
    }
}

/// Parse `path` into segments.
///
/// # Examples
///
/// ```
/// use mcp_probe::path::{parse_path, Segment};
///
/// let segs = parse_path("$.result.tools[0].name").unwrap();
/// assert_eq!(segs, vec![
///     Segment::Field("result".into()),
///     Segment::Field("tools".into()),
///     Segment::Index(0),
///     Segment::Field("name".into()),
/// ]);
/// ```
pub fn parse_path(path: &str) -> Result<Vec<Segment>, ProbeError> {
    let path = path.trim();
    let body = path.strip_prefix('$').unwrap_or(path);
    let mut segments = Vec::new();
    let mut token = String::new();
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !token.is_empty() {
                    push_dotted(&token, &mut segments);
                    token.clear();
                }
            }
            '[' => {
                if !token.is_empty() {
                    push_dotted(&token, &mut segments);
                    token.clear();
                }
                let mut inner = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    inner.push(c);
                }
                if !closed {
                    return Err(ProbeError::Expression(format!(
                        "unclosed `[` in path `{}`",
                        path
                    )));
                }
                let inner = inner.trim();
                let quoted = inner.len() >= 2
                    && ((inner.starts_with('\'') && inner.ends_with('\''))
                        || (inner.starts_with('"') && inner.ends_with('"')));
                if quoted {
                    segments.push(Segment::Field(inner[1..inner.len() - 1].to_string()));
                } else if inner == "*" {
                    segments.push(Segment::Wildcard);
                } else {
                    let n = inner.parse::<usize>().map_err(|_| {
                        ProbeError::Expression(format!(
                            "invalid index `[{}]` in path `{}`",
                            inner, path
                        ))
                    })?;
                    segments.push(Segment::Index(n));
                }
            }
            ']' => {
                return Err(ProbeError::Expression(format!(
                    "unexpected `]` in path `{}`",
                    path
                )))
            }
            c => token.push(c),
        }
    }
    if !token.is_empty() {
        push_dotted(&token, &mut segments);
    }
    Ok(segments)
}

fn step_ref<'a>(value: &'a Value, segment: &Segment) -> Option<Cow<'a, Value>> {
    match (segment, value) {
        (_, Value::Null) => None,
        (Segment::Index(n), Value::Array(items)) => items.get(*n).map(Cow::Borrowed),
        (Segment::Index(n), Value::Object(map)) => map.get(&n.to_string()).map(Cow::Borrowed),
        (Segment::Field(name), Value::Object(map)) => map.get(name).map(Cow::Borrowed),
        (Segment::Field(name), Value::Array(items)) => Some(Cow::Owned(Value::Array(
            items
                .iter()
                .filter_map(|item| item.as_object()?.get(name).cloned())
                .collect(),
        ))),
        _ => None,
    }
}

/// Evaluate already-parsed segments against `doc`.
pub fn extract_segments(doc: &Value, segments: &[Segment]) -> Option<Value> {
    let mut current: Cow<'_, Value> = Cow::Borrowed(doc);
    for segment in segments {
        if *segment == Segment::Wildcard {
            return if matches!(current.as_ref(), Value::Array(_)) {
                Some(current.into_owned())
            } else {
                None
            };
        }
        current = match current {
            Cow::Borrowed(v) => step_ref(v, segment)?,
            Cow::Owned(v) => Cow::Owned(step_ref(&v, segment)?.into_owned()),
        };
    }
    Some(current.into_owned())
}

/// Evaluate `path` against `doc`. `None` means undefined.
///
/// # Examples
///
/// ```
/// use mcp_probe::path::extract;
/// use serde_json::json;
///
/// let doc = json!({"result": {"tools": [{"name": "a"}, {"name": "b"}, {}]}});
/// assert_eq!(extract(&doc, "$.result.tools.name"), Some(json!(["a", "b"])));
/// assert_eq!(extract(&doc, "$.result.tools[1].name"), Some(json!("b")));
/// assert_eq!(extract(&doc, "$.error"), None);
/// ```
pub fn extract(doc: &Value, path: &str) -> Option<Value> {
    match parse_path(path) {
        Ok(segments) => extract_segments(doc, &segments),
        Err(e) => {
            tracing::debug!(path = %path, error = %e, "unparsable path evaluates to undefined");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "tools": [
                    {"name": "echo", "tags": ["a", "b"]},
                    {"name": "sum"},
                    {"title": "nameless"}
                ],
                "cursor": null,
                "0": "zero-key"
            }
        })
    }

    #[test]
    fn test_root_selects_document() {
        assert_eq!(extract(&doc(), "$"), Some(doc()));
        assert_eq!(extract(&doc(), ""), Some(doc()));
    }

    #[test]
    fn test_dotted_and_indexed_access() {
        assert_eq!(extract(&doc(), "$.result.tools[0].name"), Some(json!("echo")));
        assert_eq!(extract(&doc(), "result.tools.1.name"), Some(json!("sum")));
        assert_eq!(extract(&doc(), "$['result'][\"tools\"][0]['name']"), Some(json!("echo")));
    }

    #[test]
    fn test_index_on_object_reads_numeric_key() {
        assert_eq!(extract(&doc(), "$.result.0"), Some(json!("zero-key")));
    }

    #[test]
    fn test_missing_and_out_of_range_are_undefined() {
        assert_eq!(extract(&doc(), "$.error"), None);
        assert_eq!(extract(&doc(), "$.result.tools[9]"), None);
        assert_eq!(extract(&doc(), "$.id.deeper"), None);
    }

    #[test]
    fn test_null_stops_evaluation() {
        assert_eq!(extract(&doc(), "$.result.cursor"), Some(Value::Null));
        assert_eq!(extract(&doc(), "$.result.cursor.next"), None);
        assert_eq!(extract(&doc(), "$.result.cursor[0]"), None);
    }

    #[test]
    fn test_wildcard_short_circuits_on_arrays() {
        let tools = doc()["result"]["tools"].clone();
        assert_eq!(extract(&doc(), "$.result.tools.*"), Some(tools.clone()));
        assert_eq!(extract(&doc(), "$.result.tools[*].name.whatever"), Some(tools));
    }

    #[test]
    fn test_wildcard_on_non_array_is_undefined() {
        assert_eq!(extract(&doc(), "$.result.*"), None);
    }

    #[test]
    fn test_field_maps_over_arrays_and_drops_undefined() {
        assert_eq!(extract(&doc(), "$.result.tools.name"), Some(json!(["echo", "sum"])));
        assert_eq!(extract(&doc(), "$.result.tools.tags"), Some(json!([["a", "b"]])));
        assert_eq!(extract(&doc(), "$.result.tools.missing"), Some(json!([])));
    }

    #[test]
    fn test_field_projection_is_one_level() {
        let nested = json!({"rows": [[{"a": 1}], {"a": 2}, 7]});
        assert_eq!(extract(&nested, "$.rows.a"), Some(json!([2])));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_path("$.a[0").is_err());
        assert!(parse_path("$.a]").is_err());
        assert!(parse_path("$.a[x]").is_err());
        assert_eq!(extract(&doc(), "$.a[0"), None);
    }

    #[test]
    fn test_parse_wildcard_forms() {
        assert_eq!(
            parse_path("a.*").unwrap(),
            vec![Segment::Field("a".into()), Segment::Wildcard]
        );
        assert_eq!(
            parse_path("a[*]").unwrap(),
            vec![Segment::Field("a".into()), Segment::Wildcard]
        );
    }
}
