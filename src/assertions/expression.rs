//! One-line assertion expressions
//!
//! ```text
//! $.error not exists
//! $.result.tools length >= 1
//! $.result.serverInfo.name == "demo"
//! $._meta.duration_ms < 500
//! $.result.content[0].text matches ^hello
//! ```
//!
//! Operator tokens are tried in a fixed order and the first form that
//! matches wins, so `length >=` is never read as a plain `>=`. The
//! right-hand side is read as a JSON literal when it parses as one, and as a
//! bare string (surrounding quotes stripped) otherwise.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::{Assertion, Operator};
use crate::error::ProbeError;

#[derive(Debug, Clone, Copy)]
enum Form {
    Length,
    IsEmpty,
    IsNotEmpty,
    IsNull,
    IsNotNull,
    Exists,
    NotExists,
    IsType,
    Matches,
    Conforms,
    NotContains,
    Contains,
    GreaterEqual,
    LessEqual,
    Greater,
    Less,
    NotEqual,
    Equal,
}

// Paths never contain whitespace or comparison characters, so an operator
// inside a quoted literal cannot end the path early.
const PATH: &str = r"([^\s<>=!]+)";

fn forms() -> &'static [(Regex, Form)] {
    static FORMS: OnceLock<Vec<(Regex, Form)>> = OnceLock::new();
    FORMS.get_or_init(|| {
        [
            (r"^{path}\s+length\s*(==|=|>=|>|<=|<)\s*(.+)$", Form::Length),
            (r"^{path}\s+is\s+empty$", Form::IsEmpty),
            (r"^{path}\s+is\s+not\s+empty$", Form::IsNotEmpty),
            (r"^{path}\s+is\s+null$", Form::IsNull),
            (r"^{path}\s+is\s+not\s+null$", Form::IsNotNull),
            (r"^{path}\s+exists$", Form::Exists),
            (r"^{path}\s+not\s+exists$", Form::NotExists),
            (
                r"^{path}\s+is\s+(string|number|boolean|object|array|null|undefined)$",
                Form::IsType,
            ),
            (r"^{path}\s+matches\s+(.+)$", Form::Matches),
            (r"^{path}\s+conforms(?:\s+to)?\s+(.+)$", Form::Conforms),
            (r"^{path}\s+not\s+contains\s+(.+)$", Form::NotContains),
            (r"^{path}\s+contains\s+(.+)$", Form::Contains),
            (r"^{path}\s*>=\s*(.+)$", Form::GreaterEqual),
            (r"^{path}\s*<=\s*(.+)$", Form::LessEqual),
            (r"^{path}\s*>\s*(.+)$", Form::Greater),
            (r"^{path}\s*<\s*(.+)$", Form::Less),
            (r"^{path}\s*!=\s*(.+)$", Form::NotEqual),
            (r"^{path}\s*==?\s*(.+)$", Form::Equal),
        ]
        .into_iter()
        .filter_map(|(pattern, form)| match Regex::new(&pattern.replacen("{path}", PATH, 1)) {
            Ok(re) => Some((re, form)),
            Err(e) => {
                tracing::error!(pattern, error = %e, "invalid built-in expression pattern");
                None
            }
        })
        .collect()
    })
}

/// Read the right-hand side of an expression.
///
/// JSON literals (numbers, booleans, `null`, double-quoted strings, objects,
/// arrays) keep their type. Anything else is a string, with one pair of
/// surrounding single or double quotes removed.
pub fn parse_literal(text: &str) -> Value {
    let text = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return value;
    }
    let unquoted = text
        .strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
        .or_else(|| text.strip_prefix('"').and_then(|t| t.strip_suffix('"')))
        .unwrap_or(text);
    Value::String(unquoted.to_string())
}

fn pattern_literal(text: &str) -> Value {
    let text = text.trim();
    if let Some(inner) = text.strip_prefix('/').and_then(|t| t.strip_suffix('/')) {
        if !inner.is_empty() {
            return Value::String(inner.to_string());
        }
    }
    match parse_literal(text) {
        Value::String(s) => Value::String(s),
        other => Value::String(other.to_string()),
    }
}

fn length_assertion(path: &str, op: &str, rhs: &str, line: &str) -> Result<Assertion, ProbeError> {
    let n = parse_literal(rhs);
    let not_a_number =
        || ProbeError::Expression(format!("length needs a number in `{}`, got `{}`", line, rhs.trim()));

    // `>= N` compiles to `> N-1` and `<= N` to `< N+1`.
    let shifted = |delta: i64| -> Result<Value, ProbeError> {
        if let Some(i) = n.as_i64() {
            Ok(i
                .checked_add(delta)
                .map(Value::from)
                .unwrap_or_else(|| Value::from(i as f64 + delta as f64)))
        } else if let Some(f) = n.as_f64() {
            Ok(Value::from(f + delta as f64))
        } else {
            Err(not_a_number())
        }
    };

    let (operator, expected) = match op {
        "==" | "=" => (Operator::LengthEquals, shifted(0)?),
        ">" => (Operator::LengthGreater, shifted(0)?),
        ">=" => (Operator::LengthGreater, shifted(-1)?),
        "<" => (Operator::LengthLess, shifted(0)?),
        "<=" => (Operator::LengthLess, shifted(1)?),
        _ => return Err(not_a_number()),
    };
    Ok(Assertion::new(path, operator, Some(expected)))
}

/// Compile one expression line into an assertion.
///
/// The assertion's label is the trimmed source line.
///
/// # Errors
///
/// Returns [`ProbeError::Expression`] when no operator form matches or a
/// `length` comparison is given a non-numeric operand.
///
/// # Examples
///
/// ```
/// use mcp_probe::assertions::{parse_expression, Operator};
/// use serde_json::json;
///
/// let a = parse_expression("$.result.tools length >= 1").unwrap();
/// assert_eq!(a.operator, Operator::LengthGreater);
/// assert_eq!(a.expected, Some(json!(0)));
/// ```
pub fn parse_expression(line: &str) -> Result<Assertion, ProbeError> {
    let line = line.trim();
    let (caps, form) = forms()
        .iter()
        .find_map(|(re, form)| re.captures(line).map(|caps| (caps, *form)))
        .ok_or_else(|| ProbeError::Expression(format!("no operator recognised in `{}`", line)))?;

    let path = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    let arg = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or_default();

    let assertion = match form {
        Form::Length => length_assertion(path, arg(2), arg(3), line)?,
        Form::IsEmpty => Assertion::new(path, Operator::LengthEquals, Some(Value::from(0))),
        Form::IsNotEmpty => Assertion::new(path, Operator::LengthGreater, Some(Value::from(0))),
        Form::IsNull => Assertion::new(path, Operator::IsNull, None),
        Form::IsNotNull => Assertion::new(path, Operator::NotNull, None),
        Form::Exists => Assertion::new(path, Operator::Exists, None),
        Form::NotExists => Assertion::new(path, Operator::NotExists, None),
        Form::IsType => Assertion::new(path, Operator::Typeof, Some(Value::from(arg(2)))),
        Form::Matches => Assertion::new(path, Operator::MatchesRegex, Some(pattern_literal(arg(2)))),
        Form::Conforms => {
            let schema = parse_literal(arg(2));
            if !schema.is_object() {
                return Err(ProbeError::Expression(format!(
                    "conforms needs an object like {{\"field\": \"type\"}} in `{}`",
                    line
                )));
            }
            Assertion::new(path, Operator::ConformsTo, Some(schema))
        }
        Form::NotContains => Assertion::new(path, Operator::NotContains, Some(parse_literal(arg(2)))),
        Form::Contains => Assertion::new(path, Operator::Contains, Some(parse_literal(arg(2)))),
        Form::GreaterEqual => Assertion::new(path, Operator::GreaterEqual, Some(parse_literal(arg(2)))),
        Form::LessEqual => Assertion::new(path, Operator::LessEqual, Some(parse_literal(arg(2)))),
        Form::Greater => Assertion::new(path, Operator::GreaterThan, Some(parse_literal(arg(2)))),
        Form::Less => Assertion::new(path, Operator::LessThan, Some(parse_literal(arg(2)))),
        Form::NotEqual => Assertion::new(path, Operator::NotEquals, Some(parse_literal(arg(2)))),
        Form::Equal => Assertion::new(path, Operator::Equals, Some(parse_literal(arg(2)))),
    };
    Ok(assertion.with_label(line))
}

/// Compile a multi-line script, one expression per line.
///
/// Blank lines and lines starting with `#` are skipped. The first bad line
/// aborts compilation; the error names its line number.
pub fn parse_expressions(script: &str) -> Result<Vec<Assertion>, ProbeError> {
    script
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let t = line.trim();
            !t.is_empty() && !t.starts_with('#')
        })
        .map(|(i, line)| {
            parse_expression(line).map_err(|e| match e {
                ProbeError::Expression(msg) => {
                    ProbeError::Expression(format!("line {}: {}", i + 1, msg))
                }
                other => other,
            })
        })
        .collect()
}
