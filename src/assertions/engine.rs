//! Assertion evaluation
//!
//! Mismatched types never raise: a numeric comparison against a string, a
//! length check on a number, or a regex against an object all resolve to a
//! failed result with an explanation.

use std::time::Instant;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use super::{Assertion, AssertionResult, ExchangeMeta, Operator, META_KEY};
use crate::path;

/// Type name of a possibly-undefined value.
///
/// One of `string`, `number`, `boolean`, `object`, `array`, `null`,
/// `undefined`.
pub fn type_name(value: Option<&Value>) -> &'static str {
    match value {
        None => "undefined",
        Some(Value::Null) => "null",
        Some(Value::Bool(_)) => "boolean",
        Some(Value::Number(_)) => "number",
        Some(Value::String(_)) => "string",
        Some(Value::Array(_)) => "array",
        Some(Value::Object(_)) => "object",
    }
}

/// Structural equality: arrays element-wise in order, objects by key set and
/// recursive value, numbers by value (`1 == 1.0`).
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                return x == y;
            }
            if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                return x == y;
            }
            x.as_f64() == y.as_f64()
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| deep_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).map(|w| deep_equal(v, w)).unwrap_or(false))
        }
        _ => a == b,
    }
}

/// Copy of `response` with `meta` stored under [`META_KEY`].
///
/// Non-object responses are returned unchanged.
pub fn merge_meta(response: &Value, meta: Option<&ExchangeMeta>) -> Value {
    let mut doc = response.clone();
    if let (Some(meta), Value::Object(map)) = (meta, &mut doc) {
        map.insert(
            META_KEY.to_string(),
            serde_json::to_value(meta).unwrap_or(Value::Null),
        );
    }
    doc
}

fn render(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(v) => v.to_string(),
    }
}

fn plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn length_of(value: Option<&Value>) -> Option<usize> {
    match value? {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        Value::Object(map) => Some(map.len()),
        _ => None,
    }
}

fn contains(actual: Option<&Value>, expected: &Value) -> Option<bool> {
    match actual? {
        Value::String(s) => Some(s.contains(&plain_text(expected))),
        Value::Array(items) => Some(items.iter().any(|item| deep_equal(item, expected))),
        Value::Object(map) => Some(map.contains_key(&plain_text(expected))),
        _ => None,
    }
}

/// Outcome plus explanation, before it is wrapped into a result.
struct Verdict {
    passed: bool,
    message: String,
}

impl Verdict {
    fn new(passed: bool, message: impl Into<String>) -> Self {
        Self {
            passed,
            message: message.into(),
        }
    }
}

fn compare_numbers(
    op: Operator,
    path: &str,
    actual: Option<&Value>,
    expected: &Value,
    test: fn(f64, f64) -> bool,
) -> Verdict {
    match (actual.and_then(Value::as_f64), expected.as_f64()) {
        (Some(a), Some(e)) => {
            let passed = test(a, e);
            Verdict::new(
                passed,
                format!(
                    "{} {} {}: {} (actual {})",
                    path,
                    op,
                    expected,
                    if passed { "passed" } else { "failed" },
                    a
                ),
            )
        }
        _ => Verdict::new(
            false,
            format!(
                "{} {} {}: cannot compare {} with {} numerically",
                path,
                op,
                expected,
                type_name(actual),
                type_name(Some(expected))
            ),
        ),
    }
}

fn compare_lengths(
    op: Operator,
    path: &str,
    actual: Option<&Value>,
    expected: &Value,
    test: fn(f64, f64) -> bool,
) -> Verdict {
    match (length_of(actual), expected.as_f64()) {
        (Some(len), Some(e)) => {
            let passed = test(len as f64, e);
            Verdict::new(
                passed,
                format!(
                    "{} {} {}: {} (length {})",
                    path,
                    op,
                    expected,
                    if passed { "passed" } else { "failed" },
                    len
                ),
            )
        }
        (None, _) => Verdict::new(
            false,
            format!("{} {}: {} has no length", path, op, type_name(actual)),
        ),
        (_, None) => Verdict::new(
            false,
            format!("{} {}: expected length {} is not a number", path, op, expected),
        ),
    }
}

fn conforms(path: &str, actual: Option<&Value>, expected: &Value) -> Verdict {
    let Some(schema) = expected.as_object() else {
        return Verdict::new(
            false,
            format!("{} conforms_to: expected a field-to-type mapping, got {}", path, expected),
        );
    };
    let Some(Value::Object(obj)) = actual else {
        return Verdict::new(
            false,
            format!("{} conforms_to: actual is {}, not an object", path, type_name(actual)),
        );
    };

    let mismatches: Vec<String> = schema
        .iter()
        .filter_map(|(field, wanted)| {
            let wanted = wanted.as_str().unwrap_or("<invalid>");
            let found = type_name(obj.get(field));
            (found != wanted).then(|| format!("{}: expected {}, found {}", field, wanted, found))
        })
        .collect();

    if mismatches.is_empty() {
        Verdict::new(true, format!("{} conforms_to: all {} fields match", path, schema.len()))
    } else {
        Verdict::new(
            false,
            format!("{} conforms_to: {}", path, mismatches.join("; ")),
        )
    }
}

fn judge(assertion: &Assertion, actual: Option<&Value>) -> Verdict {
    let path = assertion.path.as_str();
    let op = assertion.operator;
    let expected = assertion.expected.clone().unwrap_or(Value::Null);

    match op {
        Operator::Equals | Operator::NotEquals => {
            let equal = actual.map(|a| deep_equal(a, &expected)).unwrap_or(false);
            let passed = if op == Operator::Equals { equal } else { !equal };
            Verdict::new(
                passed,
                format!(
                    "{} {} {}: {} (actual {})",
                    path,
                    op,
                    expected,
                    if passed { "passed" } else { "failed" },
                    render(actual)
                ),
            )
        }
        Operator::Contains | Operator::NotContains => match contains(actual, &expected) {
            Some(found) => {
                let passed = if op == Operator::Contains { found } else { !found };
                Verdict::new(
                    passed,
                    format!(
                        "{} {} {}: {}",
                        path,
                        op,
                        expected,
                        if passed { "passed" } else { "failed" }
                    ),
                )
            }
            None => Verdict::new(
                false,
                format!("{} {}: cannot search inside {}", path, op, type_name(actual)),
            ),
        },
        Operator::GreaterThan => compare_numbers(op, path, actual, &expected, |a, e| a > e),
        Operator::LessThan => compare_numbers(op, path, actual, &expected, |a, e| a < e),
        Operator::GreaterEqual => compare_numbers(op, path, actual, &expected, |a, e| a >= e),
        Operator::LessEqual => compare_numbers(op, path, actual, &expected, |a, e| a <= e),
        Operator::Exists => {
            let passed = actual.is_some();
            Verdict::new(
                passed,
                format!(
                    "{} exists: {}",
                    path,
                    if passed { "passed" } else { "path is undefined" }
                ),
            )
        }
        Operator::NotExists => {
            let passed = actual.is_none();
            Verdict::new(
                passed,
                format!(
                    "{} not_exists: {}",
                    path,
                    if passed {
                        "passed".to_string()
                    } else {
                        format!("found {}", render(actual))
                    }
                ),
            )
        }
        Operator::IsNull => {
            let passed = matches!(actual, Some(Value::Null));
            Verdict::new(
                passed,
                format!("{} is_null: {} (actual {})", path, pass_word(passed), render(actual)),
            )
        }
        Operator::NotNull => {
            let passed = !matches!(actual, None | Some(Value::Null));
            Verdict::new(
                passed,
                format!("{} not_null: {} (actual {})", path, pass_word(passed), render(actual)),
            )
        }
        Operator::MatchesRegex => {
            let pattern = plain_text(&expected);
            let re = match Regex::new(&pattern) {
                Ok(re) => re,
                Err(e) => {
                    return Verdict::new(
                        false,
                        format!("{} matches_regex: invalid pattern `{}`: {}", path, pattern, e),
                    )
                }
            };
            let subject = match actual {
                Some(Value::String(s)) => s.clone(),
                Some(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string(),
                _ => {
                    return Verdict::new(
                        false,
                        format!("{} matches_regex: cannot match against {}", path, type_name(actual)),
                    )
                }
            };
            let passed = re.is_match(&subject);
            Verdict::new(
                passed,
                format!("{} matches_regex /{}/: {}", path, pattern, pass_word(passed)),
            )
        }
        Operator::Typeof => {
            let wanted = plain_text(&expected);
            let found = type_name(actual);
            let passed = found == wanted;
            Verdict::new(
                passed,
                format!("{} typeof {}: {} (actual {})", path, wanted, pass_word(passed), found),
            )
        }
        Operator::LengthEquals => {
            compare_lengths(op, path, actual, &expected, |l, e| (l - e).abs() < f64::EPSILON)
        }
        Operator::LengthGreater => compare_lengths(op, path, actual, &expected, |l, e| l > e),
        Operator::LengthLess => compare_lengths(op, path, actual, &expected, |l, e| l < e),
        Operator::ConformsTo => conforms(path, actual, &expected),
    }
}

fn pass_word(passed: bool) -> &'static str {
    if passed {
        "passed"
    } else {
        "failed"
    }
}

fn evaluate_document(assertion: &Assertion, doc: &Value) -> AssertionResult {
    let started = Instant::now();
    let actual = path::extract(doc, &assertion.path);
    let verdict = judge(assertion, actual.as_ref());
    AssertionResult {
        assertion_id: assertion.id.clone(),
        label: assertion.label.clone(),
        passed: verdict.passed,
        actual,
        expected: assertion.expected.clone(),
        message: verdict.message,
        elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
    }
}

/// Evaluate one assertion against `response`, with `meta` merged under
/// `_meta`. Never fails.
///
/// # Examples
///
/// ```
/// use mcp_probe::assertions::{evaluate, Assertion, Operator};
/// use serde_json::json;
///
/// let response = json!({"jsonrpc": "2.0", "result": {}, "id": 1});
/// let check = Assertion::new("$.error", Operator::NotExists, None);
/// assert!(evaluate(&check, &response, None).passed);
/// ```
pub fn evaluate(
    assertion: &Assertion,
    response: &Value,
    meta: Option<&ExchangeMeta>,
) -> AssertionResult {
    evaluate_document(assertion, &merge_meta(response, meta))
}

/// Evaluate every enabled assertion, in order. Never fails.
pub fn run_suite(
    assertions: &[Assertion],
    response: &Value,
    meta: Option<&ExchangeMeta>,
) -> Vec<AssertionResult> {
    let doc = merge_meta(response, meta);
    let results: Vec<AssertionResult> = assertions
        .iter()
        .filter(|a| a.enabled)
        .map(|a| evaluate_document(a, &doc))
        .collect();
    let summary = summarize(&results);
    tracing::debug!(
        passed = summary.passed,
        failed = summary.failed,
        "assertion suite evaluated"
    );
    results
}

/// Pass/fail counts over a set of results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SuiteSummary {
    /// Number of results
    pub total: usize,
    /// Passed results
    pub passed: usize,
    /// Failed results
    pub failed: usize,
}

impl SuiteSummary {
    /// True when nothing failed.
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Count passes and failures.
pub fn summarize(results: &[AssertionResult]) -> SuiteSummary {
    let passed = results.iter().filter(|r| r.passed).count();
    SuiteSummary {
        total: results.len(),
        passed,
        failed: results.len() - passed,
    }
}
