//! Declarative checks against a completed exchange
//!
//! An [`Assertion`] names a path into the response document, an
//! [`Operator`], and (for most operators) an expected value. The engine
//! ([`engine::evaluate`], [`engine::run_suite`]) never fails: every
//! evaluation yields an [`AssertionResult`] whose `message` explains the
//! outcome, pass or fail.
//!
//! Before evaluation the exchange metadata ([`ExchangeMeta`]) is merged into
//! the response under the reserved key [`META_KEY`], so checks such as
//! `$._meta.duration_ms < 500` work like any other path.
//!
//! Assertions can be written by hand or compiled from one-line expressions
//! with [`expression::parse_expression`].

pub mod engine;
pub mod expression;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProbeError;

pub use engine::{deep_equal, evaluate, run_suite, summarize, type_name, SuiteSummary};
pub use expression::{parse_expression, parse_expressions};

/// Reserved response key holding exchange metadata.
pub const META_KEY: &str = "_meta";

/// The closed set of assertion operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Deep structural equality
    Equals,
    /// Negated deep equality
    NotEquals,
    /// Substring, array element, or object key
    Contains,
    /// Negated `contains`
    NotContains,
    /// Numeric `>`
    GreaterThan,
    /// Numeric `<`
    LessThan,
    /// Numeric `>=`
    GreaterEqual,
    /// Numeric `<=`
    LessEqual,
    /// Path is defined
    Exists,
    /// Path is undefined
    NotExists,
    /// Value is `null`
    IsNull,
    /// Value is defined and not `null`
    NotNull,
    /// String matches a regular expression
    MatchesRegex,
    /// Type name equals the expected name
    Typeof,
    /// Length equals
    LengthEquals,
    /// Length strictly greater
    LengthGreater,
    /// Length strictly less
    LengthLess,
    /// Named fields present with the expected primitive types
    ConformsTo,
}

impl Operator {
    /// Every operator.
    pub const ALL: [Operator; 18] = [
        Operator::Equals,
        Operator::NotEquals,
        Operator::Contains,
        Operator::NotContains,
        Operator::GreaterThan,
        Operator::LessThan,
        Operator::GreaterEqual,
        Operator::LessEqual,
        Operator::Exists,
        Operator::NotExists,
        Operator::IsNull,
        Operator::NotNull,
        Operator::MatchesRegex,
        Operator::Typeof,
        Operator::LengthEquals,
        Operator::LengthGreater,
        Operator::LengthLess,
        Operator::ConformsTo,
    ];

    /// Wire name, e.g. `length_greater`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "not_equals",
            Operator::Contains => "contains",
            Operator::NotContains => "not_contains",
            Operator::GreaterThan => "greater_than",
            Operator::LessThan => "less_than",
            Operator::GreaterEqual => "greater_equal",
            Operator::LessEqual => "less_equal",
            Operator::Exists => "exists",
            Operator::NotExists => "not_exists",
            Operator::IsNull => "is_null",
            Operator::NotNull => "not_null",
            Operator::MatchesRegex => "matches_regex",
            Operator::Typeof => "typeof",
            Operator::LengthEquals => "length_equals",
            Operator::LengthGreater => "length_greater",
            Operator::LengthLess => "length_less",
            Operator::ConformsTo => "conforms_to",
        }
    }

    /// Whether the operator ignores the expected value.
    pub fn is_unary(&self) -> bool {
        matches!(
            self,
            Operator::Exists | Operator::NotExists | Operator::IsNull | Operator::NotNull
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| ProbeError::Expression(format!("unknown operator `{}`", s)))
    }
}

fn default_enabled() -> bool {
    true
}

fn default_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// One declarative check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    /// Stable identifier, echoed on the result
    #[serde(default = "default_id")]
    pub id: String,
    /// Human-readable label
    #[serde(default)]
    pub label: String,
    /// Path into the response document
    pub path: String,
    /// Comparison to apply
    pub operator: Operator,
    /// Expected value; unused by unary operators
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    /// Disabled assertions are skipped by `run_suite`
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Assertion {
    /// Enabled assertion with a fresh id and a label derived from its parts.
    pub fn new(path: impl Into<String>, operator: Operator, expected: Option<Value>) -> Self {
        let path = path.into();
        let label = match &expected {
            Some(v) if !operator.is_unary() => format!("{} {} {}", path, operator, v),
            _ => format!("{} {}", path, operator),
        };
        Self {
            id: default_id(),
            label,
            path,
            operator,
            expected,
            enabled: true,
        }
    }

    /// Replace the label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// Outcome of evaluating one assertion. Recomputed per evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssertionResult {
    /// Id of the evaluated assertion
    pub assertion_id: String,
    /// Label of the evaluated assertion
    pub label: String,
    /// Whether the check held
    pub passed: bool,
    /// Value found at the path; `None` when undefined
    pub actual: Option<Value>,
    /// Expected value, if any
    pub expected: Option<Value>,
    /// Explanation of the outcome
    pub message: String,
    /// Evaluation time
    pub elapsed_ms: f64,
}

/// Facts about the exchange that are not part of the payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExchangeMeta {
    /// Round-trip time of the exchange
    pub duration_ms: f64,
    /// Transport kind that carried it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
}

impl ExchangeMeta {
    /// Metadata with only a duration.
    pub fn with_duration(duration_ms: f64) -> Self {
        Self {
            duration_ms,
            transport: None,
        }
    }
}
