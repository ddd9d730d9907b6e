//! `validate`: structural JSON-RPC checks without a server

use colored::Colorize;
use serde_json::Value;

use crate::commands::read_inline_or_file;
use crate::error::Result;
use crate::mcp::codec::{validate_request, validate_response};

/// Violations for one document. Objects with a `method` are checked as
/// requests or notifications, everything else as a response.
pub fn violations_for(value: &Value) -> Vec<String> {
    if value.get("method").is_some() {
        validate_request(value)
    } else {
        validate_response(value)
    }
}

/// Violations for a document or batch, each prefixed with its position
/// when the input is an array.
pub fn collect_violations(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) if items.is_empty() => vec!["batch must not be empty".to_string()],
        Value::Array(items) => items
            .iter()
            .enumerate()
            .flat_map(|(i, item)| {
                violations_for(item)
                    .into_iter()
                    .map(move |v| format!("[{}] {}", i, v))
            })
            .collect(),
        other => violations_for(other),
    }
}

/// Validate the message given inline or as `@path`.
pub fn validate_message(arg: &str) -> Result<bool> {
    let text = read_inline_or_file(arg)?;
    let value: Value = match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(e) => {
            println!("{} not valid JSON: {}", "FAIL".red().bold(), e);
            return Ok(false);
        }
    };

    let violations = collect_violations(&value);
    if violations.is_empty() {
        println!("{} well-formed JSON-RPC 2.0", "PASS".green().bold());
        return Ok(true);
    }
    println!("{} {} violation(s):", "FAIL".red().bold(), violations.len());
    for v in &violations {
        println!("  - {}", v);
    }
    Ok(false)
}
