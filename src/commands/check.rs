//! `check`: evaluate assertion expressions against a saved response

use std::path::Path;

use crate::assertions::{parse_expressions, run_suite};
use crate::commands::print_assertion_results;
use crate::error::Result;
use crate::mcp::codec;

/// Check `expect` against the response stored at `path`.
///
/// The file goes through the response decoder, so unreadable JSON is
/// checked as a `-32700` parse-error response rather than rejected.
pub fn check_response(path: &Path, expect: &[String]) -> Result<bool> {
    let suite = parse_expressions(&expect.join("\n"))?;
    let bytes = std::fs::read(path)?;
    let record = codec::parse_response(bytes);
    if !record.is_valid() {
        for violation in record.validation_errors() {
            tracing::warn!(violation = %violation, "response is not well-formed");
        }
    }
    let results = run_suite(&suite, &record.to_value(), None);
    Ok(print_assertion_results(&results))
}
