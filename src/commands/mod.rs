//! Command handlers for mcp-probe
//!
//! Each handler returns `Ok(true)` when everything it checked passed and
//! `Ok(false)` when a sequence step or an assertion failed; `main` maps the
//! latter to a non-zero exit status. `Err` is reserved for problems that
//! stopped the command from running at all (bad config, unreadable files,
//! connection failures).

pub mod check;
pub mod monitor;
pub mod run;
pub mod send;
pub mod validate;

use std::sync::Arc;

use colored::Colorize;
use prettytable::{row, Table};

use crate::assertions::{summarize, AssertionResult};
use crate::config::Config;
use crate::error::{ProbeError, Result};
use crate::mcp::transport::{create_transport, Transport};

/// Build the configured transport and connect it.
pub(crate) async fn connect_transport(config: &Config) -> Result<Arc<dyn Transport>> {
    let endpoint = config.transport.resolved_endpoint().ok_or_else(|| {
        ProbeError::Config(format!(
            "no endpoint configured for the {} transport",
            config.transport.kind
        ))
    })?;
    let transport = create_transport(config.transport.kind, config.transport.options())?;
    tracing::info!(transport = %config.transport.kind, endpoint = %endpoint, "connecting");
    transport.connect(&endpoint).await?;
    Ok(transport)
}

/// Disconnect, logging instead of failing.
pub(crate) async fn close_transport(transport: &Arc<dyn Transport>) {
    if let Err(e) = transport.disconnect().await {
        tracing::warn!(error = %e, "disconnect failed");
    }
}

/// Text of `arg`, or of the file it names when written as `@path`.
pub(crate) fn read_inline_or_file(arg: &str) -> Result<String> {
    match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| ProbeError::Config(format!("cannot read {}: {}", path, e)).into()),
        None => Ok(arg.to_string()),
    }
}

pub(crate) fn status_tag(passed: bool) -> String {
    if passed {
        "PASS".green().bold().to_string()
    } else {
        "FAIL".red().bold().to_string()
    }
}

/// Print a results table and a one-line summary. Returns whether all passed.
pub(crate) fn print_assertion_results(results: &[AssertionResult]) -> bool {
    let mut table = Table::new();
    table.add_row(row!["Status", "Assertion", "Detail"]);
    for result in results {
        table.add_row(row![status_tag(result.passed), result.label, result.message]);
    }
    table.printstd();

    let summary = summarize(results);
    let line = format!(
        "{} passed, {} failed, {} total",
        summary.passed, summary.failed, summary.total
    );
    if summary.all_passed() {
        println!("{}", line.green());
    } else {
        println!("{}", line.red());
    }
    summary.all_passed()
}
