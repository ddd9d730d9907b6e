//! `run`: execute a sequence file and check each step's expectations

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use colored::Colorize;
use prettytable::{cell, row, Table};

use crate::assertions::{parse_expressions, run_suite, Assertion, ExchangeMeta};
use crate::commands::{close_transport, connect_transport, print_assertion_results, status_tag};
use crate::config::Config;
use crate::error::{ProbeError, Result};
use crate::history::MemoryHistory;
use crate::sequence::{Sequence, SequenceRun, SequenceRunner};

/// Compile every step's `expect` lines, keyed by step id.
pub fn compile_expectations(sequence: &Sequence) -> Result<HashMap<String, Vec<Assertion>>> {
    sequence
        .steps
        .iter()
        .filter(|s| !s.expect.is_empty())
        .map(|step| {
            parse_expressions(&step.expect.join("\n"))
                .map(|suite| (step.id.clone(), suite))
                .map_err(|e| {
                    anyhow::Error::from(ProbeError::Sequence(format!("step `{}`: {}", step.id, e)))
                })
        })
        .collect()
}

fn print_run(run: &SequenceRun) {
    let mut table = Table::new();
    table.add_row(row!["Step", "Method", "Status", "Elapsed", "Detail"]);
    for result in &run.results {
        table.add_row(row![
            result.step_id,
            result.method,
            status_tag(result.succeeded()),
            format!("{:.1} ms", result.elapsed_ms),
            result.error.as_deref().unwrap_or("")
        ]);
    }
    println!("\nSequence: {}\n", run.sequence.bold());
    table.printstd();

    if run.completed {
        println!("{}", format!("Completed {} steps", run.results.len()).green());
    } else {
        println!(
            "{}",
            format!(
                "Stopped at step `{}` after {} of the steps",
                run.failed_step.as_deref().unwrap_or("?"),
                run.results.len()
            )
            .red()
        );
    }
}

/// Run the sequence at `path`.
pub async fn run_sequence(
    config: &Config,
    path: &Path,
    history_out: Option<&Path>,
) -> Result<bool> {
    let sequence = Sequence::from_file(path)?;
    let expectations = compile_expectations(&sequence)?;

    let history = Arc::new(MemoryHistory::new(config.history.capacity));
    let transport = connect_transport(config).await?;
    let runner = SequenceRunner::new(Arc::clone(&transport)).with_history(history.clone());
    let run = runner.run(&sequence).await;
    close_transport(&transport).await;

    print_run(&run);

    let mut all_passed = run.completed;
    for result in &run.results {
        let (Some(suite), Some(response)) = (expectations.get(&result.step_id), &result.response)
        else {
            continue;
        };
        let meta = ExchangeMeta {
            duration_ms: result.elapsed_ms,
            transport: Some(transport.kind().to_string()),
        };
        println!("\nExpectations for step {}:", result.step_id.bold());
        let results = run_suite(suite, response, Some(&meta));
        all_passed &= print_assertion_results(&results);
    }

    if let Some(out) = history_out {
        history.export_to(out)?;
        println!("History written to {}", out.display());
    }

    Ok(all_passed)
}
