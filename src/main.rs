//! mcp-probe - protocol tester for MCP servers
//!
#![doc = "mcp-probe - protocol tester for MCP servers"]
#![doc = "Main entry point for the mcp-probe command-line tool."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mcp_probe::cli::{Cli, Commands};
use mcp_probe::commands;
use mcp_probe::commands::send::SendArgs;
use mcp_probe::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    init_tracing(cli.verbose, cli.json_logs);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/mcp-probe.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    let passed = match cli.command {
        Commands::Send {
            method,
            params,
            id,
            notify,
            expect,
        } => {
            tracing::debug!(method = %method, notify, "send");
            let args = SendArgs {
                method,
                params,
                id,
                notify,
                expect,
            };
            commands::send::run_send(&config, args).await?
        }
        Commands::Run {
            sequence,
            history_out,
        } => {
            tracing::info!("Running sequence from {}", sequence.display());
            commands::run::run_sequence(&config, &sequence, history_out.as_deref()).await?
        }
        Commands::Check { response, expect } => {
            commands::check::check_response(&response, &expect)?
        }
        Commands::Validate { message } => commands::validate::validate_message(&message)?,
        Commands::Monitor { interval_ms, count } => {
            tracing::info!("Starting health monitor");
            commands::monitor::run_monitor(&config, interval_ms, count).await?
        }
    };

    if !passed {
        std::process::exit(1);
    }
    Ok(())
}

/// Initialize tracing subscriber
///
/// `RUST_LOG` takes precedence over `verbose`.
fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "mcp_probe=debug" } else { "mcp_probe=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
