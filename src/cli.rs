//! Command-line interface definition for mcp-probe
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for single exchanges, sequences, offline assertion
//! checks, message validation and health monitoring.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// mcp-probe - protocol tester for MCP servers
///
/// Send JSON-RPC messages over HTTP, WebSocket, SSE or stdio, run
/// multi-step sequences, and check responses with assertion expressions.
#[derive(Parser, Debug, Clone)]
#[command(name = "mcp-probe")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/mcp-probe.yaml")]
    pub config: Option<String>,

    /// Transport kind override (http, websocket, sse, stdio)
    #[arg(short, long, global = true)]
    pub transport: Option<String>,

    /// Endpoint override (URL, or a command line for stdio)
    #[arg(short, long, global = true)]
    pub endpoint: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for mcp-probe
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Send one request or notification and print the response
    Send {
        /// JSON-RPC method
        #[arg(short, long)]
        method: String,

        /// Parameters as a JSON object or array
        #[arg(short, long)]
        params: Option<String>,

        /// Explicit request id (number or string)
        #[arg(long)]
        id: Option<String>,

        /// Send as a notification (no id, no response)
        #[arg(long)]
        notify: bool,

        /// Assertion expression to check against the response (repeatable)
        #[arg(long = "expect")]
        expect: Vec<String>,
    },

    /// Run a sequence file (YAML or JSON)
    Run {
        /// Path to the sequence file
        #[arg(short, long)]
        sequence: PathBuf,

        /// Write the exchange history to this file when done
        #[arg(long)]
        history_out: Option<PathBuf>,
    },

    /// Check assertion expressions against a saved response
    Check {
        /// Path to a file holding a JSON-RPC response
        #[arg(short, long)]
        response: PathBuf,

        /// Assertion expression (repeatable)
        #[arg(long = "expect", required = true)]
        expect: Vec<String>,
    },

    /// Structurally validate a JSON-RPC message
    Validate {
        /// Message JSON, or `@path` to read it from a file
        #[arg(short, long)]
        message: String,
    },

    /// Poll the server's status endpoint
    Monitor {
        /// Override the polling period
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Stop after this many checks (runs until Ctrl-C when omitted)
        #[arg(long)]
        count: Option<u64>,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/mcp-probe.yaml".to_string()),
            transport: None,
            endpoint: None,
            verbose: false,
            json_logs: false,
            command: Commands::Send {
                method: "ping".to_string(),
                params: None,
                id: None,
                notify: false,
                expect: Vec::new(),
            },
        }
    }
}
