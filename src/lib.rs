//! mcp-probe - protocol testing engine for MCP servers
//!
//! This library provides the pieces the `mcp-probe` CLI is built from:
//! a JSON-RPC 2.0 codec, interchangeable transports, a path extractor,
//! an assertion engine with a small expression language, a multi-step
//! sequence runner, a health monitor and an exchange history.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `mcp`: JSON-RPC types, the codec, and the http, websocket, sse and
//!   stdio transports behind one `Transport` trait
//! - `path`: `$.a.b[0].*` style extraction over JSON values
//! - `assertions`: operators, evaluation, and expression parsing
//! - `sequence`: ordered steps with variable extraction and substitution
//! - `health`: periodic status checks with latency statistics
//! - `history`: bounded record of exchanges with filtering and export
//! - `events`: per-instance subscription registry
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use mcp_probe::{create_transport, Sequence, SequenceRunner, TransportKind, TransportOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let transport = create_transport(TransportKind::Http, TransportOptions::default())?;
//!     transport.connect("http://127.0.0.1:47101/mcp").await?;
//!
//!     let sequence = Sequence::from_file("sequences/smoke.yaml")?;
//!     let run = SequenceRunner::new(transport).run(&sequence).await;
//!     println!("completed: {}", run.completed);
//!     Ok(())
//! }
//! ```

pub mod assertions;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod history;
pub mod mcp;
pub mod path;
pub mod sequence;

// Re-export commonly used types
pub use assertions::{evaluate, parse_expression, run_suite, Assertion, AssertionResult, Operator};
pub use config::Config;
pub use error::{ProbeError, Result};
pub use health::{HealthMonitor, HealthSnapshot, HealthState};
pub use history::{ExchangeRecord, MemoryHistory};
pub use mcp::transport::{create_transport, Transport, TransportKind, TransportOptions};
pub use mcp::ProtocolCodec;
pub use path::extract;
pub use sequence::{Sequence, SequenceRun, SequenceRunner, Step};
