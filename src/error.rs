//! Error types for mcp-probe
//!
//! This module defines all error types used throughout the crate,
//! using `thiserror` for ergonomic error handling.
//!
//! Only genuine failures travel through these types. Structural validation
//! problems are reported as lists of strings, undecodable wire bytes become
//! synthesized `-32700` responses, and assertion mismatches become failed
//! results. Transport failures are the one family that always surfaces as
//! an `Err`.

use thiserror::Error;

/// Main error type for mcp-probe operations
#[derive(Error, Debug)]
pub enum ProbeError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connectivity or I/O failure inside a transport strategy
    #[error("Transport error: {0}")]
    Transport(String),

    /// A send was attempted on a transport that is not connected
    #[error("Transport is not connected: {0}")]
    NotConnected(String),

    /// No response arrived for a request within its deadline
    #[error("Request timed out: method={method}, after {timeout_ms}ms")]
    Timeout {
        /// The JSON-RPC method that was awaiting a response
        method: String,
        /// The deadline that elapsed
        timeout_ms: u64,
    },

    /// Length-prefixed frame could not be encoded or decoded
    #[error("Frame error: {0}")]
    Frame(String),

    /// An assertion expression line could not be compiled
    #[error("Expression error: {0}")]
    Expression(String),

    /// A sequence definition could not be loaded
    #[error("Sequence error: {0}")]
    Sequence(String),

    /// Health monitor misconfiguration (bad endpoint, zero period)
    #[error("Health monitor error: {0}")]
    Health(String),

    /// History export/import failures
    #[error("History error: {0}")]
    History(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ProbeError {
    /// Whether this error means no answer was obtained from the peer at all.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            ProbeError::Transport(_)
                | ProbeError::NotConnected(_)
                | ProbeError::Timeout { .. }
                | ProbeError::Http(_)
                | ProbeError::Io(_)
        )
    }
}

/// Result type alias for mcp-probe operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
