//! Configuration management for mcp-probe
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//!
//! Precedence, lowest first: built-in defaults, the YAML file, `MCP_PROBE_*`
//! environment variables, then `--transport` / `--endpoint`.

use crate::error::{ProbeError, Result};
use crate::health::HealthMonitorConfig;
use crate::mcp::transport::{TransportKind, TransportOptions};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Host and port the reference MCP server listens on.
pub const DEFAULT_SERVER: &str = "127.0.0.1:47101";

/// Main configuration structure for mcp-probe
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Which transport to use and how to reach the server
    #[serde(default)]
    pub transport: TransportConfig,
    /// Status endpoint polling
    #[serde(default)]
    pub health: HealthConfig,
    /// In-memory exchange history
    #[serde(default)]
    pub history: HistoryConfig,
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Transport kind (http, websocket, sse, stdio)
    #[serde(default = "default_kind")]
    pub kind: TransportKind,

    /// Server URL, or command line for stdio. Defaults per kind when unset.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Fixed POST URL for the sse transport
    #[serde(default)]
    pub post_endpoint: Option<String>,

    /// Per-exchange timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Extra HTTP headers
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_kind() -> TransportKind {
    TransportKind::Http
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            endpoint: None,
            post_endpoint: None,
            timeout_ms: default_timeout_ms(),
            headers: HashMap::new(),
        }
    }
}

impl TransportConfig {
    /// Route the reference server publishes for `kind`; none for stdio.
    pub fn default_endpoint(kind: TransportKind) -> Option<String> {
        match kind {
            TransportKind::Http => Some(format!("http://{}/mcp", DEFAULT_SERVER)),
            TransportKind::WebSocket => Some(format!("ws://{}/mcp/ws", DEFAULT_SERVER)),
            TransportKind::Sse => Some(format!("http://{}/mcp/sse", DEFAULT_SERVER)),
            TransportKind::Stdio => None,
        }
    }

    /// Configured endpoint, falling back to the default for the kind.
    pub fn resolved_endpoint(&self) -> Option<String> {
        self.endpoint
            .clone()
            .filter(|e| !e.trim().is_empty())
            .or_else(|| Self::default_endpoint(self.kind))
    }

    /// Options handed to the transport factory.
    pub fn options(&self) -> TransportOptions {
        TransportOptions {
            timeout: Duration::from_millis(self.timeout_ms),
            headers: self.headers.clone(),
            post_endpoint: self.post_endpoint.clone(),
        }
    }
}

/// Health monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Status URL
    #[serde(default = "default_health_endpoint")]
    pub endpoint: String,

    /// Polling period in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// How long discovered capabilities stay cached, in seconds
    #[serde(default = "default_capability_ttl_secs")]
    pub capability_ttl_secs: u64,
}

fn default_health_endpoint() -> String {
    format!("http://{}/mcp/health", DEFAULT_SERVER)
}

fn default_interval_ms() -> u64 {
    5_000
}

fn default_capability_ttl_secs() -> u64 {
    300
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            endpoint: default_health_endpoint(),
            interval_ms: default_interval_ms(),
            capability_ttl_secs: default_capability_ttl_secs(),
        }
    }
}

impl HealthConfig {
    /// Settings for [`crate::health::HealthMonitor::new`].
    pub fn monitor_config(&self) -> HealthMonitorConfig {
        HealthMonitorConfig {
            endpoint: self.endpoint.clone(),
            period: Duration::from_millis(self.interval_ms),
            capability_ttl: Duration::from_secs(self.capability_ttl_secs),
        }
    }
}

/// History configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum records kept in memory
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    1_000
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed, or an override
    /// names an unknown transport kind
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli)?;

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ProbeError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ProbeError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(kind) = std::env::var("MCP_PROBE_TRANSPORT") {
            match kind.parse() {
                Ok(value) => self.transport.kind = value,
                Err(_) => tracing::warn!("Invalid MCP_PROBE_TRANSPORT: {}", kind),
            }
        }

        if let Ok(endpoint) = std::env::var("MCP_PROBE_ENDPOINT") {
            self.transport.endpoint = Some(endpoint);
        }

        if let Ok(timeout) = std::env::var("MCP_PROBE_TIMEOUT_MS") {
            if let Ok(value) = timeout.parse() {
                self.transport.timeout_ms = value;
            } else {
                tracing::warn!("Invalid MCP_PROBE_TIMEOUT_MS: {}", timeout);
            }
        }

        if let Ok(endpoint) = std::env::var("MCP_PROBE_HEALTH_ENDPOINT") {
            self.health.endpoint = endpoint;
        }

        if let Ok(interval) = std::env::var("MCP_PROBE_HEALTH_INTERVAL_MS") {
            if let Ok(value) = interval.parse() {
                self.health.interval_ms = value;
            } else {
                tracing::warn!("Invalid MCP_PROBE_HEALTH_INTERVAL_MS: {}", interval);
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) -> Result<()> {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
        if let Some(kind) = &cli.transport {
            self.transport.kind = kind.parse()?;
        }
        if let Some(endpoint) = &cli.endpoint {
            self.transport.endpoint = Some(endpoint.clone());
        }
        Ok(())
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are within acceptable ranges
    /// and that required fields are properly set.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        let endpoint = self.transport.resolved_endpoint().ok_or_else(|| {
            ProbeError::Config(format!(
                "transport.endpoint is required for the {} transport",
                self.transport.kind
            ))
        })?;

        match self.transport.kind {
            TransportKind::Stdio => {}
            TransportKind::WebSocket => {
                let url = url::Url::parse(&endpoint).map_err(|e| {
                    ProbeError::Config(format!("Invalid transport.endpoint {}: {}", endpoint, e))
                })?;
                if !matches!(url.scheme(), "ws" | "wss") {
                    return Err(ProbeError::Config(format!(
                        "websocket endpoint must use ws:// or wss://, got {}",
                        endpoint
                    ))
                    .into());
                }
            }
            TransportKind::Http | TransportKind::Sse => {
                let url = url::Url::parse(&endpoint).map_err(|e| {
                    ProbeError::Config(format!("Invalid transport.endpoint {}: {}", endpoint, e))
                })?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(ProbeError::Config(format!(
                        "{} endpoint must use http:// or https://, got {}",
                        self.transport.kind, endpoint
                    ))
                    .into());
                }
            }
        }

        if let Some(post) = self.transport.post_endpoint.as_ref().filter(|p| !p.starts_with('/')) {
            url::Url::parse(post).map_err(|e| {
                ProbeError::Config(format!("Invalid transport.post_endpoint {}: {}", post, e))
            })?;
        }

        if self.transport.timeout_ms == 0 {
            return Err(
                ProbeError::Config("transport.timeout_ms must be greater than 0".to_string()).into(),
            );
        }

        if self.health.endpoint.trim().is_empty() {
            return Err(ProbeError::Config("health.endpoint cannot be empty".to_string()).into());
        }
        url::Url::parse(&self.health.endpoint).map_err(|e| {
            ProbeError::Config(format!(
                "Invalid health.endpoint {}: {}",
                self.health.endpoint, e
            ))
        })?;

        if self.health.interval_ms == 0 {
            return Err(
                ProbeError::Config("health.interval_ms must be greater than 0".to_string()).into(),
            );
        }

        if self.history.capacity == 0 {
            return Err(
                ProbeError::Config("history.capacity must be greater than 0".to_string()).into(),
            );
        }

        Ok(())
    }
}
