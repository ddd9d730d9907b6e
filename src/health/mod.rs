//! Periodic health monitoring of an MCP server's status endpoint
//!
//! A [`HealthMonitor`] polls a status URL on a fixed period, classifies each
//! check into a [`HealthState`], keeps smoothed latency and jitter
//! ([`LatencyStats`]), and caches the advertised capabilities for a limited
//! time ([`ExpiringCache`]). Every check replaces the [`HealthSnapshot`]
//! wholesale and is broadcast to subscribers.

pub mod cache;
pub mod monitor;
pub mod stats;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use cache::ExpiringCache;
pub use monitor::{
    request_timeout, HealthMonitor, HealthMonitorConfig, HttpStatusProbe, ProbeOutcome, StatusProbe,
};
pub use stats::LatencyStats;

/// Classification of the latest check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Success status and a well-formed payload
    Healthy,
    /// Reachable, but a non-success status or an unreadable payload
    Degraded,
    /// Transport failure or timeout
    Unhealthy,
    /// No check has completed
    Unknown,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Unhealthy => "unhealthy",
            HealthState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Body served by the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthPayload {
    /// Server-reported status, e.g. `ok`
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_clients: Option<u64>,
    /// Advertised capability set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Value>,
}

/// Result of the most recent check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub state: HealthState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<HealthPayload>,
    /// When the check finished
    pub checked_at: Option<DateTime<Utc>>,
    /// Latency of this check
    pub latency_ms: Option<f64>,
    /// Moving average over all checks
    pub smoothed_latency_ms: f64,
    /// Sample standard deviation over all checks
    pub jitter_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self {
            state: HealthState::Unknown,
            payload: None,
            checked_at: None,
            latency_ms: None,
            smoothed_latency_ms: 0.0,
            jitter_ms: 0.0,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_snapshot_is_unknown() {
        let s = HealthSnapshot::default();
        assert_eq!(s.state, HealthState::Unknown);
        assert!(s.checked_at.is_none());
    }

    #[test]
    fn test_payload_decodes_server_body() {
        let body = json!({
            "status": "ok",
            "protocol_version": "2024-11-05",
            "server_name": "demo-mcp",
            "server_version": "0.1.0",
            "connected_clients": 2,
            "capabilities": {"tools": true}
        });
        let p: HealthPayload = serde_json::from_value(body).unwrap();
        assert_eq!(p.server_name.as_deref(), Some("demo-mcp"));
        assert_eq!(p.connected_clients, Some(2));

        let minimal: HealthPayload = serde_json::from_value(json!({"status": "ok"})).unwrap();
        assert!(minimal.capabilities.is_none());
        assert!(serde_json::from_value::<HealthPayload>(json!({"up": true})).is_err());
    }

    #[test]
    fn test_state_serializes_lowercase() {
        assert_eq!(serde_json::to_value(HealthState::Degraded).unwrap(), json!("degraded"));
        assert_eq!(HealthState::Unhealthy.to_string(), "unhealthy");
    }
}
