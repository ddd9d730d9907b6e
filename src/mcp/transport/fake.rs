//! In-process fake transport for unit and integration tests
//!
//! [`FakeTransport`] implements the full [`Transport`] contract without any
//! network or process I/O. Tests script what the "server" answers and then
//! inspect what was sent.
//!
//! Replies are chosen in this order for each request:
//!
//! 1. A per-method rule registered with [`FakeTransport::route`].
//! 2. The next queued reply from [`FakeTransport::push_reply`] (or the
//!    `push_*` shorthands).
//! 3. An empty success result `{}`.
//!
//! Notifications are recorded but never consume a reply.
//!
//! # Example
//!
//! ```
//! use mcp_probe::mcp::codec::ProtocolCodec;
//! use mcp_probe::mcp::transport::fake::FakeTransport;
//! use mcp_probe::mcp::transport::Transport;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let transport = FakeTransport::new();
//! transport.connect("fake://server").await?;
//! transport.push_result(json!({"tools": []}));
//!
//! let codec = ProtocolCodec::new();
//! let mut request = codec.build_request("tools/list", None, None);
//! let reply = transport.send(&mut request).await?.unwrap();
//!
//! assert_eq!(reply.response().unwrap().result(), Some(&json!({"tools": []})));
//! assert_eq!(transport.sent_methods(), vec!["tools/list"]);
//! # Ok::<(), anyhow::Error>(())
//! # }).unwrap();
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use serde_json::{json, Value};

use crate::error::{ProbeError, Result};
use crate::mcp::codec;
use crate::mcp::transport::{ConnectionState, Outbound, Transport, TransportCore, TransportKind};
use crate::mcp::types::{RequestId, JSONRPC_VERSION};

/// A scripted server answer.
#[derive(Debug, Clone, PartialEq)]
pub enum FakeReply {
    /// Success response carrying this result
    Result(Value),
    /// Error response with this code and message
    Error {
        /// JSON-RPC error code
        code: i64,
        /// Error message
        message: String,
    },
    /// Exact reply text, sent back verbatim
    Raw(String),
    /// Transport failure
    Fail(String),
    /// No reply within the deadline
    Timeout,
}

#[derive(Debug, Default)]
struct Script {
    queue: VecDeque<FakeReply>,
    routes: HashMap<String, FakeReply>,
    sent: Vec<Value>,
    connect_failure: Option<String>,
}

/// In-process fake transport.
///
/// Reports [`TransportKind::Http`] as its kind since, like that strategy, it
/// answers each request inline.
#[derive(Debug)]
pub struct FakeTransport {
    core: TransportCore,
    script: Mutex<Script>,
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeTransport {
    /// A disconnected fake with an empty script.
    pub fn new() -> Self {
        Self {
            core: TransportCore::new(TransportKind::Http),
            script: Mutex::new(Script::default()),
        }
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Queue a reply for the next request that no route matches.
    pub fn push_reply(&self, reply: FakeReply) {
        self.script().queue.push_back(reply);
    }

    /// Queue a success result.
    pub fn push_result(&self, result: Value) {
        self.push_reply(FakeReply::Result(result));
    }

    /// Queue a JSON-RPC error response.
    pub fn push_error(&self, code: i64, message: impl Into<String>) {
        self.push_reply(FakeReply::Error {
            code,
            message: message.into(),
        });
    }

    /// Queue verbatim reply text.
    pub fn push_raw(&self, raw: impl Into<String>) {
        self.push_reply(FakeReply::Raw(raw.into()));
    }

    /// Queue a transport failure.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.push_reply(FakeReply::Fail(message.into()));
    }

    /// Answer every request for `method` with `reply`.
    pub fn route(&self, method: impl Into<String>, reply: FakeReply) {
        self.script().routes.insert(method.into(), reply);
    }

    /// Make the next `connect` fail with `message`.
    pub fn fail_next_connect(&self, message: impl Into<String>) {
        self.script().connect_failure = Some(message.into());
    }

    /// Simulate a server-pushed message.
    pub fn push_server_message(&self, message: Value) {
        let record = codec::parse_message(message.to_string());
        self.core.notify(record.into_message());
    }

    /// Every message sent so far, as JSON documents.
    pub fn sent(&self) -> Vec<Value> {
        self.script().sent.clone()
    }

    /// Method names of every message sent so far.
    pub fn sent_methods(&self) -> Vec<String> {
        self.script()
            .sent
            .iter()
            .filter_map(|v| v.get("method").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    fn render(reply: FakeReply, id: &RequestId, method: &str) -> Result<String> {
        let id = id.to_value();
        match reply {
            FakeReply::Result(result) => {
                Ok(json!({"jsonrpc": JSONRPC_VERSION, "result": result, "id": id}).to_string())
            }
            FakeReply::Error { code, message } => Ok(json!({
                "jsonrpc": JSONRPC_VERSION,
                "error": {"code": code, "message": message},
                "id": id
            })
            .to_string()),
            FakeReply::Raw(raw) => Ok(raw),
            FakeReply::Fail(message) => Err(ProbeError::Transport(message).into()),
            FakeReply::Timeout => Err(ProbeError::Timeout {
                method: method.to_string(),
                timeout_ms: 0,
            }
            .into()),
        }
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    fn core(&self) -> &TransportCore {
        &self.core
    }

    async fn connect(&self, endpoint: &str) -> Result<()> {
        self.core.begin_connect(endpoint);
        let failure = self.script().connect_failure.take();
        if let Some(message) = failure {
            return Err(self.core.connect_failed(ProbeError::Transport(message)));
        }
        self.core.transition(ConnectionState::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.core.transition(ConnectionState::Disconnected);
        Ok(())
    }

    async fn dispatch(&self, outbound: Outbound) -> Result<Option<String>> {
        let reply = {
            let mut script = self.script();
            let value = serde_json::from_str(&outbound.payload).unwrap_or(Value::Null);
            script.sent.push(value);
            if outbound.reply_to.is_none() {
                return Ok(None);
            }
            script
                .routes
                .get(&outbound.method)
                .cloned()
                .or_else(|| script.queue.pop_front())
                .unwrap_or_else(|| FakeReply::Result(json!({})))
        };
        let id = outbound.reply_to.unwrap_or(RequestId::Null);
        Self::render(reply, &id, &outbound.method).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::codec::ProtocolCodec;
    use crate::mcp::transport::TransportEvent;
    use std::sync::Arc;

    async fn connected() -> FakeTransport {
        let t = FakeTransport::new();
        t.connect("fake://").await.unwrap();
        t
    }

    #[tokio::test]
    async fn test_default_reply_is_empty_result_with_matching_id() {
        let t = connected().await;
        let codec = ProtocolCodec::new();
        let mut ping = codec.build_request("ping", None, Some(RequestId::Number(42)));

        let reply = t.send(&mut ping).await.unwrap().unwrap();
        let response = reply.response().unwrap();
        assert_eq!(response.id, RequestId::Number(42));
        assert_eq!(response.result(), Some(&json!({})));
    }

    #[tokio::test]
    async fn test_notification_records_but_does_not_consume_queue() {
        let t = connected().await;
        t.push_result(json!({"kept": true}));
        let codec = ProtocolCodec::new();

        let mut note = codec.build_notification("notifications/initialized", None);
        assert!(t.send(&mut note).await.unwrap().is_none());

        let mut req = codec.build_request("tools/list", None, None);
        let reply = t.send(&mut req).await.unwrap().unwrap();
        assert_eq!(reply.response().unwrap().result(), Some(&json!({"kept": true})));
        assert_eq!(t.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_route_takes_precedence_over_queue() {
        let t = connected().await;
        t.push_result(json!(1));
        t.route("tools/call", FakeReply::Error {
            code: -32602,
            message: "bad args".into(),
        });
        let codec = ProtocolCodec::new();

        let mut call = codec.build_request("tools/call", None, None);
        let reply = t.send(&mut call).await.unwrap().unwrap();
        assert_eq!(reply.response().unwrap().error().unwrap().code, -32602);

        let mut other = codec.build_request("ping", None, None);
        let reply = t.send(&mut other).await.unwrap().unwrap();
        assert_eq!(reply.response().unwrap().result(), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_raw_reply_is_decoded_leniently() {
        let t = connected().await;
        t.push_raw("{definitely not json");
        let codec = ProtocolCodec::new();
        let mut req = codec.build_request("ping", None, None);
        let reply = t.send(&mut req).await.unwrap().unwrap();
        assert_eq!(reply.response().unwrap().error().unwrap().code, -32700);
    }

    #[tokio::test]
    async fn test_connect_failure_enters_error_state() {
        let t = FakeTransport::new();
        t.fail_next_connect("refused");
        assert!(t.connect("fake://").await.is_err());
        assert_eq!(t.connection_info().state, ConnectionState::Error);
        assert_eq!(t.connection_info().metrics.error_count, 1);

        t.connect("fake://").await.unwrap();
        assert!(t.is_connected());
    }

    #[tokio::test]
    async fn test_failure_emits_error_event_and_propagates() {
        let t = connected().await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = t.on(Box::new(move |e| sink.lock().unwrap().push(e.clone())));
        t.push_failure("socket reset");

        let codec = ProtocolCodec::new();
        let mut req = codec.build_request("ping", None, None);
        let err = t.send(&mut req).await.unwrap_err();
        assert!(err.to_string().contains("socket reset"));

        sub.unsubscribe();
        let events = seen.lock().unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, TransportEvent::Error { message } if message.contains("socket reset"))));
    }

    #[tokio::test]
    async fn test_metrics_accumulate() {
        let t = connected().await;
        let codec = ProtocolCodec::new();
        for _ in 0..3 {
            let mut req = codec.build_request("ping", None, None);
            t.send(&mut req).await.unwrap();
        }
        let info = t.connection_info();
        assert_eq!(info.metrics.request_count, 3);
        assert!(info.metrics.bytes_sent > 0);
        assert!(info.metrics.bytes_received > 0);
        assert!(info.metrics.last_latency_ms.is_some());
        assert_eq!(info.endpoint.as_deref(), Some("fake://"));
    }

    #[tokio::test]
    async fn test_disconnect_blocks_further_sends() {
        let t = connected().await;
        t.disconnect().await.unwrap();
        let codec = ProtocolCodec::new();
        let mut req = codec.build_request("ping", None, None);
        assert!(t.send(&mut req).await.is_err());
    }
}
