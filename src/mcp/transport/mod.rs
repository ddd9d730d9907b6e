//! MCP transport abstraction and implementations
//!
//! This module defines the [`Transport`] trait that every transport strategy
//! satisfies, plus the shared bookkeeping they all use. Concrete strategies
//! live in submodules:
//!
//! - [`http::HttpTransport`] -- one HTTP POST per exchange.
//! - [`websocket::WebSocketTransport`] -- text frames over one socket.
//! - [`sse::SseTransport`] -- server-sent events inbound, HTTP POST outbound.
//! - [`stdio::StdioTransport`] -- a spawned child process speaking
//!   length-prefixed frames (see [`framing`]) over stdin/stdout.
//! - [`fake::FakeTransport`] -- in-process scripted fake for tests.
//!
//! # Design
//!
//! A strategy only implements `connect`, `disconnect`, and `dispatch` (move
//! one payload across the wire and return the reply text, if any). The
//! provided [`Transport::send`] wraps `dispatch` with the common contract:
//! refuse when not connected, serialize the record, time the exchange,
//! update [`ConnectionInfo`] metrics, and on failure bump the error count,
//! emit [`TransportEvent::Error`], and propagate the error.
//!
//! Strategies that share one channel between many requests (socket,
//! event-stream, byte-stream) correlate replies by id through
//! [`PendingResponses`]. Inbound messages that do not resolve an in-flight
//! request are emitted as [`TransportEvent::Notification`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use metrics::{histogram, increment_counter};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::{ProbeError, Result};
use crate::events::{Listeners, Subscription};
use crate::mcp::codec::{self, MessageRecord};
use crate::mcp::types::{Message, RequestId};

pub mod fake;
pub mod framing;
pub mod http;
pub mod sse;
pub mod stdio;
pub mod websocket;

/// Upper bound on concurrent exchanges inside [`Transport::send_batch`].
pub const MAX_BATCH_CONCURRENCY: usize = 8;

/// Default per-exchange timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Kinds, states, events
// ---------------------------------------------------------------------------

/// The closed set of transport strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Request-response over HTTP POST
    Http,
    /// Full-duplex socket
    #[serde(rename = "websocket")]
    WebSocket,
    /// Server-sent event stream plus HTTP POST
    Sse,
    /// Child process with length-prefixed framing
    Stdio,
}

impl TransportKind {
    /// Every kind, in declaration order.
    pub const ALL: [TransportKind; 4] = [
        TransportKind::Http,
        TransportKind::WebSocket,
        TransportKind::Sse,
        TransportKind::Stdio,
    ];

    /// Lowercase identifier used in config files and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Http => "http",
            TransportKind::WebSocket => "websocket",
            TransportKind::Sse => "sse",
            TransportKind::Stdio => "stdio",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = ProbeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(TransportKind::Http),
            "websocket" | "ws" => Ok(TransportKind::WebSocket),
            "sse" => Ok(TransportKind::Sse),
            "stdio" => Ok(TransportKind::Stdio),
            other => Err(ProbeError::Config(format!(
                "unknown transport kind `{}` (expected http, websocket, sse, or stdio)",
                other
            ))),
        }
    }
}

/// Lifecycle state of a transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Connect in progress
    Connecting,
    /// Ready to send
    Connected,
    /// Last connect attempt or the live connection failed
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Running counters for one transport instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionMetrics {
    /// Wire bytes written
    pub bytes_sent: u64,
    /// Wire bytes read
    pub bytes_received: u64,
    /// Completed exchanges
    pub request_count: u64,
    /// Failed sends and connects
    pub error_count: u64,
    /// Duration of the most recent exchange
    pub last_latency_ms: Option<f64>,
}

/// Read-only snapshot of a transport's connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionInfo {
    /// Strategy that owns this connection
    pub kind: TransportKind,
    /// Endpoint passed to the last `connect`
    pub endpoint: Option<String>,
    /// Current state
    pub state: ConnectionState,
    /// When the connection last reached `connected`
    pub connected_at: Option<DateTime<Utc>>,
    /// When the connection last reached `disconnected`
    pub disconnected_at: Option<DateTime<Utc>>,
    /// Last completed exchange
    pub last_activity: Option<DateTime<Utc>>,
    /// Counters
    pub metrics: ConnectionMetrics,
}

impl ConnectionInfo {
    fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            endpoint: None,
            state: ConnectionState::Disconnected,
            connected_at: None,
            disconnected_at: None,
            last_activity: None,
            metrics: ConnectionMetrics::default(),
        }
    }
}

/// Events delivered to [`Transport::on`] handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The connection state changed
    StateChanged {
        /// Previous state
        from: ConnectionState,
        /// New state
        to: ConnectionState,
    },
    /// A send or connect failed
    Error {
        /// Rendered error
        message: String,
    },
    /// A server-pushed message that did not answer an in-flight request
    Notification {
        /// The decoded message
        message: Message,
    },
}

// ---------------------------------------------------------------------------
// Shared bookkeeping
// ---------------------------------------------------------------------------

/// State every strategy owns: connection info and listeners.
#[derive(Debug)]
pub struct TransportCore {
    kind: TransportKind,
    info: Mutex<ConnectionInfo>,
    listeners: Listeners<TransportEvent>,
}

impl TransportCore {
    /// Fresh bookkeeping in the `disconnected` state.
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            info: Mutex::new(ConnectionInfo::new(kind)),
            listeners: Listeners::new(),
        }
    }

    fn info_mut(&self) -> MutexGuard<'_, ConnectionInfo> {
        self.info.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Strategy kind.
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Copy of the current connection info.
    pub fn snapshot(&self) -> ConnectionInfo {
        self.info_mut().clone()
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.info_mut().state
    }

    /// Register an event handler.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&TransportEvent) + Send + Sync + 'static,
    {
        self.listeners.subscribe(handler)
    }

    /// Move to `to`, stamping timestamps and emitting `StateChanged` when the
    /// state actually changes.
    pub fn transition(&self, to: ConnectionState) {
        let from = {
            let mut info = self.info_mut();
            let from = info.state;
            if from == to {
                return;
            }
            info.state = to;
            match to {
                ConnectionState::Connected => info.connected_at = Some(Utc::now()),
                ConnectionState::Disconnected => info.disconnected_at = Some(Utc::now()),
                _ => {}
            }
            from
        };
        tracing::info!(transport = %self.kind, %from, %to, "connection state changed");
        self.listeners
            .emit(&TransportEvent::StateChanged { from, to });
    }

    /// Record the endpoint and enter `connecting`.
    pub fn begin_connect(&self, endpoint: &str) {
        self.info_mut().endpoint = Some(endpoint.to_string());
        self.transition(ConnectionState::Connecting);
    }

    /// Enter `error`, count and emit the failure, and hand the error back.
    pub fn connect_failed(&self, error: impl Into<anyhow::Error>) -> anyhow::Error {
        self.transition(ConnectionState::Error);
        self.fail(error)
    }

    /// Count and emit a failure, then return it for propagation.
    pub fn fail(&self, error: impl Into<anyhow::Error>) -> anyhow::Error {
        let error = error.into();
        self.info_mut().metrics.error_count += 1;
        increment_counter!("mcp_probe_transport_errors_total", "transport" => self.kind.as_str());
        tracing::warn!(transport = %self.kind, error = %error, "transport failure");
        self.listeners.emit(&TransportEvent::Error {
            message: error.to_string(),
        });
        error
    }

    /// Account for one completed exchange.
    pub fn record_exchange(&self, bytes_sent: usize, bytes_received: usize, latency: Duration) {
        let latency_ms = latency.as_secs_f64() * 1000.0;
        {
            let mut info = self.info_mut();
            info.metrics.bytes_sent += bytes_sent as u64;
            info.metrics.bytes_received += bytes_received as u64;
            info.metrics.request_count += 1;
            info.metrics.last_latency_ms = Some(latency_ms);
            info.last_activity = Some(Utc::now());
        }
        histogram!("mcp_probe_exchange_latency_ms", latency_ms, "transport" => self.kind.as_str());
    }

    /// Account for inbound bytes that did not belong to an exchange.
    pub fn record_inbound(&self, bytes: usize) {
        self.info_mut().metrics.bytes_received += bytes as u64;
    }

    /// Emit a server-pushed message.
    pub fn notify(&self, message: Message) {
        tracing::debug!(transport = %self.kind, method = ?message.method(), "server-pushed message");
        self.listeners
            .emit(&TransportEvent::Notification { message });
    }
}

/// In-flight requests awaiting a reply on a shared channel.
#[derive(Debug, Default)]
pub struct PendingResponses {
    slots: Mutex<HashMap<RequestId, oneshot::Sender<String>>>,
}

impl PendingResponses {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<RequestId, oneshot::Sender<String>>> {
        self.slots.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Reserve a slot for `id`. Register before writing the request so the
    /// reply can never arrive first.
    pub fn register(&self, id: RequestId) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        self.slots().insert(id, tx);
        rx
    }

    /// Drop the slot for `id`.
    pub fn cancel(&self, id: &RequestId) {
        self.slots().remove(id);
    }

    /// Drop every slot; waiting callers see the channel close.
    pub fn clear(&self) {
        self.slots().clear();
    }

    /// Number of requests awaiting a reply.
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    /// True when nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Route one inbound text: resolve the matching slot, or emit it as a
    /// notification on `core`.
    pub fn route(&self, text: String, core: &TransportCore) {
        let record = codec::parse_message(&text);
        if let Some(id) = record.response().map(|r| r.id.clone()) {
            if let Some(tx) = self.slots().remove(&id) {
                // The waiter may have timed out already.
                let _ = tx.send(text);
                return;
            }
            tracing::debug!(transport = %core.kind(), %id, "response with no pending request");
        }
        core.record_inbound(text.len());
        core.notify(record.into_message());
    }

    /// Wait for the reply to `id`, cancelling the slot on timeout.
    pub async fn wait(
        &self,
        id: &RequestId,
        rx: oneshot::Receiver<String>,
        method: &str,
        timeout: Duration,
    ) -> Result<String> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(_)) => Err(ProbeError::Transport(
                "connection closed before a response arrived".to_string(),
            )
            .into()),
            Err(_) => {
                self.cancel(id);
                Err(ProbeError::Timeout {
                    method: method.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                }
                .into())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// One serialized message on its way out.
#[derive(Debug, Clone)]
pub struct Outbound {
    /// Wire text
    pub payload: String,
    /// Method name, for logging and timeout errors
    pub method: String,
    /// Id a reply must carry; `None` for notifications
    pub reply_to: Option<RequestId>,
}

/// Handler type accepted by [`Transport::on`].
pub type EventHandler = Box<dyn Fn(&TransportEvent) + Send + Sync>;

/// Uniform connect/send/disconnect contract over every strategy.
///
/// # Examples
///
/// ```
/// use mcp_probe::mcp::codec::ProtocolCodec;
/// use mcp_probe::mcp::transport::fake::FakeTransport;
/// use mcp_probe::mcp::transport::Transport;
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let transport = FakeTransport::new();
/// transport.connect("fake://server").await?;
///
/// let codec = ProtocolCodec::new();
/// let mut ping = codec.build_request("ping", None, None);
/// let reply = transport.send(&mut ping).await?.expect("requests get replies");
/// assert!(!reply.response().unwrap().is_error());
/// # Ok(())
/// # }
/// ```
#[async_trait::async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Shared bookkeeping.
    fn core(&self) -> &TransportCore;

    /// Establish the connection and enter `connected`.
    async fn connect(&self, endpoint: &str) -> Result<()>;

    /// Tear the connection down and enter `disconnected`. Outstanding
    /// replies already on the wire are not recalled.
    async fn disconnect(&self) -> Result<()>;

    /// Move one payload across the wire and return the reply text, if the
    /// message expects one.
    async fn dispatch(&self, outbound: Outbound) -> Result<Option<String>>;

    /// Perform exactly one exchange. Requests yield `Some(response)`;
    /// notifications yield `None`.
    ///
    /// # Errors
    ///
    /// Fails with [`ProbeError::NotConnected`] before connecting, and with
    /// transport or timeout errors from the strategy. Every failure is
    /// counted in the metrics and emitted as [`TransportEvent::Error`].
    async fn send(&self, record: &mut MessageRecord) -> Result<Option<MessageRecord>> {
        let core = self.core();
        if core.state() != ConnectionState::Connected {
            return Err(core.fail(ProbeError::NotConnected(core.kind().to_string())));
        }

        let payload = codec::serialize(record).map_err(|e| core.fail(e))?;
        let method = record.message().method().unwrap_or_default().to_string();
        let reply_to = match record.message() {
            Message::Request(req) => Some(req.id.clone()),
            _ => None,
        };
        let bytes_sent = payload.len();

        tracing::debug!(transport = %core.kind(), method = %method, id = ?reply_to, "dispatching");
        let started = Instant::now();
        let reply = self
            .dispatch(Outbound {
                payload,
                method: method.clone(),
                reply_to,
            })
            .await
            .map_err(|e| core.fail(e))?;
        let latency = started.elapsed();

        core.record_exchange(
            bytes_sent,
            reply.as_ref().map(String::len).unwrap_or(0),
            latency,
        );
        tracing::debug!(
            transport = %core.kind(),
            method = %method,
            latency_ms = latency.as_millis() as u64,
            "exchange complete"
        );
        Ok(reply.map(codec::parse_response))
    }

    /// Send every record with at most [`MAX_BATCH_CONCURRENCY`] in flight.
    /// Each element succeeds or fails on its own; results keep input order.
    async fn send_batch(
        &self,
        records: Vec<MessageRecord>,
    ) -> Vec<Result<Option<MessageRecord>>> {
        futures::stream::iter(records.into_iter().map(|mut record| async move {
            self.send(&mut record).await
        }))
        .buffered(MAX_BATCH_CONCURRENCY)
        .collect()
        .await
    }

    /// Strategy kind.
    fn kind(&self) -> TransportKind {
        self.core().kind()
    }

    /// True when in the `connected` state.
    fn is_connected(&self) -> bool {
        self.core().state() == ConnectionState::Connected
    }

    /// Register an event handler; the returned token removes it.
    fn on(&self, handler: EventHandler) -> Subscription {
        self.core().subscribe(handler)
    }

    /// Read-only snapshot of the connection.
    fn connection_info(&self) -> ConnectionInfo {
        self.core().snapshot()
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Settings shared by every strategy.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Per-exchange deadline
    pub timeout: Duration,
    /// Extra HTTP headers (http, sse, websocket handshake)
    pub headers: HashMap<String, String>,
    /// Fixed POST target for the event-stream strategy
    pub post_endpoint: Option<String>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            headers: HashMap::new(),
            post_endpoint: None,
        }
    }
}

/// Build the one strategy registered for `kind`.
///
/// # Examples
///
/// ```
/// use mcp_probe::mcp::transport::{create_transport, TransportKind, TransportOptions};
///
/// let transport = create_transport(TransportKind::Http, TransportOptions::default()).unwrap();
/// assert_eq!(transport.kind(), TransportKind::Http);
/// assert!(!transport.is_connected());
/// ```
pub fn create_transport(kind: TransportKind, options: TransportOptions) -> Result<Arc<dyn Transport>> {
    let transport: Arc<dyn Transport> = match kind {
        TransportKind::Http => Arc::new(http::HttpTransport::new(options)?),
        TransportKind::WebSocket => Arc::new(websocket::WebSocketTransport::new(options)),
        TransportKind::Sse => Arc::new(sse::SseTransport::new(options)?),
        TransportKind::Stdio => Arc::new(stdio::StdioTransport::new(options)),
    };
    if transport.kind() != kind {
        return Err(ProbeError::Config(format!(
            "transport factory built {} for kind {}",
            transport.kind(),
            kind
        ))
        .into());
    }
    Ok(transport)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::codec::ProtocolCodec;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_factory_is_exhaustive() {
        for kind in TransportKind::ALL {
            let transport = create_transport(kind, TransportOptions::default()).unwrap();
            assert_eq!(transport.kind(), kind);
            assert_eq!(
                transport.connection_info().state,
                ConnectionState::Disconnected
            );
        }
    }

    #[test]
    fn test_kind_parse_and_display() {
        for kind in TransportKind::ALL {
            assert_eq!(kind.to_string().parse::<TransportKind>().unwrap(), kind);
        }
        assert_eq!("WS".parse::<TransportKind>().unwrap(), TransportKind::WebSocket);
        assert!("carrier-pigeon".parse::<TransportKind>().is_err());
    }

    #[test]
    fn test_transition_emits_only_on_change() {
        let core = TransportCore::new(TransportKind::Http);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = core.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

        core.transition(ConnectionState::Connecting);
        core.transition(ConnectionState::Connecting);
        core.transition(ConnectionState::Connected);

        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            TransportEvent::StateChanged {
                from: ConnectionState::Connecting,
                to: ConnectionState::Connected
            }
        );
        assert!(core.snapshot().connected_at.is_some());
    }

    #[test]
    fn test_fail_counts_and_emits() {
        let core = TransportCore::new(TransportKind::Sse);
        let errors = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&errors);
        let _sub = core.subscribe(move |e| {
            if matches!(e, TransportEvent::Error { .. }) {
                hits.fetch_add(1, Ordering::SeqCst);
            }
        });

        let err = core.fail(ProbeError::Transport("boom".into()));
        assert!(err.to_string().contains("boom"));
        assert_eq!(core.snapshot().metrics.error_count, 1);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pending_route_resolves_matching_id() {
        let core = TransportCore::new(TransportKind::WebSocket);
        let pending = PendingResponses::new();
        let rx = pending.register(RequestId::Number(4));

        pending.route(r#"{"jsonrpc":"2.0","id":4,"result":{}}"#.to_string(), &core);

        let text = pending
            .wait(&RequestId::Number(4), rx, "ping", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(text.contains("\"id\":4"));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_pending_route_emits_unmatched_messages() {
        let core = TransportCore::new(TransportKind::WebSocket);
        let pending = PendingResponses::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = core.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

        pending.route(
            r#"{"jsonrpc":"2.0","method":"notifications/progress","params":{"p":1}}"#.to_string(),
            &core,
        );

        let events = seen.lock().unwrap();
        match &events[0] {
            TransportEvent::Notification { message } => {
                assert_eq!(message.method(), Some("notifications/progress"))
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pending_wait_times_out_and_cancels() {
        let pending = PendingResponses::new();
        let rx = pending.register(RequestId::Number(1));
        let err = pending
            .wait(&RequestId::Number(1), rx, "tools/list", Duration::from_millis(10))
            .await
            .unwrap_err();
        let probe = err.downcast_ref::<ProbeError>().unwrap();
        assert!(matches!(probe, ProbeError::Timeout { method, .. } if method == "tools/list"));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_send_before_connect_fails_and_counts() {
        let transport = fake::FakeTransport::new();
        let codec = ProtocolCodec::new();
        let mut record = codec.build_request("ping", None, None);

        let err = transport.send(&mut record).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProbeError>(),
            Some(ProbeError::NotConnected(_))
        ));
        assert_eq!(transport.connection_info().metrics.error_count, 1);
    }

    #[tokio::test]
    async fn test_send_batch_preserves_order_and_isolates_failures() {
        let transport = fake::FakeTransport::new();
        transport.connect("fake://").await.unwrap();
        transport.route("a", fake::FakeReply::Result(json!({"n": 1})));
        transport.route("b", fake::FakeReply::Fail("second one breaks".into()));
        transport.route("c", fake::FakeReply::Result(json!({"n": 3})));

        let codec = ProtocolCodec::new();
        let batch = codec.build_batch(vec![("a", None), ("b", None), ("c", None)]);
        let results = transport.send_batch(batch).await;

        assert_eq!(results.len(), 3);
        let first = results[0].as_ref().unwrap().as_ref().unwrap();
        assert_eq!(first.response().unwrap().result(), Some(&json!({"n": 1})));
        assert!(results[1].is_err());
        let third = results[2].as_ref().unwrap().as_ref().unwrap();
        assert_eq!(third.response().unwrap().result(), Some(&json!({"n": 3})));
        assert_eq!(transport.connection_info().metrics.error_count, 1);
        assert_eq!(transport.connection_info().metrics.request_count, 2);
    }
}
