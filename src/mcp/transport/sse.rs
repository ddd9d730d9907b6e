//! Event-stream transport: server-sent events inbound, HTTP POST outbound
//!
//! `connect` opens a long-lived GET with `Accept: text/event-stream`. Every
//! `data:` event is routed through [`PendingResponses`]: replies resolve the
//! matching in-flight request, anything else is emitted as a notification.
//!
//! Outbound messages are POSTed. The POST target is, in priority order:
//!
//! 1. `TransportOptions::post_endpoint`, when configured.
//! 2. The URL announced by the server in an `event: endpoint` event
//!    (resolved relative to the stream URL).
//! 3. The stream URL itself.
//!
//! Servers that answer the POST inline with the JSON-RPC response are also
//! handled; the inline reply wins and the pending slot is dropped.
//!
//! The SSE parser ([`parse_sse_stream`]) is shared with the request-response
//! transport, which may receive an event-stream body from a POST.

use std::sync::{Arc, Mutex, RwLock};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{ProbeError, Result};
use crate::mcp::codec;
use crate::mcp::transport::{
    ConnectionState, Outbound, PendingResponses, Transport, TransportCore, TransportKind,
    TransportOptions,
};

/// One dispatched server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// `event:` field, if any
    pub event: Option<String>,
    /// Joined `data:` lines
    pub data: String,
    /// `id:` field, if any
    pub id: Option<String>,
}

// ---------------------------------------------------------------------------
// SSE parser
// ---------------------------------------------------------------------------

/// Parse an SSE byte stream and forward complete events to `events_tx`.
///
/// Intended to run inside a `tokio::spawn`; it consumes the stream until it
/// ends or yields an error.
///
/// - Events are separated by a blank line (`\n\n`, `\r\n` normalized).
/// - Multiple `data:` lines are joined with `\n`.
/// - `event: ping` and `data: [PING]` (case-insensitive) are dropped.
/// - Events with no data are dropped.
/// - Lines starting with `:` are comments; `retry:` is ignored.
pub async fn parse_sse_stream<E>(
    byte_stream: impl Stream<Item = std::result::Result<Bytes, E>>,
    events_tx: mpsc::UnboundedSender<SseEvent>,
) {
    // Raw bytes so a multi-byte character split across chunks survives.
    let mut buffer: Vec<u8> = Vec::new();

    tokio::pin!(byte_stream);

    while let Some(chunk_result) = byte_stream.next().await {
        let chunk = match chunk_result {
            Ok(c) => c,
            Err(_) => break,
        };
        buffer.extend(chunk.iter().filter(|b| **b != b'\r'));

        while let Some(pos) = buffer.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = buffer.drain(..pos + 2).collect();
            if let Some(event) = parse_event_block(&String::from_utf8_lossy(&block[..pos])) {
                if events_tx.send(event).is_err() {
                    return;
                }
            }
        }
    }

    if !buffer.is_empty() {
        if let Some(event) = parse_event_block(&String::from_utf8_lossy(&buffer)) {
            let _ = events_tx.send(event);
        }
    }
}

/// Parse one event block (the text between two blank-line delimiters).
pub fn parse_event_block(block: &str) -> Option<SseEvent> {
    let mut data_lines: Vec<&str> = Vec::new();
    let mut event_type: Option<&str> = None;
    let mut event_id: Option<&str> = None;

    for line in block.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.trim());
        } else if let Some(value) = line.strip_prefix("id:") {
            event_id = Some(value.trim());
        } else if let Some(value) = line.strip_prefix("event:") {
            event_type = Some(value.trim());
        }
    }

    if matches!(event_type, Some(et) if et.eq_ignore_ascii_case("ping")) {
        return None;
    }

    let data = data_lines.join("\n");
    if data.is_empty() || data.eq_ignore_ascii_case("[ping]") {
        return None;
    }

    Some(SseEvent {
        event: event_type.map(str::to_string),
        data,
        id: event_id.map(str::to_string),
    })
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Event-stream strategy.
#[derive(Debug)]
pub struct SseTransport {
    core: Arc<TransportCore>,
    pending: Arc<PendingResponses>,
    client: reqwest::Client,
    options: TransportOptions,
    stream_url: RwLock<Option<Url>>,
    post_url: Arc<RwLock<Option<Url>>>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl SseTransport {
    /// Build the strategy. No I/O happens until `connect`.
    ///
    /// The HTTP client carries no overall timeout because the event stream
    /// is long-lived; each POST applies `options.timeout` on its own.
    pub fn new(options: TransportOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(options.timeout)
            .build()?;
        Ok(Self {
            core: Arc::new(TransportCore::new(TransportKind::Sse)),
            pending: Arc::new(PendingResponses::new()),
            client,
            options,
            stream_url: RwLock::new(None),
            post_url: Arc::new(RwLock::new(None)),
            cancel: Mutex::new(None),
        })
    }

    fn target(&self) -> Option<Url> {
        let announced = self
            .post_url
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        announced.or_else(|| {
            self.stream_url
                .read()
                .unwrap_or_else(|p| p.into_inner())
                .clone()
        })
    }

    fn stop_reader(&self) {
        if let Some(token) = self.cancel.lock().unwrap_or_else(|p| p.into_inner()).take() {
            token.cancel();
        }
    }

    async fn open(&self, endpoint: &str) -> Result<()> {
        let url = Url::parse(endpoint)
            .map_err(|e| ProbeError::Transport(format!("invalid endpoint `{}`: {}", endpoint, e)))?;

        let fixed_post = match &self.options.post_endpoint {
            Some(post) => Some(url.join(post).map_err(|e| {
                ProbeError::Config(format!("invalid post endpoint `{}`: {}", post, e))
            })?),
            None => None,
        };

        let mut req = self
            .client
            .get(url.as_str())
            .header("Accept", "text/event-stream");
        for (k, v) in &self.options.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        let response = req
            .send()
            .await
            .map_err(|e| ProbeError::Transport(format!("event stream request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(
                ProbeError::Transport(format!("event stream returned HTTP {}", status)).into(),
            );
        }

        *self.stream_url.write().unwrap_or_else(|p| p.into_inner()) = Some(url.clone());
        *self.post_url.write().unwrap_or_else(|p| p.into_inner()) = fixed_post.clone();

        let token = CancellationToken::new();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<SseEvent>();

        let parse_token = token.clone();
        let byte_stream = response.bytes_stream();
        tokio::spawn(async move {
            tokio::select! {
                _ = parse_token.cancelled() => {}
                _ = parse_sse_stream(byte_stream, events_tx) => {}
            }
        });

        let core = Arc::clone(&self.core);
        let pending = Arc::clone(&self.pending);
        let post_url = Arc::clone(&self.post_url);
        let read_token = token.clone();
        let allow_announce = fixed_post.is_none();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = read_token.cancelled() => return,
                    event = events_rx.recv() => event,
                };
                let Some(event) = event else { break };

                if event.event.as_deref() == Some("endpoint") {
                    if !allow_announce {
                        continue;
                    }
                    match url.join(event.data.trim()) {
                        Ok(announced) => {
                            tracing::debug!(post_url = %announced, "server announced post endpoint");
                            *post_url.write().unwrap_or_else(|p| p.into_inner()) = Some(announced);
                        }
                        Err(e) => tracing::warn!(error = %e, "ignoring unparsable endpoint event"),
                    }
                    continue;
                }
                pending.route(event.data, &core);
            }

            tracing::info!(transport = "sse", "event stream closed by server");
            pending.clear();
            core.transition(ConnectionState::Disconnected);
        });

        *self.cancel.lock().unwrap_or_else(|p| p.into_inner()) = Some(token);
        Ok(())
    }

    async fn post(&self, outbound: &Outbound) -> Result<String> {
        let url = self.target().ok_or_else(|| ProbeError::NotConnected("sse".to_string()))?;
        let mut req = self
            .client
            .post(url.as_str())
            .timeout(self.options.timeout)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .body(outbound.payload.clone());
        for (k, v) in &self.options.headers {
            req = req.header(k.as_str(), v.as_str());
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout {
                    method: outbound.method.clone(),
                    timeout_ms: self.options.timeout.as_millis() as u64,
                }
            } else {
                ProbeError::Transport(format!("HTTP POST failed: {}", e))
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Transport(format!("HTTP POST returned status {}", status)).into());
        }
        response
            .text()
            .await
            .map_err(|e| ProbeError::Transport(format!("Failed to read POST reply: {}", e)).into())
    }
}

#[async_trait::async_trait]
impl Transport for SseTransport {
    fn core(&self) -> &TransportCore {
        &self.core
    }

    async fn connect(&self, endpoint: &str) -> Result<()> {
        if self.is_connected() {
            tracing::debug!(transport = "sse", "already connected");
            return Ok(());
        }
        self.stop_reader();
        self.core.begin_connect(endpoint);
        match self.open(endpoint).await {
            Ok(()) => {
                self.core.transition(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => Err(self.core.connect_failed(e)),
        }
    }

    async fn disconnect(&self) -> Result<()> {
        self.stop_reader();
        self.pending.clear();
        self.core.transition(ConnectionState::Disconnected);
        Ok(())
    }

    async fn dispatch(&self, outbound: Outbound) -> Result<Option<String>> {
        let Some(id) = outbound.reply_to.clone() else {
            self.post(&outbound).await?;
            return Ok(None);
        };

        let rx = self.pending.register(id.clone());
        let body = match self.post(&outbound).await {
            Ok(body) => body,
            Err(e) => {
                self.pending.cancel(&id);
                return Err(e);
            }
        };

        let inline = codec::parse_message(body.trim());
        if inline.response().map(|r| &r.id) == Some(&id) {
            self.pending.cancel(&id);
            return Ok(Some(body));
        }

        self.pending
            .wait(&id, rx, &outbound.method, self.options.timeout)
            .await
            .map(Some)
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.stop_reader();
    }
}
