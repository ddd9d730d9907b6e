//! Request-response transport over HTTP POST
//!
//! Every outbound message is one POST to the endpoint. The server may reply
//! with:
//!
//! - `application/json` -- the JSON-RPC response as the body
//! - `text/event-stream` -- an SSE body carrying the response, possibly
//!   preceded by server notifications (these are emitted as events)
//! - `202 Accepted` -- an acknowledgement with no body (notifications)
//!
//! # Session management
//!
//! When a response carries an `MCP-Session-Id` header the value is stored and
//! attached to every later POST. `disconnect` issues a best-effort `DELETE`
//! carrying the session id and then forgets it.
//!
//! `connect` only validates and records the endpoint: HTTP has no standing
//! connection, so the first real I/O happens on the first `send`.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use crate::error::{ProbeError, Result};
use crate::mcp::codec;
use crate::mcp::transport::sse::{parse_sse_stream, SseEvent};
use crate::mcp::transport::{
    ConnectionState, Outbound, Transport, TransportCore, TransportKind, TransportOptions,
};

const SESSION_HEADER: &str = "MCP-Session-Id";

/// Request-response strategy.
///
/// # Examples
///
/// ```
/// use mcp_probe::mcp::transport::http::HttpTransport;
/// use mcp_probe::mcp::transport::{Transport, TransportOptions};
///
/// let transport = HttpTransport::new(TransportOptions::default()).unwrap();
/// assert!(!transport.is_connected());
/// ```
#[derive(Debug)]
pub struct HttpTransport {
    core: TransportCore,
    client: reqwest::Client,
    endpoint: RwLock<Option<Url>>,
    headers: HashMap<String, String>,
    session_id: RwLock<Option<String>>,
    timeout: Duration,
}

impl HttpTransport {
    /// Build the strategy. No network I/O is performed.
    pub fn new(options: TransportOptions) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(options.timeout).build()?;
        Ok(Self {
            core: TransportCore::new(TransportKind::Http),
            client,
            endpoint: RwLock::new(None),
            headers: options.headers,
            session_id: RwLock::new(None),
            timeout: options.timeout,
        })
    }

    /// Session id captured from the server, if any.
    pub fn session_id(&self) -> Option<String> {
        self.session_id
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn endpoint(&self) -> Option<Url> {
        self.endpoint
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn with_headers(&self, mut req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(sid) = self.session_id() {
            req = req.header(SESSION_HEADER, sid);
        }
        for (k, v) in &self.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        req
    }

    /// Drain an event-stream body and pick out the reply to `outbound`.
    async fn reply_from_event_stream(
        &self,
        response: reqwest::Response,
        outbound: &Outbound,
    ) -> Result<Option<String>> {
        let (tx, mut rx) = mpsc::unbounded_channel::<SseEvent>();
        parse_sse_stream(response.bytes_stream(), tx).await;

        let mut reply = None;
        while let Some(event) = rx.recv().await {
            let record = codec::parse_message(&event.data);
            let answers = match (&outbound.reply_to, record.response()) {
                (Some(id), Some(resp)) => &resp.id == id,
                _ => false,
            };
            if answers && reply.is_none() {
                reply = Some(event.data);
            } else {
                self.core.record_inbound(event.data.len());
                self.core.notify(record.into_message());
            }
        }

        match (&outbound.reply_to, reply) {
            (None, _) => Ok(None),
            (Some(_), Some(text)) => Ok(Some(text)),
            (Some(_), None) => Err(ProbeError::Transport(
                "event stream ended without a response".to_string(),
            )
            .into()),
        }
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    fn core(&self) -> &TransportCore {
        &self.core
    }

    async fn connect(&self, endpoint: &str) -> Result<()> {
        self.core.begin_connect(endpoint);
        let url = match Url::parse(endpoint) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            Ok(url) => {
                return Err(self.core.connect_failed(ProbeError::Transport(format!(
                    "unsupported scheme `{}` for http transport",
                    url.scheme()
                ))))
            }
            Err(e) => {
                return Err(self.core.connect_failed(ProbeError::Transport(format!(
                    "invalid endpoint `{}`: {}",
                    endpoint, e
                ))))
            }
        };
        *self.endpoint.write().unwrap_or_else(|p| p.into_inner()) = Some(url);
        self.core.transition(ConnectionState::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let session = self
            .session_id
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let (Some(sid), Some(url)) = (session, self.endpoint()) {
            let mut req = self.client.delete(url.as_str()).header(SESSION_HEADER, sid);
            for (k, v) in &self.headers {
                req = req.header(k.as_str(), v.as_str());
            }
            if let Err(e) = req.send().await {
                tracing::debug!(error = %e, "session DELETE failed");
            }
        }
        self.core.transition(ConnectionState::Disconnected);
        Ok(())
    }

    async fn dispatch(&self, outbound: Outbound) -> Result<Option<String>> {
        let url = self
            .endpoint()
            .ok_or_else(|| ProbeError::NotConnected("http".to_string()))?;

        let req = self.with_headers(
            self.client
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .header("Accept", "application/json, text/event-stream")
                .body(outbound.payload.clone()),
        );

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout {
                    method: outbound.method.clone(),
                    timeout_ms: self.timeout.as_millis() as u64,
                }
            } else {
                ProbeError::Transport(format!("HTTP POST failed: {}", e))
            }
        })?;

        if let Some(sid) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
        {
            let mut slot = self.session_id.write().unwrap_or_else(|p| p.into_inner());
            if slot.is_none() {
                tracing::debug!(session_id = %sid, "captured session id");
                *slot = Some(sid);
            }
        }

        let status = response.status();
        if status == reqwest::StatusCode::ACCEPTED {
            return Ok(None);
        }

        let content_type = response
            .headers()
            .get("Content-Type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if status.is_success() && content_type.contains("text/event-stream") {
            return self.reply_from_event_stream(response, &outbound).await;
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProbeError::Transport(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            // A JSON-RPC error body on a failing status is still an answer.
            let is_rpc = serde_json::from_str::<Value>(&body)
                .map(|v| v.get("jsonrpc").is_some())
                .unwrap_or(false);
            if is_rpc && outbound.reply_to.is_some() {
                return Ok(Some(body));
            }
            return Err(
                ProbeError::Transport(format!("HTTP POST returned status {}", status)).into(),
            );
        }

        if outbound.reply_to.is_none() {
            return Ok(None);
        }
        Ok(Some(body))
    }
}
