//! Socket transport over WebSocket text frames
//!
//! One JSON-RPC message per text frame in both directions. A background
//! reader task routes inbound frames through [`PendingResponses`] so many
//! requests can share the socket; unmatched frames become notification
//! events. Binary frames are accepted when they hold UTF-8 text.
//!
//! When the server closes the socket the transport moves to
//! `disconnected` and every waiting request fails.

use std::sync::{Arc, Mutex};

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::error::{ProbeError, Result};
use crate::mcp::transport::{
    ConnectionState, Outbound, PendingResponses, Transport, TransportCore, TransportKind,
    TransportOptions,
};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// Socket strategy.
pub struct WebSocketTransport {
    core: Arc<TransportCore>,
    pending: Arc<PendingResponses>,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    cancel: Mutex<Option<CancellationToken>>,
    options: TransportOptions,
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("core", &self.core)
            .field("pending", &self.pending.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl WebSocketTransport {
    /// Build the strategy. No I/O happens until `connect`.
    pub fn new(options: TransportOptions) -> Self {
        Self {
            core: Arc::new(TransportCore::new(TransportKind::WebSocket)),
            pending: Arc::new(PendingResponses::new()),
            sink: tokio::sync::Mutex::new(None),
            cancel: Mutex::new(None),
            options,
        }
    }

    fn stop_reader(&self) {
        if let Some(token) = self.cancel.lock().unwrap_or_else(|p| p.into_inner()).take() {
            token.cancel();
        }
    }

    async fn open(&self, endpoint: &str) -> Result<()> {
        let mut request = endpoint
            .into_client_request()
            .map_err(|e| ProbeError::Transport(format!("invalid endpoint `{}`: {}", endpoint, e)))?;
        for (k, v) in &self.options.headers {
            let name = HeaderName::from_bytes(k.as_bytes())
                .map_err(|e| ProbeError::Config(format!("invalid header name `{}`: {}", k, e)))?;
            let value = HeaderValue::from_str(v)
                .map_err(|e| ProbeError::Config(format!("invalid header value for `{}`: {}", k, e)))?;
            request.headers_mut().insert(name, value);
        }

        let (ws, _response) =
            tokio::time::timeout(self.options.timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| ProbeError::Transport("websocket handshake timed out".to_string()))?
                .map_err(|e| ProbeError::Transport(format!("websocket connect failed: {}", e)))?;
        let (sink, mut stream) = ws.split();
        *self.sink.lock().await = Some(sink);

        let token = CancellationToken::new();
        let reader_token = token.clone();
        let core = Arc::clone(&self.core);
        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = reader_token.cancelled() => return,
                    frame = stream.next() => frame,
                };
                match frame {
                    Some(Ok(WsMessage::Text(text))) => pending.route(text.to_string(), &core),
                    Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => pending.route(text, &core),
                        Err(_) => tracing::warn!(transport = "websocket", "dropping non-UTF-8 binary frame"),
                    },
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        core.fail(ProbeError::Transport(format!("websocket read failed: {}", e)));
                        break;
                    }
                }
            }
            tracing::info!(transport = "websocket", "socket closed by server");
            pending.clear();
            core.transition(ConnectionState::Disconnected);
        });

        *self.cancel.lock().unwrap_or_else(|p| p.into_inner()) = Some(token);
        Ok(())
    }

    async fn write(&self, payload: String) -> Result<()> {
        let mut guard = self.sink.lock().await;
        let sink = guard
            .as_mut()
            .ok_or_else(|| ProbeError::NotConnected("websocket".to_string()))?;
        sink.send(WsMessage::Text(payload.into()))
            .await
            .map_err(|e| ProbeError::Transport(format!("websocket send failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Transport for WebSocketTransport {
    fn core(&self) -> &TransportCore {
        &self.core
    }

    async fn connect(&self, endpoint: &str) -> Result<()> {
        if self.is_connected() {
            tracing::debug!(transport = "websocket", "already connected");
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
        if let Some(mut sink) = self.sink.lock().await.take() {
            if let Err(e) = sink.close().await {
                tracing::debug!(error = %e, "websocket close handshake failed");
            }
        }
        self.pending.clear();
        self.core.transition(ConnectionState::Disconnected);
        Ok(())
    }

    async fn dispatch(&self, outbound: Outbound) -> Result<Option<String>> {
        let Some(id) = outbound.reply_to.clone() else {
            self.write(outbound.payload).await?;
            return Ok(None);
        };

        let rx = self.pending.register(id.clone());
        if let Err(e) = self.write(outbound.payload.clone()).await {
            self.pending.cancel(&id);
            return Err(e);
        }
        self.pending
            .wait(&id, rx, &outbound.method, self.options.timeout)
            .await
            .map(Some)
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.stop_reader();
    }
}
