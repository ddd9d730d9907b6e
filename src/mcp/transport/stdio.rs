//! Byte-stream transport over a child process's stdin/stdout
//!
//! The endpoint is a command line (`program arg1 arg2 ...`, split on
//! whitespace). `connect` spawns it with piped stdio and speaks
//! length-prefixed frames (see [`super::framing`]) in both directions.
//!
//! - Outbound frames are written to the child's stdin.
//! - Inbound frames from the child's stdout are routed through
//!   [`PendingResponses`] by a background reader task.
//! - The child's stderr is logged line by line via `tracing::debug!` and is
//!   never treated as an error.
//!
//! The child is killed on `disconnect` and when the transport is dropped.

use std::process::Stdio;
use std::sync::{Arc, Mutex};

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::error::{ProbeError, Result};
use crate::mcp::transport::framing::FrameCodec;
use crate::mcp::transport::{
    ConnectionState, Outbound, PendingResponses, Transport, TransportCore, TransportKind,
    TransportOptions,
};

/// Byte-stream strategy driving a child process.
///
/// # Examples
///
/// ```no_run
/// use mcp_probe::mcp::transport::stdio::StdioTransport;
/// use mcp_probe::mcp::transport::{Transport, TransportOptions};
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let transport = StdioTransport::new(TransportOptions::default());
/// transport.connect("my-mcp-server --stdio").await?;
/// # Ok(())
/// # }
/// ```
pub struct StdioTransport {
    core: Arc<TransportCore>,
    pending: Arc<PendingResponses>,
    writer: tokio::sync::Mutex<Option<FramedWrite<ChildStdin, FrameCodec>>>,
    child: tokio::sync::Mutex<Option<Child>>,
    cancel: Mutex<Option<CancellationToken>>,
    options: TransportOptions,
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("core", &self.core)
            .field("pending", &self.pending.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl StdioTransport {
    /// Build the strategy. Nothing is spawned until `connect`.
    pub fn new(options: TransportOptions) -> Self {
        Self {
            core: Arc::new(TransportCore::new(TransportKind::Stdio)),
            pending: Arc::new(PendingResponses::new()),
            writer: tokio::sync::Mutex::new(None),
            child: tokio::sync::Mutex::new(None),
            cancel: Mutex::new(None),
            options,
        }
    }

    fn stop_reader(&self) {
        if let Some(token) = self.cancel.lock().unwrap_or_else(|p| p.into_inner()).take() {
            token.cancel();
        }
    }

    async fn spawn(&self, command_line: &str) -> Result<()> {
        let mut parts = command_line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| ProbeError::Transport("empty command line".to_string()))?;

        let mut child = Command::new(program)
            .args(parts)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ProbeError::Transport(format!("failed to spawn MCP server `{}`: {}", program, e))
            })?;

        // Each is Some because Stdio::piped() was requested above.
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProbeError::Transport("child stdin unavailable after spawn".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProbeError::Transport("child stdout unavailable after spawn".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ProbeError::Transport("child stderr unavailable after spawn".into()))?;

        *self.writer.lock().await = Some(FramedWrite::new(stdin, FrameCodec::new()));
        *self.child.lock().await = Some(child);

        let token = CancellationToken::new();

        let reader_token = token.clone();
        let core = Arc::clone(&self.core);
        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            let mut frames = FramedRead::new(stdout, FrameCodec::new());
            loop {
                let frame = tokio::select! {
                    _ = reader_token.cancelled() => return,
                    frame = frames.next() => frame,
                };
                match frame {
                    Some(Ok(payload)) => pending.route(payload, &core),
                    Some(Err(e)) => {
                        core.fail(ProbeError::Frame(e.to_string()));
                        break;
                    }
                    None => break,
                }
            }
            tracing::info!(transport = "stdio", "child stdout closed");
            pending.clear();
            core.transition(ConnectionState::Disconnected);
        });

        let stderr_token = token.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            loop {
                let line = tokio::select! {
                    _ = stderr_token.cancelled() => return,
                    line = lines.next_line() => line,
                };
                match line {
                    Ok(Some(line)) => tracing::debug!(
                        target: "mcp_probe::mcp::transport::stdio",
                        "mcp server stderr: {}",
                        line
                    ),
                    _ => return,
                }
            }
        });

        *self.cancel.lock().unwrap_or_else(|p| p.into_inner()) = Some(token);
        Ok(())
    }

    async fn write(&self, payload: String) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| ProbeError::NotConnected("stdio".to_string()))?;
        writer
            .send(payload)
            .await
            .map_err(|e| ProbeError::Transport(format!("write to child stdin failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Transport for StdioTransport {
    fn core(&self) -> &TransportCore {
        &self.core
    }

    async fn connect(&self, endpoint: &str) -> Result<()> {
        if self.is_connected() {
            tracing::debug!(transport = "stdio", "already connected");
            return Ok(());
        }
        self.stop_reader();
        self.core.begin_connect(endpoint);
        match self.spawn(endpoint).await {
            Ok(()) => {
                self.core.transition(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => Err(self.core.connect_failed(e)),
        }
    }

    async fn disconnect(&self) -> Result<()> {
        self.stop_reader();
        self.writer.lock().await.take();
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                tracing::debug!(error = %e, "failed to kill MCP server process");
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

impl Drop for StdioTransport {
    fn drop(&mut self) {
        // kill_on_drop on the Child handles the process itself.
        self.stop_reader();
    }
}
