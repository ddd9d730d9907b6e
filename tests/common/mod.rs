use std::fs;
use std::path::PathBuf;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Path to the `mcp_test_server` binary built alongside the tests.
#[allow(dead_code)]
pub fn test_server_exe() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_mcp_test_server"))
}

#[allow(dead_code)]
pub fn temp_file(name: &str, contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let path = temp_dir.path().join(name);
    fs::write(&path, contents).expect("failed to write temp file");
    (temp_dir, path)
}

/// Replies a scripted server sends for one inbound message.
///
/// Requests are answered with `{"method": ..., "params": ...}`; notifications
/// get nothing. `test/notify` is preceded by a server notification.
#[allow(dead_code)]
pub fn scripted_replies(text: &str) -> Vec<String> {
    let Ok(request) = serde_json::from_str::<Value>(text) else {
        return vec![json!({
            "jsonrpc": "2.0",
            "id": null,
            "error": {"code": -32700, "message": "Parse error"}
        })
        .to_string()];
    };
    let Some(id) = request.get("id").cloned() else {
        return Vec::new();
    };
    let method = request.get("method").cloned().unwrap_or(Value::Null);
    let params = request.get("params").cloned().unwrap_or(Value::Null);

    let mut replies = Vec::new();
    if method == "test/notify" {
        replies.push(
            json!({
                "jsonrpc": "2.0",
                "method": "notifications/message",
                "params": {"level": "info", "data": "hello"}
            })
            .to_string(),
        );
    }
    replies.push(
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {"method": method, "params": params}
        })
        .to_string(),
    );
    replies
}

/// Start a WebSocket server answering with [`scripted_replies`].
/// Returns its `ws://` URL.
#[allow(dead_code)]
pub async fn spawn_ws_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(frame)) = ws.next().await {
                    let text = match frame {
                        WsMessage::Text(text) => text.as_str().to_string(),
                        WsMessage::Close(_) => return,
                        _ => continue,
                    };
                    for reply in scripted_replies(&text) {
                        if ws.send(WsMessage::Text(reply.into())).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }
    });
    format!("ws://{}", addr)
}

/// Start a minimal event-stream server.
///
/// `GET` opens the stream and announces `/messages` as the POST target.
/// Every `POST` is acknowledged with `202` and its replies are pushed down
/// the open stream. Returns the stream URL.
#[allow(dead_code)]
pub async fn spawn_sse_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (events, _) = broadcast::channel::<String>(64);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve_sse_connection(stream, events.clone()));
        }
    });
    format!("http://{}/sse", addr)
}

async fn serve_sse_connection(stream: TcpStream, events: broadcast::Sender<String>) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    loop {
        let mut request_line = String::new();
        if reader.read_line(&mut request_line).await.unwrap_or(0) == 0 {
            return;
        }
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                return;
            }
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap_or(0);
                }
            }
        }

        if request_line.starts_with("GET") {
            let mut rx = events.subscribe();
            let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\n\r\n";
            if write_half.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            let _ = write_half
                .write_all(b": connected\n\nevent: endpoint\ndata: /messages\n\n")
                .await;
            let _ = write_half.flush().await;
            while let Ok(data) = rx.recv().await {
                let event = format!("data: {}\n\n", data);
                if write_half.write_all(event.as_bytes()).await.is_err() {
                    return;
                }
                let _ = write_half.flush().await;
            }
            return;
        }

        let mut body = vec![0u8; content_length];
        if reader.read_exact(&mut body).await.is_err() {
            return;
        }
        for reply in scripted_replies(&String::from_utf8_lossy(&body)) {
            let _ = events.send(reply);
        }
        if write_half
            .write_all(b"HTTP/1.1 202 Accepted\r\nContent-Length: 0\r\n\r\n")
            .await
            .is_err()
        {
            return;
        }
    }
}
