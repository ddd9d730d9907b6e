//! MCP test server binary for integration tests
//!
//! This binary implements a minimal MCP server that communicates over
//! stdin/stdout using length-prefixed frames (a 4-byte big-endian length
//! followed by the UTF-8 JSON payload). It is used exclusively by
//! integration tests to exercise the stdio transport without requiring a
//! real external MCP server.
//!
//! # Handled Methods
//!
//! - `initialize` -- protocol version, `tools` capability and server info.
//! - `notifications/*` -- swallowed (no response).
//! - `tools/list` -- one tool: `"echo"` with a string `message` parameter.
//! - `tools/call` with `name: "echo"` -- echoes back the `message` argument.
//! - `ping` -- empty result.
//! - `test/notify` -- writes a `notifications/message` frame, then an empty
//!   result, so tests can observe unsolicited server messages.
//! - `test/sleep` -- waits `params.ms` milliseconds before answering.
//! - All other methods -- JSON-RPC `-32601 Method not found`.
//!
//! Undecodable payloads are answered with `-32700` and the loop continues.
//! The process exits when stdin closes.

use std::io::{self, Read, Write};
use std::time::Duration;

use mcp_probe::mcp::transport::framing::{encode_frame, HEADER_LEN};
use serde_json::{json, Value};

fn read_frame(input: &mut impl Read) -> Option<Vec<u8>> {
    let mut header = [0u8; HEADER_LEN];
    input.read_exact(&mut header).ok()?;
    let len = u32::from_be_bytes(header) as usize;
    let mut body = vec![0u8; len];
    input.read_exact(&mut body).ok()?;
    Some(body)
}

fn write_frame(out: &mut impl Write, value: &Value) -> io::Result<()> {
    let frame = encode_frame(&value.to_string())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    out.write_all(&frame)?;
    out.flush()
}

fn main() {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    while let Some(body) = read_frame(&mut input) {
        let request: Value = match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(_) => {
                if write_frame(&mut out, &make_error(&Value::Null, -32700, "Parse error")).is_err() {
                    break;
                }
                continue;
            }
        };

        let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");
        let Some(id) = request.get("id").cloned() else {
            // Notifications never get a reply.
            continue;
        };

        let response = match method {
            "initialize" => handle_initialize(&id),
            "tools/list" => handle_tools_list(&id),
            "tools/call" => handle_tools_call(&id, &request),
            "ping" => result(&id, json!({})),
            "test/notify" => {
                let note = json!({
                    "jsonrpc": "2.0",
                    "method": "notifications/message",
                    "params": {"level": "info", "data": "hello"}
                });
                if write_frame(&mut out, &note).is_err() {
                    break;
                }
                result(&id, json!({}))
            }
            "test/sleep" => {
                let ms = request
                    .get("params")
                    .and_then(|p| p.get("ms"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                std::thread::sleep(Duration::from_millis(ms));
                result(&id, json!({"slept_ms": ms}))
            }
            _ => make_error(&id, -32601, &format!("Method not found: {}", method)),
        };

        if write_frame(&mut out, &response).is_err() {
            break;
        }
    }
}

fn result(id: &Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

fn handle_initialize(id: &Value) -> Value {
    result(
        id,
        json!({
            "protocolVersion": "2025-06-18",
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "mcp-test-server", "version": "0.1.0"}
        }),
    )
}

fn handle_tools_list(id: &Value) -> Value {
    result(
        id,
        json!({
            "tools": [{
                "name": "echo",
                "description": "Echoes input",
                "inputSchema": {
                    "type": "object",
                    "properties": {"message": {"type": "string"}}
                }
            }]
        }),
    )
}

/// Echo tool. Any other tool name is `-32602`.
fn handle_tools_call(id: &Value, request: &Value) -> Value {
    let params = request.get("params").unwrap_or(&Value::Null);
    let tool_name = params.get("name").and_then(|n| n.as_str()).unwrap_or("");
    if tool_name != "echo" {
        return make_error(id, -32602, &format!("Unknown tool: {}", tool_name));
    }
    let message = params
        .get("arguments")
        .and_then(|a| a.get("message"))
        .and_then(|m| m.as_str())
        .unwrap_or("");
    result(
        id,
        json!({
            "content": [{"type": "text", "text": message}],
            "isError": false
        }),
    )
}

fn make_error(id: &Value, code: i32, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": code, "message": message}
    })
}
