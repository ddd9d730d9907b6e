//! Shared-channel transport tests: WebSocket, event-stream and stdio
//!
//! WebSocket and event-stream tests run against small in-process servers
//! from `common`. The stdio tests spawn the `mcp_test_server` binary that
//! Cargo builds for integration tests (`CARGO_BIN_EXE_mcp_test_server`).

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use mcp_probe::mcp::transport::{
    create_transport, ConnectionState, Transport, TransportEvent, TransportKind, TransportOptions,
};
use mcp_probe::events::Subscription;
use mcp_probe::mcp::types::RequestId;
use mcp_probe::ProtocolCodec;

fn options() -> TransportOptions {
    TransportOptions {
        timeout: Duration::from_secs(5),
        ..TransportOptions::default()
    }
}

fn notification_methods(transport: &dyn Transport) -> (Arc<Mutex<Vec<String>>>, Subscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let sub = transport.on(Box::new(move |event| {
        if let TransportEvent::Notification { message } = event {
            sink.lock()
                .unwrap()
                .push(message.method().unwrap_or_default().to_string());
        }
    }));
    (seen, sub)
}

async fn wait_for(seen: &Arc<Mutex<Vec<String>>>, count: usize) {
    for _ in 0..50 {
        if seen.lock().unwrap().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Request/response, server push, and concurrent correlation over one channel.
async fn exercise_shared_channel(kind: TransportKind, endpoint: &str) {
    let transport = create_transport(kind, options()).unwrap();
    transport.connect(endpoint).await.expect("connect");
    assert!(transport.is_connected());
    assert_eq!(transport.kind(), kind);

    let codec = ProtocolCodec::new();
    let mut request = codec.build_request("tools/list", Some(json!({"cursor": "a"})), None);
    let reply = transport.send(&mut request).await.unwrap().unwrap();
    let response = reply.response().unwrap();
    assert_eq!(response.id, RequestId::Number(1));
    assert_eq!(response.result().unwrap()["method"], "tools/list");
    assert_eq!(response.result().unwrap()["params"]["cursor"], "a");

    let (seen, _sub) = notification_methods(transport.as_ref());
    let mut notify = codec.build_request("test/notify", None, None);
    transport.send(&mut notify).await.unwrap().unwrap();
    wait_for(&seen, 1).await;
    assert_eq!(*seen.lock().unwrap(), vec!["notifications/message".to_string()]);

    let batch = codec.build_batch(["a", "b", "c", "d"].map(|m| (m, None)));
    let expected: Vec<RequestId> = batch
        .iter()
        .map(|r| r.message().id().cloned().unwrap())
        .collect();
    let results = transport.send_batch(batch).await;
    assert_eq!(results.len(), 4);
    for (result, id) in results.into_iter().zip(expected) {
        let reply = result.unwrap().unwrap();
        assert_eq!(reply.response().unwrap().id, id);
    }

    let mut note = codec.build_notification("notifications/initialized", None);
    assert!(transport.send(&mut note).await.unwrap().is_none());

    transport.disconnect().await.unwrap();
    assert_eq!(transport.connection_info().state, ConnectionState::Disconnected);
    let mut late = codec.build_request("ping", None, None);
    assert!(transport.send(&mut late).await.is_err());
}

#[tokio::test]
async fn test_websocket_round_trips() {
    let endpoint = common::spawn_ws_server().await;
    exercise_shared_channel(TransportKind::WebSocket, &endpoint).await;
}

#[tokio::test]
async fn test_event_stream_round_trips() {
    let endpoint = common::spawn_sse_server().await;
    exercise_shared_channel(TransportKind::Sse, &endpoint).await;
}

#[tokio::test]
async fn test_stdio_initialize_list_and_call() {
    let transport = create_transport(TransportKind::Stdio, options()).unwrap();
    let exe = common::test_server_exe();
    transport
        .connect(exe.to_str().expect("utf-8 path"))
        .await
        .expect("spawn test server");

    let codec = ProtocolCodec::new();
    let mut init = codec.build_request(
        "initialize",
        Some(json!({"protocolVersion": "2025-06-18", "capabilities": {}})),
        None,
    );
    let reply = transport.send(&mut init).await.unwrap().unwrap();
    let result = reply.response().unwrap().result().unwrap().clone();
    assert_eq!(result["serverInfo"]["name"], "mcp-test-server");

    let mut initialized = codec.build_notification("notifications/initialized", None);
    assert!(transport.send(&mut initialized).await.unwrap().is_none());

    let mut list = codec.build_request("tools/list", None, None);
    let reply = transport.send(&mut list).await.unwrap().unwrap();
    assert_eq!(reply.response().unwrap().result().unwrap()["tools"][0]["name"], "echo");

    let mut call = codec.build_request(
        "tools/call",
        Some(json!({"name": "echo", "arguments": {"message": "hi there"}})),
        None,
    );
    let reply = transport.send(&mut call).await.unwrap().unwrap();
    assert_eq!(
        reply.response().unwrap().result().unwrap()["content"][0]["text"],
        "hi there"
    );

    let mut unknown = codec.build_request("no/such", None, None);
    let reply = transport.send(&mut unknown).await.unwrap().unwrap();
    assert_eq!(reply.response().unwrap().error().unwrap().code, -32601);

    transport.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_stdio_server_push_is_emitted() {
    let transport = create_transport(TransportKind::Stdio, options()).unwrap();
    transport
        .connect(common::test_server_exe().to_str().unwrap())
        .await
        .unwrap();
    let (seen, _sub) = notification_methods(transport.as_ref());

    let codec = ProtocolCodec::new();
    let mut request = codec.build_request("test/notify", None, None);
    transport.send(&mut request).await.unwrap().unwrap();
    wait_for(&seen, 1).await;
    assert_eq!(*seen.lock().unwrap(), vec!["notifications/message".to_string()]);

    transport.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_stdio_request_times_out() {
    let transport = create_transport(
        TransportKind::Stdio,
        TransportOptions {
            timeout: Duration::from_millis(100),
            ..TransportOptions::default()
        },
    )
    .unwrap();
    transport
        .connect(common::test_server_exe().to_str().unwrap())
        .await
        .unwrap();

    let codec = ProtocolCodec::new();
    let mut slow = codec.build_request("test/sleep", Some(json!({"ms": 1000})), None);
    let err = transport.send(&mut slow).await.unwrap_err();
    assert!(err.to_string().contains("timed out"));
    assert_eq!(transport.connection_info().metrics.error_count, 1);

    transport.disconnect().await.unwrap();
}
