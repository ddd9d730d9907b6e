//! Request-response transport tests against a `wiremock` server
//!
//! # wiremock body helpers
//!
//! Use `set_body_raw(bytes, mime)` for event-stream responses so that the
//! `Content-Type` is exactly `text/event-stream`. `set_body_json` forces
//! `application/json`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mcp_probe::mcp::transport::http::HttpTransport;
use mcp_probe::mcp::transport::{ConnectionState, Transport, TransportEvent, TransportOptions};
use mcp_probe::mcp::types::{Message, RequestId};
use mcp_probe::{ProbeError, ProtocolCodec};

fn make_transport(timeout: Duration) -> HttpTransport {
    HttpTransport::new(TransportOptions {
        timeout,
        ..TransportOptions::default()
    })
    .expect("client builds")
}

async fn connected(server: &MockServer) -> HttpTransport {
    let transport = make_transport(Duration::from_secs(5));
    transport
        .connect(&format!("{}/mcp", server.uri()))
        .await
        .expect("connect");
    transport
}

#[tokio::test]
async fn test_json_response_is_returned() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("Content-Type", "application/json"))
        .and(body_partial_json(json!({"method": "tools/list", "id": 1})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"tools": [{"name": "echo"}]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let transport = connected(&server).await;
    let codec = ProtocolCodec::new();
    let mut request = codec.build_request("tools/list", None, None);
    let reply = transport
        .send(&mut request)
        .await
        .expect("send succeeds")
        .expect("requests get replies");

    let response = reply.response().expect("decoded as response");
    assert_eq!(response.id, RequestId::Number(1));
    assert_eq!(response.result().unwrap()["tools"][0]["name"], "echo");

    let info = transport.connection_info();
    assert_eq!(info.metrics.request_count, 1);
    assert!(info.metrics.bytes_sent > 0);
    assert!(info.metrics.bytes_received > 0);
    assert!(info.last_activity.is_some());
}

#[tokio::test]
async fn test_event_stream_reply_and_preceding_notification() {
    let server = MockServer::start().await;
    let body = concat!(
        "event: message\n",
        "data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\",\"params\":{\"progress\":1}}\n\n",
        "event: message\n",
        "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"ok\":true}}\n\n",
    );
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream"),
        )
        .mount(&server)
        .await;

    let transport = connected(&server).await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = transport.on(Box::new(move |event| {
        if let TransportEvent::Notification { message } = event {
            sink.lock().unwrap().push(message.method().unwrap_or_default().to_string());
        }
    }));

    let codec = ProtocolCodec::new();
    let mut request = codec.build_request("tools/call", Some(json!({"name": "slow"})), None);
    let reply = transport.send(&mut request).await.unwrap().unwrap();

    assert_eq!(reply.response().unwrap().result().unwrap()["ok"], true);
    assert_eq!(*seen.lock().unwrap(), vec!["notifications/progress".to_string()]);
}

#[tokio::test]
async fn test_accepted_notification_has_no_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let transport = connected(&server).await;
    let codec = ProtocolCodec::new();
    let mut note = codec.build_notification("notifications/initialized", None);
    assert!(transport.send(&mut note).await.unwrap().is_none());
}

#[tokio::test]
async fn test_session_id_is_captured_replayed_and_released() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "initialize"})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("MCP-Session-Id", "sess-42")
                .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": {}})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("MCP-Session-Id", "sess-42"))
        .and(body_partial_json(json!({"method": "ping"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 2, "result": {}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(header("MCP-Session-Id", "sess-42"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let transport = connected(&server).await;
    let codec = ProtocolCodec::new();
    let mut init = codec.build_request("initialize", Some(json!({})), None);
    transport.send(&mut init).await.unwrap();
    assert_eq!(transport.session_id().as_deref(), Some("sess-42"));

    let mut ping = codec.build_request("ping", None, None);
    transport.send(&mut ping).await.unwrap();

    transport.disconnect().await.unwrap();
    assert!(transport.session_id().is_none());
    assert_eq!(transport.connection_info().state, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_json_rpc_error_on_failing_status_is_still_an_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32602, "message": "Invalid params"}
        })))
        .mount(&server)
        .await;

    let transport = connected(&server).await;
    let codec = ProtocolCodec::new();
    let mut request = codec.build_request("tools/call", Some(json!({})), None);
    let reply = transport.send(&mut request).await.unwrap().unwrap();
    assert_eq!(reply.response().unwrap().error().unwrap().code, -32602);
}

#[tokio::test]
async fn test_server_error_status_fails_and_emits_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let transport = connected(&server).await;
    let errors = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&errors);
    let _sub = transport.on(Box::new(move |event| {
        if matches!(event, TransportEvent::Error { .. }) {
            *counter.lock().unwrap() += 1;
        }
    }));

    let codec = ProtocolCodec::new();
    let mut request = codec.build_request("ping", None, None);
    let err = transport.send(&mut request).await.unwrap_err();
    assert!(err.to_string().contains("500"));
    assert_eq!(*errors.lock().unwrap(), 1);
    assert_eq!(transport.connection_info().metrics.error_count, 1);
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(500))
                .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": {}})),
        )
        .mount(&server)
        .await;

    let transport = make_transport(Duration::from_millis(100));
    transport
        .connect(&format!("{}/mcp", server.uri()))
        .await
        .unwrap();
    let codec = ProtocolCodec::new();
    let mut request = codec.build_request("ping", None, None);
    let err = transport.send(&mut request).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ProbeError>(),
        Some(ProbeError::Timeout { .. })
    ));
}

#[tokio::test]
async fn test_garbage_body_becomes_parse_error_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
        .mount(&server)
        .await;

    let transport = connected(&server).await;
    let codec = ProtocolCodec::new();
    let mut request = codec.build_request("ping", None, None);
    let reply = transport.send(&mut request).await.unwrap().unwrap();
    let response = reply.response().unwrap();
    assert_eq!(response.error().unwrap().code, -32700);
    assert_eq!(response.id, RequestId::Null);
    assert!(!reply.is_valid());
    assert!(matches!(reply.message(), Message::Response(_)));
}
