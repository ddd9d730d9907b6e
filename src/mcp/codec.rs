//! Message construction, validation, serialization, and decoding
//!
//! [`ProtocolCodec`] owns the one piece of mutable codec state: the request
//! id sequence. Every codec instance has its own counter, so independent
//! testers in one process never hand out colliding ids.
//!
//! The free functions in this module are stateless:
//!
//! - [`validate_request`] / [`validate_response`] return a list of
//!   human-readable violations and never fail.
//! - [`serialize`] renders a [`MessageRecord`] to canonical wire text and
//!   moves it to [`RecordState::Serialized`].
//! - [`parse_response`], [`parse_message`], and [`parse_batch_response`]
//!   never fail either: undecodable input becomes a synthesized `-32700`
//!   error response with a `null` id, so every decode path yields an
//!   inspectable value.

use std::sync::atomic::{AtomicI64, Ordering};

use serde_json::{json, Value};

use crate::error::Result;
use crate::mcp::types::{
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, Message, RequestId,
    INTERNAL_ERROR, INVALID_REQUEST, JSONRPC_VERSION, PARSE_ERROR,
};

/// Lifecycle state of a [`MessageRecord`].
///
/// `Constructing -> Serialized` happens through [`serialize`]; decoded
/// records start life as `Parsed`. Both `Serialized` and `Parsed` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Built in memory, not yet rendered to the wire
    Constructing,
    /// Rendered to wire text
    Serialized,
    /// Decoded from wire bytes
    Parsed,
}

/// A message together with its lifecycle state, wire text, and violations.
///
/// Records are created by the codec and mutated only by [`serialize`]. They
/// belong to one round trip and are not reused across unrelated exchanges.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    message: Message,
    state: RecordState,
    raw: Option<String>,
    validation_errors: Vec<String>,
}

impl MessageRecord {
    fn constructing(message: Message) -> Self {
        let validation_errors = validate_request(&message.to_value());
        Self {
            message,
            state: RecordState::Constructing,
            raw: None,
            validation_errors,
        }
    }

    fn parsed(message: Message, raw: String, validation_errors: Vec<String>) -> Self {
        Self {
            message,
            state: RecordState::Parsed,
            raw: Some(raw),
            validation_errors,
        }
    }

    /// The wrapped message.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RecordState {
        self.state
    }

    /// Wire text, once serialized or when decoded.
    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    /// Structural violations found when the record was built or decoded.
    pub fn validation_errors(&self) -> &[String] {
        &self.validation_errors
    }

    /// True when no structural violations were recorded.
    pub fn is_valid(&self) -> bool {
        self.validation_errors.is_empty()
    }

    /// The response variant, if this record wraps one.
    pub fn response(&self) -> Option<&JsonRpcResponse> {
        self.message.as_response()
    }

    /// JSON document form of the wrapped message.
    pub fn to_value(&self) -> Value {
        self.message.to_value()
    }

    /// Consume the record and return its message.
    pub fn into_message(self) -> Message {
        self.message
    }
}

/// Builds messages and hands out request ids.
///
/// # Examples
///
/// ```
/// use mcp_probe::mcp::codec::ProtocolCodec;
/// use mcp_probe::mcp::types::RequestId;
///
/// let codec = ProtocolCodec::new();
/// let first = codec.build_request("ping", None, None);
/// let second = codec.build_request("ping", None, None);
/// assert_eq!(first.message().id(), Some(&RequestId::Number(1)));
/// assert_eq!(second.message().id(), Some(&RequestId::Number(2)));
/// ```
#[derive(Debug)]
pub struct ProtocolCodec {
    next_id: AtomicI64,
}

impl Default for ProtocolCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolCodec {
    /// Create a codec whose id sequence starts at 1.
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
        }
    }

    /// Take the next id from this codec's strictly increasing sequence.
    pub fn next_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Restart the id sequence at 1.
    pub fn reset_ids(&self) {
        self.next_id.store(1, Ordering::SeqCst);
    }

    /// Build a request. When `id` is `None` the next sequence id is used.
    pub fn build_request(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
        id: Option<RequestId>,
    ) -> MessageRecord {
        let id = id.unwrap_or_else(|| self.next_id());
        MessageRecord::constructing(Message::Request(JsonRpcRequest::new(method, params, id)))
    }

    /// Build a notification. Notifications never carry an id.
    pub fn build_notification(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
    ) -> MessageRecord {
        MessageRecord::constructing(Message::Notification(JsonRpcNotification::new(
            method, params,
        )))
    }

    /// Build one request per `(method, params)` pair, each with a fresh id.
    pub fn build_batch<I, S>(&self, calls: I) -> Vec<MessageRecord>
    where
        I: IntoIterator<Item = (S, Option<Value>)>,
        S: Into<String>,
    {
        calls
            .into_iter()
            .map(|(method, params)| self.build_request(method, params, None))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

/// Render a record to canonical wire text and store the text on it.
///
/// Re-serializing overwrites the stored text with equivalent content.
/// Parsed records are terminal: their text is returned but the record is
/// left untouched.
pub fn serialize(record: &mut MessageRecord) -> Result<String> {
    let text = serde_json::to_string(&record.message)?;
    if record.state != RecordState::Parsed {
        record.raw = Some(text.clone());
        record.state = RecordState::Serialized;
    }
    Ok(text)
}

/// Serialize every record and join them into a JSON array.
pub fn serialize_batch(records: &mut [MessageRecord]) -> Result<String> {
    let mut parts = Vec::with_capacity(records.len());
    for record in records.iter_mut() {
        parts.push(serialize(record)?);
    }
    Ok(format!("[{}]", parts.join(",")))
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

fn decode(raw: &[u8]) -> std::result::Result<Value, String> {
    serde_json::from_slice(raw).map_err(|e| e.to_string())
}

fn parse_error_record(raw: String, detail: String) -> MessageRecord {
    tracing::warn!(detail = %detail, "synthesizing parse error for undecodable message");
    let error = JsonRpcError {
        code: PARSE_ERROR,
        message: "Parse error".to_string(),
        data: Some(json!({ "detail": detail })),
    };
    MessageRecord::parsed(
        Message::Response(JsonRpcResponse::failure(RequestId::Null, error)),
        raw,
        vec![format!("parse error: {}", detail)],
    )
}

fn response_from_value(value: Value, raw: String) -> MessageRecord {
    let Some(obj) = value.as_object() else {
        return parse_error_record(raw, "expected a JSON object".to_string());
    };
    let violations = validate_response(&value);
    let id = obj
        .get("id")
        .and_then(RequestId::from_value)
        .unwrap_or(RequestId::Null);

    let response = if let Some(error_val) = obj.get("error") {
        let error = serde_json::from_value::<JsonRpcError>(error_val.clone()).unwrap_or_else(|_| {
            JsonRpcError {
                code: INTERNAL_ERROR,
                message: format!("malformed error object: {}", error_val),
                data: None,
            }
        });
        JsonRpcResponse::failure(id, error)
    } else if let Some(result) = obj.get("result") {
        JsonRpcResponse::success(id, result.clone())
    } else {
        JsonRpcResponse::failure(
            id,
            JsonRpcError {
                code: INVALID_REQUEST,
                message: "response carries neither result nor error".to_string(),
                data: None,
            },
        )
    };

    MessageRecord::parsed(Message::Response(response), raw, violations)
}

/// Decode raw bytes as a response. Never fails.
///
/// # Examples
///
/// ```
/// use mcp_probe::mcp::codec::parse_response;
/// use mcp_probe::mcp::types::RequestId;
///
/// let record = parse_response("{not json");
/// let response = record.response().unwrap();
/// assert_eq!(response.error().unwrap().code, -32700);
/// assert_eq!(response.id, RequestId::Null);
/// ```
pub fn parse_response(raw: impl AsRef<[u8]>) -> MessageRecord {
    let bytes = raw.as_ref();
    let text = String::from_utf8_lossy(bytes).into_owned();
    match decode(bytes) {
        Ok(value) => response_from_value(value, text),
        Err(detail) => parse_error_record(text, detail),
    }
}

/// Decode raw bytes as any message kind. Never fails.
///
/// Objects with a `method` become requests (when an `id` key is present)
/// or notifications; everything else is treated as a response.
pub fn parse_message(raw: impl AsRef<[u8]>) -> MessageRecord {
    let bytes = raw.as_ref();
    let text = String::from_utf8_lossy(bytes).into_owned();
    let value = match decode(bytes) {
        Ok(value) => value,
        Err(detail) => return parse_error_record(text, detail),
    };

    let Some(method) = value.get("method") else {
        return response_from_value(value, text);
    };
    let violations = validate_request(&value);
    let method = method.as_str().unwrap_or_default().to_string();
    let params = value.get("params").cloned();
    let message = match value.get("id") {
        Some(id) => Message::Request(JsonRpcRequest::new(
            method,
            params,
            RequestId::from_value(id).unwrap_or(RequestId::Null),
        )),
        None => Message::Notification(JsonRpcNotification::new(method, params)),
    };
    MessageRecord::parsed(message, text, violations)
}

/// Decode a batch response. Never fails.
///
/// A top-level value that is not an array (or does not decode at all)
/// yields a single synthesized parse error in a one-element list.
pub fn parse_batch_response(raw: impl AsRef<[u8]>) -> Vec<MessageRecord> {
    let bytes = raw.as_ref();
    let text = String::from_utf8_lossy(bytes).into_owned();
    match decode(bytes) {
        Ok(Value::Array(items)) => items
            .into_iter()
            .map(|item| {
                let raw = item.to_string();
                response_from_value(item, raw)
            })
            .collect(),
        Ok(_) => vec![parse_error_record(
            text,
            "batch response must be a JSON array".to_string(),
        )],
        Err(detail) => vec![parse_error_record(text, detail)],
    }
}

// ---------------------------------------------------------------------------
// Structural validation
// ---------------------------------------------------------------------------

fn check_envelope(value: &Value, violations: &mut Vec<String>) -> bool {
    let Some(obj) = value.as_object() else {
        violations.push("message must be a JSON object".to_string());
        return false;
    };
    match obj.get("jsonrpc") {
        None => violations.push("missing jsonrpc field".to_string()),
        Some(Value::String(tag)) if tag == JSONRPC_VERSION => {}
        Some(_) => violations.push(format!("jsonrpc must be \"{}\"", JSONRPC_VERSION)),
    }
    if let Some(id) = obj.get("id") {
        if !matches!(id, Value::String(_) | Value::Number(_) | Value::Null) {
            violations.push("id must be a string, number, or null".to_string());
        }
    }
    true
}

/// Structural checks for a request or notification document.
///
/// # Examples
///
/// ```
/// use mcp_probe::mcp::codec::validate_request;
///
/// let violations = validate_request(&serde_json::json!({"jsonrpc": "2.0", "id": 1}));
/// assert!(violations.iter().any(|v| v.contains("method")));
/// ```
pub fn validate_request(value: &Value) -> Vec<String> {
    let mut violations = Vec::new();
    if !check_envelope(value, &mut violations) {
        return violations;
    }
    match value.get("method") {
        None => violations.push("missing method field".to_string()),
        Some(Value::String(m)) if m.trim().is_empty() => {
            violations.push("method must be a non-empty string".to_string())
        }
        Some(Value::String(_)) => {}
        Some(_) => violations.push("method must be a string".to_string()),
    }
    if let Some(params) = value.get("params") {
        if !params.is_object() && !params.is_array() {
            violations.push("params must be an object or array when present".to_string());
        }
    }
    violations
}

/// Structural checks for a response document.
pub fn validate_response(value: &Value) -> Vec<String> {
    let mut violations = Vec::new();
    if !check_envelope(value, &mut violations) {
        return violations;
    }
    if value.get("id").is_none() {
        violations.push("missing id field".to_string());
    }
    match (value.get("result"), value.get("error")) {
        (Some(_), Some(_)) => {
            violations.push("response must not contain both result and error".to_string())
        }
        (None, None) => violations.push("response must contain either result or error".to_string()),
        _ => {}
    }
    if let Some(error) = value.get("error") {
        match error.as_object() {
            None => violations.push("error must be an object".to_string()),
            Some(obj) => {
                if !obj.get("code").map(|c| c.is_i64()).unwrap_or(false) {
                    violations.push("error.code must be an integer".to_string());
                }
                if !obj.get("message").map(|m| m.is_string()).unwrap_or(false) {
                    violations.push("error.message must be a string".to_string());
                }
            }
        }
    }
    violations
}
