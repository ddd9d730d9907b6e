//! JSON-RPC 2.0 wire types for MCP traffic
//!
//! This module defines the message shapes exchanged with an MCP server and
//! the reserved error-code registry. A [`Message`] is an explicit tagged
//! union decided once at construction or decode time; nothing downstream
//! re-infers the kind from which fields happen to be present.
//!
//! Optional fields omit their key from JSON when `None` via
//! `#[serde(skip_serializing_if = "Option::is_none")]`. A notification has
//! no `id` field at all, and a response carries exactly one of `result` or
//! `error`.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// JSON-RPC protocol tag carried on every message.
pub const JSONRPC_VERSION: &str = "2.0";

// ---------------------------------------------------------------------------
// JSON-RPC method constants
// ---------------------------------------------------------------------------

/// Lifecycle: client sends `initialize` to open a session.
pub const METHOD_INITIALIZE: &str = "initialize";
/// Lifecycle: client sends `notifications/initialized` after the server ACKs.
pub const METHOD_INITIALIZED: &str = "notifications/initialized";
/// Keepalive ping.
pub const METHOD_PING: &str = "ping";
/// Request a page of available tools.
pub const METHOD_TOOLS_LIST: &str = "tools/list";
/// Invoke a named tool.
pub const METHOD_TOOLS_CALL: &str = "tools/call";
/// Request a page of available resources.
pub const METHOD_RESOURCES_LIST: &str = "resources/list";
/// Read the contents of a resource by URI.
pub const METHOD_RESOURCES_READ: &str = "resources/read";
/// Request a page of available prompts.
pub const METHOD_PROMPTS_LIST: &str = "prompts/list";
/// Retrieve a rendered prompt by name.
pub const METHOD_PROMPTS_GET: &str = "prompts/get";

// ---------------------------------------------------------------------------
// Error code registry
// ---------------------------------------------------------------------------

/// Invalid JSON was received.
pub const PARSE_ERROR: i64 = -32700;
/// The JSON sent is not a valid request object.
pub const INVALID_REQUEST: i64 = -32600;
/// The method does not exist or is not available.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid method parameters.
pub const INVALID_PARAMS: i64 = -32602;
/// Internal JSON-RPC error.
pub const INTERNAL_ERROR: i64 = -32603;
/// Server range: the connection closed before a reply arrived.
pub const CONNECTION_CLOSED: i64 = -32000;
/// Server range: the server gave up waiting on the request.
pub const REQUEST_TIMEOUT: i64 = -32001;
/// Server range: the referenced resource does not exist.
pub const RESOURCE_NOT_FOUND: i64 = -32002;

/// Label and description for a reserved error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCodeInfo {
    /// Reserved numeric code
    pub code: i64,
    /// Short human label
    pub label: &'static str,
    /// One-line explanation
    pub description: &'static str,
}

/// Every reserved code known to the codec.
pub const ERROR_CODES: &[ErrorCodeInfo] = &[
    ErrorCodeInfo {
        code: PARSE_ERROR,
        label: "Parse Error",
        description: "Invalid JSON was received by the server",
    },
    ErrorCodeInfo {
        code: INVALID_REQUEST,
        label: "Invalid Request",
        description: "The JSON sent is not a valid Request object",
    },
    ErrorCodeInfo {
        code: METHOD_NOT_FOUND,
        label: "Method Not Found",
        description: "The method does not exist or is not available",
    },
    ErrorCodeInfo {
        code: INVALID_PARAMS,
        label: "Invalid Params",
        description: "Invalid method parameter(s)",
    },
    ErrorCodeInfo {
        code: INTERNAL_ERROR,
        label: "Internal Error",
        description: "Internal JSON-RPC error",
    },
    ErrorCodeInfo {
        code: CONNECTION_CLOSED,
        label: "Connection Closed",
        description: "The connection was closed before the request completed",
    },
    ErrorCodeInfo {
        code: REQUEST_TIMEOUT,
        label: "Request Timeout",
        description: "The request did not complete within the server deadline",
    },
    ErrorCodeInfo {
        code: RESOURCE_NOT_FOUND,
        label: "Resource Not Found",
        description: "The requested resource does not exist",
    },
];

/// Look up a reserved code in the registry.
pub fn error_code_info(code: i64) -> Option<&'static ErrorCodeInfo> {
    ERROR_CODES.iter().find(|info| info.code == code)
}

/// Human label for an error code; unknown codes read `Server Error (code)`.
///
/// # Examples
///
/// ```
/// use mcp_probe::mcp::types::format_error_code;
///
/// assert_eq!(format_error_code(-32601), "Method Not Found");
/// assert_eq!(format_error_code(-31999), "Server Error (-31999)");
/// ```
pub fn format_error_code(code: i64) -> String {
    match error_code_info(code) {
        Some(info) => info.label.to_string(),
        None => format!("Server Error ({})", code),
    }
}

// ---------------------------------------------------------------------------
// JSON-RPC 2.0 wire types
// ---------------------------------------------------------------------------

/// A JSON-RPC request identifier: string, integer, or `null`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Integer identifier (the codec's own sequence uses these)
    Number(i64),
    /// String identifier
    String(String),
    /// Explicit `null`, used by synthesized parse-error responses
    Null,
}

impl RequestId {
    /// Decode an id from an arbitrary JSON value, if it has a legal id type.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(RequestId::Null),
            Value::String(s) => Some(RequestId::String(s.clone())),
            Value::Number(n) => n.as_i64().map(RequestId::Number),
            _ => None,
        }
    }

    /// JSON form of this id.
    pub fn to_value(&self) -> Value {
        match self {
            RequestId::Number(n) => Value::from(*n),
            RequestId::String(s) => Value::String(s.clone()),
            RequestId::Null => Value::Null,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => write!(f, "{}", s),
            RequestId::Null => write!(f, "null"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        RequestId::Number(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        RequestId::String(value.to_string())
    }
}

/// A JSON-RPC 2.0 request object.
///
/// # Examples
///
/// ```
/// use mcp_probe::mcp::types::{JsonRpcRequest, RequestId};
///
/// let req = JsonRpcRequest::new("ping", None, RequestId::Number(1));
/// assert_eq!(req.jsonrpc, "2.0");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version identifier; always `"2.0"`.
    pub jsonrpc: String,
    /// The method name to invoke.
    pub method: String,
    /// Optional method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Request correlation identifier.
    pub id: RequestId,
}

impl JsonRpcRequest {
    /// Build a request with the protocol tag filled in.
    pub fn new(method: impl Into<String>, params: Option<Value>, id: RequestId) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id,
        }
    }
}

/// A JSON-RPC 2.0 notification. It never carries an `id` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Protocol version identifier; always `"2.0"`.
    pub jsonrpc: String,
    /// The notification method name.
    pub method: String,
    /// Optional notification parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Build a notification with the protocol tag filled in.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 error object.
///
/// Implements `Display` as `"JSON-RPC error {code}: {message}"`.
///
/// # Examples
///
/// ```
/// use mcp_probe::mcp::types::JsonRpcError;
///
/// let e = JsonRpcError { code: -32600, message: "Invalid Request".to_string(), data: None };
/// assert_eq!(e.to_string(), "JSON-RPC error -32600: Invalid Request");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code as defined by JSON-RPC 2.0 or MCP.
    pub code: i64,
    /// Human-readable error description.
    pub message: String,
    /// Optional additional error context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Build an error object for a registry code, using its label as message.
    pub fn from_code(code: i64, data: Option<Value>) -> Self {
        Self {
            code,
            message: format_error_code(code),
            data,
        }
    }

    /// Registry label for this error's code.
    pub fn label(&self) -> String {
        format_error_code(self.code)
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

/// The outcome half of a response: a result or an error, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    /// Successful result value (may itself be JSON `null`)
    Result(Value),
    /// Error object
    Error(JsonRpcError),
}

/// A JSON-RPC 2.0 response object.
///
/// Serializes as `{"jsonrpc", "result" | "error", "id"}`.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcResponse {
    /// Protocol version identifier; always `"2.0"`.
    pub jsonrpc: String,
    /// Mirrors the `id` from the corresponding request.
    pub id: RequestId,
    /// Result or error.
    pub payload: ResponsePayload,
}

impl JsonRpcResponse {
    /// Create a success response.
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            payload: ResponsePayload::Result(result),
        }
    }

    /// Create an error response.
    pub fn failure(id: RequestId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            payload: ResponsePayload::Error(error),
        }
    }

    /// Successful result, if any.
    pub fn result(&self) -> Option<&Value> {
        match &self.payload {
            ResponsePayload::Result(v) => Some(v),
            ResponsePayload::Error(_) => None,
        }
    }

    /// Error object, if any.
    pub fn error(&self) -> Option<&JsonRpcError> {
        match &self.payload {
            ResponsePayload::Result(_) => None,
            ResponsePayload::Error(e) => Some(e),
        }
    }

    /// True exactly when the response carries an error object.
    pub fn is_error(&self) -> bool {
        matches!(self.payload, ResponsePayload::Error(_))
    }
}

impl Serialize for JsonRpcResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("jsonrpc", &self.jsonrpc)?;
        match &self.payload {
            ResponsePayload::Result(result) => map.serialize_entry("result", result)?,
            ResponsePayload::Error(error) => map.serialize_entry("error", error)?,
        }
        map.serialize_entry("id", &self.id)?;
        map.end()
    }
}

/// Any JSON-RPC message, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Message {
    /// A request expecting a response
    Request(JsonRpcRequest),
    /// A fire-and-forget notification
    Notification(JsonRpcNotification),
    /// A response to an earlier request
    Response(JsonRpcResponse),
}

/// Discriminant of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Request
    Request,
    /// Notification
    Notification,
    /// Response
    Response,
}

impl Message {
    /// Which variant this message is.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Request(_) => MessageKind::Request,
            Message::Notification(_) => MessageKind::Notification,
            Message::Response(_) => MessageKind::Response,
        }
    }

    /// Method name for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            Message::Request(r) => Some(&r.method),
            Message::Notification(n) => Some(&n.method),
            Message::Response(_) => None,
        }
    }

    /// Correlation id for requests and responses.
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Message::Request(r) => Some(&r.id),
            Message::Notification(_) => None,
            Message::Response(r) => Some(&r.id),
        }
    }

    /// Parameters for requests and notifications.
    pub fn params(&self) -> Option<&Value> {
        match self {
            Message::Request(r) => r.params.as_ref(),
            Message::Notification(n) => n.params.as_ref(),
            Message::Response(_) => None,
        }
    }

    /// Borrow the response variant.
    pub fn as_response(&self) -> Option<&JsonRpcResponse> {
        match self {
            Message::Response(r) => Some(r),
            _ => None,
        }
    }

    /// JSON document form of the message.
    pub fn to_value(&self) -> Value {
        // Serializing these types into a Value cannot fail: every map key is a string.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serializes_without_params_when_none() {
        let req = JsonRpcRequest::new("ping", None, RequestId::Number(7));
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value, json!({"jsonrpc": "2.0", "method": "ping", "id": 7}));
    }

    #[test]
    fn test_notification_never_has_id() {
        let n = JsonRpcNotification::new(METHOD_INITIALIZED, Some(json!({})));
        let value = serde_json::to_value(Message::Notification(n)).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(value["method"], "notifications/initialized");
    }

    #[test]
    fn test_response_serializes_exactly_one_payload_key() {
        let ok = JsonRpcResponse::success(RequestId::Number(1), json!({"a": 1}));
        let value = serde_json::to_value(&ok).unwrap();
        assert!(value.get("result").is_some());
        assert!(value.get("error").is_none());

        let err = JsonRpcResponse::failure(
            RequestId::Null,
            JsonRpcError::from_code(PARSE_ERROR, None),
        );
        let value = serde_json::to_value(&err).unwrap();
        assert!(value.get("result").is_none());
        assert_eq!(value["error"]["code"], -32700);
        assert!(value["id"].is_null());
    }

    #[test]
    fn test_null_result_is_preserved() {
        let ok = JsonRpcResponse::success(RequestId::Number(1), Value::Null);
        let value = serde_json::to_value(&ok).unwrap();
        assert!(value.as_object().unwrap().contains_key("result"));
    }

    #[test]
    fn test_is_error_matches_payload() {
        let ok = JsonRpcResponse::success(RequestId::Number(1), json!({}));
        assert!(!ok.is_error());
        assert!(ok.result().is_some());
        let err = JsonRpcResponse::failure(
            RequestId::Number(1),
            JsonRpcError::from_code(INTERNAL_ERROR, None),
        );
        assert!(err.is_error());
        assert!(err.result().is_none());
    }

    #[test]
    fn test_request_id_untagged_forms() {
        assert_eq!(serde_json::to_value(RequestId::Number(3)).unwrap(), json!(3));
        assert_eq!(
            serde_json::to_value(RequestId::String("a".into())).unwrap(),
            json!("a")
        );
        assert_eq!(serde_json::to_value(RequestId::Null).unwrap(), Value::Null);
        assert_eq!(RequestId::from_value(&json!(true)), None);
        assert_eq!(RequestId::from_value(&json!(1.5)), None);
    }

    #[test]
    fn test_registry_lookup_and_fallback() {
        assert_eq!(format_error_code(PARSE_ERROR), "Parse Error");
        assert_eq!(format_error_code(REQUEST_TIMEOUT), "Request Timeout");
        assert_eq!(format_error_code(-32099), "Server Error (-32099)");
        assert_eq!(format_error_code(42), "Server Error (42)");
        let server_range = ERROR_CODES
            .iter()
            .filter(|info| (-32099..=-32000).contains(&info.code))
            .count();
        assert_eq!(server_range, 3);
    }

    #[test]
    fn test_json_rpc_error_display() {
        let e = JsonRpcError {
            code: -32601,
            message: "Method not found: nope".to_string(),
            data: None,
        };
        assert_eq!(e.to_string(), "JSON-RPC error -32601: Method not found: nope");
        assert_eq!(e.label(), "Method Not Found");
    }
}
