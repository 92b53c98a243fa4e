//! JSON-RPC 2.0 message types.
//!
//! This module defines the envelope types shared by every transport. All
//! messages follow the JSON-RPC 2.0 specification.
//!
//! # Message Types
//!
//! - **Request**: carries an `id` and gets exactly one reply
//! - **Notification**: A one-way message (no `id`, never answered)
//! - **Batch**: A non-empty JSON array of requests and notifications
//! - **Reply**: A success ([`JsonRpcResponse`]) or error ([`JsonRpcError`])

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The newest MCP protocol version this implementation speaks.
pub const MCP_PROTOCOL_VERSION: &str = "2025-06-18";

/// Every protocol version accepted during negotiation, oldest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18"];

/// Name reported in `serverInfo` unless configured otherwise.
pub const SERVER_NAME: &str = "mcp-conductor";

/// Request identifier: integer, string or explicit `null`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID.
    Number(i64),
    /// String request ID.
    String(String),
    /// Explicit `null` ID.
    Null,
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => std::fmt::Display::fmt(n, f),
            Self::String(s) => f.write_str(s),
            Self::Null => f.write_str("null"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

/// A validated JSON-RPC 2.0 request or notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Must be "2.0".
    pub jsonrpc: String,

    /// Request identifier. `None` marks a notification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,

    /// The method to invoke.
    pub method: String,

    /// Optional parameters for the method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Returns `true` if no response is expected.
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Checks the envelope fields that deserialisation alone does not.
    ///
    /// Returns the first problem found.
    #[must_use]
    pub fn envelope_problem(&self) -> Option<&'static str> {
        if self.jsonrpc != "2.0" {
            Some("jsonrpc must be exactly \"2.0\"")
        } else if self.method.is_empty() {
            Some("method must be a non-empty string")
        } else if matches!(&self.params, Some(p) if !(p.is_object() || p.is_array() || p.is_null())) {
            Some("params must be an object or an array")
        } else {
            None
        }
    }
}

/// Reply carrying a method result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always "2.0".
    pub jsonrpc: String,

    /// ID of the answered request.
    pub id: RequestId,

    /// Method output.
    pub result: Value,
}

impl JsonRpcResponse {
    /// Success reply for `id`.
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result,
        }
    }
}

/// Error codes: the five reserved by JSON-RPC 2.0 plus server-defined ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// The payload is not JSON, or not an object or array.
    ParseError,
    /// The envelope is malformed, or the session refuses the method.
    InvalidRequest,
    /// The method (or tool, resource, prompt) does not exist.
    MethodNotFound,
    /// Invalid method parameters, including failed argument validation.
    InvalidParams,
    /// Internal JSON-RPC error, including unimplemented handlers.
    InternalError,
    /// Server-defined error.
    ServerError(i32),
}

impl ErrorCode {
    /// No async operation with the requested identifier.
    pub const OPERATION_NOT_FOUND: Self = Self::ServerError(-32001);
    /// The async operation has not completed yet.
    pub const OPERATION_NOT_COMPLETED: Self = Self::ServerError(-32002);
    /// The async operation is already in a terminal state.
    pub const OPERATION_TERMINAL: Self = Self::ServerError(-32003);

    const fn parts(self) -> (i32, &'static str) {
        match self {
            Self::ParseError => (-32700, "Parse error"),
            Self::InvalidRequest => (-32600, "Invalid Request"),
            Self::MethodNotFound => (-32601, "Method not found"),
            Self::InvalidParams => (-32602, "Invalid params"),
            Self::InternalError => (-32603, "Internal error"),
            Self::ServerError(code) => (code, "Server error"),
        }
    }

    /// Numeric wire code.
    #[must_use]
    pub const fn code(self) -> i32 {
        self.parts().0
    }

    /// Message used when the caller supplies none.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        self.parts().1
    }
}

/// The `error` member of an error reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorData {
    /// Wire code.
    pub code: i32,

    /// One-line description.
    pub message: String,

    /// Structured detail, such as per-field validation errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorData {
    /// An error carrying the code's default message.
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self::with_message(code, code.default_message())
    }

    /// An error with its own message.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Attaches structured detail.
    #[must_use]
    pub fn with_data(self, data: Value) -> Self {
        Self {
            data: Some(data),
            ..self
        }
    }
}

/// Reply carrying an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Always "2.0".
    pub jsonrpc: String,

    /// The request ID this error corresponds to, `null` if unknown.
    pub id: Option<RequestId>,

    /// The error details.
    pub error: JsonRpcErrorData,
}

impl JsonRpcError {
    /// Wraps `error` in a reply envelope.
    #[must_use]
    pub fn new(id: Option<RequestId>, error: JsonRpcErrorData) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            error,
        }
    }

    /// Reply for text that is not JSON. The `id` is always `null`.
    #[must_use]
    pub fn parse_error() -> Self {
        Self::new(None, JsonRpcErrorData::from_code(ErrorCode::ParseError))
    }

    /// Reply for a malformed envelope, with `detail` as error data.
    #[must_use]
    pub fn invalid_request(id: Option<RequestId>, detail: &str) -> Self {
        Self::new(
            id,
            JsonRpcErrorData::from_code(ErrorCode::InvalidRequest).with_data(Value::from(detail)),
        )
    }
}

/// Either kind of reply, serialised without a wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcReply {
    /// Error reply.
    Error(JsonRpcError),
    /// Success reply.
    Success(JsonRpcResponse),
}

impl JsonRpcReply {
    /// The ID the reply answers.
    #[must_use]
    pub const fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Success(resp) => Some(&resp.id),
            Self::Error(err) => err.id.as_ref(),
        }
    }

    /// The error code, if this is an error reply.
    #[must_use]
    pub const fn error_code(&self) -> Option<i32> {
        match self {
            Self::Success(_) => None,
            Self::Error(err) => Some(err.error.code),
        }
    }

    /// The result value, if this is a success reply.
    #[must_use]
    pub const fn result(&self) -> Option<&Value> {
        match self {
            Self::Success(resp) => Some(&resp.result),
            Self::Error(_) => None,
        }
    }
}

impl From<JsonRpcResponse> for JsonRpcReply {
    fn from(response: JsonRpcResponse) -> Self {
        Self::Success(response)
    }
}

impl From<JsonRpcError> for JsonRpcReply {
    fn from(error: JsonRpcError) -> Self {
        Self::Error(error)
    }
}

/// The top-level shape of an incoming payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A single request object.
    Single(Value),
    /// A batch of request objects.
    Batch(Vec<Value>),
}

/// Parses raw text into a single request or a batch.
///
/// # Errors
///
/// Returns a parse error if the text is not JSON, or is JSON but neither an
/// object nor an array.
pub fn parse_payload(json: &str) -> Result<Payload, JsonRpcError> {
    serde_json::from_str::<Value>(json)
        .map_err(|_| JsonRpcError::parse_error())
        .and_then(classify_payload)
}

/// Classifies an already-decoded JSON value.
///
/// # Errors
///
/// Returns a parse error if the value is neither an object nor an array.
pub fn classify_payload(value: Value) -> Result<Payload, JsonRpcError> {
    match value {
        Value::Array(items) => Ok(Payload::Batch(items)),
        object @ Value::Object(_) => Ok(Payload::Single(object)),
        _ => Err(JsonRpcError::parse_error()),
    }
}

/// Validates one batch element or single payload as a request envelope.
///
/// The `id` is recovered first so that envelope errors can still be
/// addressed to the caller.
///
/// # Errors
///
/// Returns an invalid request error if the envelope is malformed.
pub fn parse_request(value: Value) -> Result<JsonRpcRequest, JsonRpcError> {
    let Some(obj) = value.as_object() else {
        return Err(JsonRpcError::invalid_request(
            None,
            "request must be a JSON object",
        ));
    };

    let id = match obj.get("id") {
        None => None,
        Some(raw) => Some(
            serde_json::from_value::<RequestId>(raw.clone()).map_err(|_| {
                JsonRpcError::invalid_request(None, "id must be a string, integer or null")
            })?,
        ),
    };

    if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return Err(JsonRpcError::invalid_request(
            id,
            "missing or invalid jsonrpc version",
        ));
    }

    let Some(method) = obj.get("method").and_then(Value::as_str) else {
        return Err(JsonRpcError::invalid_request(id, "missing or invalid method"));
    };

    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        id,
        method: method.to_string(),
        params: obj.get("params").cloned(),
    };

    if let Some(problem) = request.envelope_problem() {
        return Err(JsonRpcError::invalid_request(request.id, problem));
    }

    Ok(request)
}
