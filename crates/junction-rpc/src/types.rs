//! JSON-RPC 2.0 wire-format types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RpcError;

/// Protocol version string carried in every envelope.
pub const VERSION: &str = "2.0";

/// Correlation identifier linking a request to its response(s).
///
/// The representation (integer, float, or string) is fixed when the
/// envelope is decoded; the accessors return `None` for the other
/// representations rather than coercing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Integer id, e.g. `"id": 1`.
    Int(i64),
    /// Floating-point id, e.g. `"id": 1.5`.
    Float(f64),
    /// String id, e.g. `"id": "req_1"`.
    Str(String),
}

impl RequestId {
    /// Integer value, if this id was decoded as an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float value, if this id was decoded as a float.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// String value, if this id was decoded as a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
        }
    }
}

/// Incoming request envelope.
///
/// `method` and `jsonrpc` default to the empty string so that a request
/// missing them still parses (matching the reference behavior); the
/// dispatch core rejects an empty method with `InvalidRequest`. An absent
/// `id` marks a notification, though this engine always answers anyway.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Request {
    /// Protocol version (`"2.0"`); not validated on input.
    #[serde(default)]
    pub jsonrpc: String,
    /// Method name; exact, case-sensitive lookup.
    #[serde(default)]
    pub method: String,
    /// Raw parameters, decoded by the method's codec.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Correlation id; `None` for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
}

impl Request {
    /// Build a request envelope.
    pub fn new(method: impl Into<String>, params: Option<Value>, id: Option<RequestId>) -> Self {
        Self {
            jsonrpc: VERSION.to_owned(),
            method: method.into(),
            params,
            id,
        }
    }

    /// Whether this request is a notification (no id).
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Outgoing response envelope.
///
/// Exactly one of `result` and `error` is present. The `id` is always
/// serialized, as `null` when the response is not attributable to a
/// request (parse errors). `stream` marks server-push frames belonging to
/// a long-lived streaming call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Response {
    /// Protocol version (`"2.0"`).
    pub jsonrpc: String,
    /// Encoded result; absent on error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error object; absent on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
    /// Echoed correlation id (`null` when unattributable).
    pub id: Option<RequestId>,
    /// `true` on stream acknowledgments and stream data frames.
    #[serde(default, skip_serializing_if = "is_false")]
    pub stream: bool,
}

fn is_false(v: &bool) -> bool {
    !*v
}

impl Response {
    /// Build a success response.
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: VERSION.to_owned(),
            result: Some(result),
            error: None,
            id,
            stream: false,
        }
    }

    /// Build an error response from an [`RpcError`].
    pub fn from_error(id: Option<RequestId>, err: &RpcError) -> Self {
        Self {
            jsonrpc: VERSION.to_owned(),
            result: None,
            error: Some(err.to_error_object()),
            id,
            stream: false,
        }
    }

    /// Acknowledgment emitted when a streaming call is established:
    /// `stream: true`, no result.
    pub fn stream_ack(id: Option<RequestId>) -> Self {
        Self {
            jsonrpc: VERSION.to_owned(),
            result: None,
            error: None,
            id,
            stream: true,
        }
    }

    /// A single pushed value on an established stream, reusing the
    /// original call's id.
    pub fn stream_item(id: Option<RequestId>, value: Value) -> Self {
        Self {
            jsonrpc: VERSION.to_owned(),
            result: Some(value),
            error: None,
            id,
            stream: true,
        }
    }

    /// Whether this response carries an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Structured error carried inside a response envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Numeric JSON-RPC error code (see [`crate::error`]).
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}
