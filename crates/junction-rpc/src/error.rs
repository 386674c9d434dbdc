//! JSON-RPC error codes and the engine error type.

use serde_json::Value;

use crate::types::ErrorObject;

// ── Error code constants ────────────────────────────────────────────

/// Invalid JSON was received.
pub const PARSE_ERROR: i64 = -32700;
/// The payload is not a valid request object.
pub const INVALID_REQUEST: i64 = -32600;
/// The method does not exist.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid method parameters.
pub const INVALID_PARAMS: i64 = -32602;
/// Internal JSON-RPC error; the default for handler failures.
pub const INTERNAL_ERROR: i64 = -32603;
/// Start of the implementation-defined server error range.
pub const SERVER_ERROR_START: i64 = -32099;
/// End of the implementation-defined server error range.
pub const SERVER_ERROR_END: i64 = -32000;

/// Error produced by decode, handler, or encode stages.
///
/// Every variant maps to exactly one response-level error object; none
/// of them abort batch processing of sibling requests.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The payload could not be parsed as JSON.
    #[error("{message}")]
    Parse {
        /// Description of the parse failure.
        message: String,
    },

    /// The envelope is structurally invalid (e.g. empty method name).
    #[error("{message}")]
    InvalidRequest {
        /// Description of what is wrong.
        message: String,
    },

    /// No codec is registered for the method.
    #[error("{message}")]
    MethodNotFound {
        /// Description including the method name.
        message: String,
    },

    /// Parameters failed to decode.
    #[error("{message}")]
    InvalidParams {
        /// Description of what is wrong.
        message: String,
    },

    /// Handler or encode failure without an application code.
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },

    /// Application-defined error with its own code and optional data.
    #[error("{message}")]
    Custom {
        /// Application error code (typically in the server error range).
        code: i64,
        /// Human-readable message.
        message: String,
        /// Optional structured details.
        data: Option<Value>,
    },
}

impl RpcError {
    /// Parse error with the given message.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse { message: message.into() }
    }

    /// Method-not-found error naming the method.
    pub fn method_not_found(method: &str) -> Self {
        Self::MethodNotFound {
            message: format!("Method {method} was not found."),
        }
    }

    /// Invalid-params error with the given message.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams { message: message.into() }
    }

    /// Internal error with the given message.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Numeric JSON-RPC error code for this variant.
    pub fn code(&self) -> i64 {
        match self {
            Self::Parse { .. } => PARSE_ERROR,
            Self::InvalidRequest { .. } => INVALID_REQUEST,
            Self::MethodNotFound { .. } => METHOD_NOT_FOUND,
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::Internal { .. } => INTERNAL_ERROR,
            Self::Custom { code, .. } => *code,
        }
    }

    /// Structured details, if the error carries any.
    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Custom { data, .. } => data.as_ref(),
            _ => None,
        }
    }

    /// Convert to the wire-format error object.
    pub fn to_error_object(&self) -> ErrorObject {
        ErrorObject {
            code: self.code(),
            message: self.to_string(),
            data: self.data().cloned(),
        }
    }
}
