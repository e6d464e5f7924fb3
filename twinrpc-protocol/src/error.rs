//! Protocol error types and the JSON-RPC error taxonomy.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

/// Framing and serialization errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reserved JSON-RPC error codes.
///
/// These codes are part of the wire contract and must remain stable.
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    /// Lower bound of the implementation-defined server error band.
    pub const SERVER_ERROR_MIN: i64 = -32099;
    /// Upper bound of the implementation-defined server error band.
    pub const SERVER_ERROR_MAX: i64 = -32000;

    /// Returns whether `code` lies in the server error band.
    pub fn is_server_error(code: i64) -> bool {
        (SERVER_ERROR_MIN..=SERVER_ERROR_MAX).contains(&code)
    }
}

/// Category of an [`RpcError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ServerError,
    ApplicationError,
    /// A malformed response from the peer. Never sent on the wire as-is.
    InvalidResponse,
}

impl ErrorKind {
    /// Classifies a wire code.
    pub fn from_code(code: i64) -> Self {
        match code {
            codes::PARSE_ERROR => ErrorKind::ParseError,
            codes::INVALID_REQUEST => ErrorKind::InvalidRequest,
            codes::METHOD_NOT_FOUND => ErrorKind::MethodNotFound,
            codes::INVALID_PARAMS => ErrorKind::InvalidParams,
            codes::INTERNAL_ERROR => ErrorKind::InternalError,
            c if codes::is_server_error(c) => ErrorKind::ServerError,
            _ => ErrorKind::ApplicationError,
        }
    }

    /// Returns the default message for reserved kinds.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorKind::ParseError => "Parse error",
            ErrorKind::InvalidRequest => "Invalid Request",
            ErrorKind::MethodNotFound => "Method not found",
            ErrorKind::InvalidParams => "Invalid params",
            ErrorKind::InternalError => "Internal error",
            ErrorKind::ServerError => "Server error",
            ErrorKind::ApplicationError => "Application error",
            ErrorKind::InvalidResponse => "Invalid response",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_message())
    }
}

/// Error object as carried in the `error` member of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Error code.
    pub code: i64,

    /// Human-readable error message.
    pub message: String,

    /// Additional structured error details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// A JSON-RPC error.
///
/// Every variant except `InvalidResponse` maps one-to-one onto a wire error
/// object; `InvalidResponse` is raised locally when a peer's response cannot
/// be reconstructed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RpcError {
    #[error("parse error: {0}")]
    ParseError(ErrorObject),

    #[error("invalid request: {0}")]
    InvalidRequest(ErrorObject),

    #[error("method not found: {0}")]
    MethodNotFound(ErrorObject),

    #[error("invalid params: {0}")]
    InvalidParams(ErrorObject),

    #[error("internal error: {0}")]
    InternalError(ErrorObject),

    #[error("server error: {0}")]
    ServerError(ErrorObject),

    #[error("application error: {0}")]
    ApplicationError(ErrorObject),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl RpcError {
    /// Creates an error from a code and message; the kind follows the code.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self::from_object(ErrorObject::new(code, message))
    }

    fn reserved(code: i64) -> Self {
        Self::new(code, ErrorKind::from_code(code).default_message())
    }

    pub fn parse_error() -> Self {
        Self::reserved(codes::PARSE_ERROR)
    }

    pub fn invalid_request() -> Self {
        Self::reserved(codes::INVALID_REQUEST)
    }

    pub fn method_not_found() -> Self {
        Self::reserved(codes::METHOD_NOT_FOUND)
    }

    pub fn invalid_params() -> Self {
        Self::reserved(codes::INVALID_PARAMS)
    }

    pub fn internal_error() -> Self {
        Self::reserved(codes::INTERNAL_ERROR)
    }

    pub fn invalid_response(reason: impl Into<String>) -> Self {
        RpcError::InvalidResponse(reason.into())
    }

    /// Attaches structured data. No-op for `InvalidResponse`.
    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        if let Some(object) = self.object_mut() {
            object.data = Some(data.into());
        }
        self
    }

    /// Builds the matching kind for a wire error object.
    pub fn from_object(object: ErrorObject) -> Self {
        match ErrorKind::from_code(object.code) {
            ErrorKind::ParseError => RpcError::ParseError(object),
            ErrorKind::InvalidRequest => RpcError::InvalidRequest(object),
            ErrorKind::MethodNotFound => RpcError::MethodNotFound(object),
            ErrorKind::InvalidParams => RpcError::InvalidParams(object),
            ErrorKind::InternalError => RpcError::InternalError(object),
            ErrorKind::ServerError => RpcError::ServerError(object),
            _ => RpcError::ApplicationError(object),
        }
    }

    /// Reconstructs an error from the raw `error` member of a response.
    ///
    /// Integer-valued string codes are accepted. Anything else that is not a
    /// well-formed error object fails with `InvalidResponse`.
    pub fn from_wire(value: &Value) -> Result<Self, RpcError> {
        let map = value
            .as_object()
            .ok_or_else(|| RpcError::invalid_response("error member is not an object"))?;

        let code = match map.get("code") {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
            Some(_) => None,
            None => return Err(RpcError::invalid_response("error object has no code")),
        }
        .ok_or_else(|| RpcError::invalid_response("error code is not an integer"))?;

        let message = match map.get("message") {
            Some(Value::String(s)) => s.clone(),
            Some(_) => return Err(RpcError::invalid_response("error message is not a string")),
            None => return Err(RpcError::invalid_response("error object has no message")),
        };

        Ok(Self::from_object(ErrorObject {
            code,
            message,
            data: map.get("data").cloned(),
        }))
    }

    /// Returns the error category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RpcError::ParseError(_) => ErrorKind::ParseError,
            RpcError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            RpcError::MethodNotFound(_) => ErrorKind::MethodNotFound,
            RpcError::InvalidParams(_) => ErrorKind::InvalidParams,
            RpcError::InternalError(_) => ErrorKind::InternalError,
            RpcError::ServerError(_) => ErrorKind::ServerError,
            RpcError::ApplicationError(_) => ErrorKind::ApplicationError,
            RpcError::InvalidResponse(_) => ErrorKind::InvalidResponse,
        }
    }

    /// Returns the wire error object, if this error has one.
    pub fn object(&self) -> Option<&ErrorObject> {
        match self {
            RpcError::ParseError(o)
            | RpcError::InvalidRequest(o)
            | RpcError::MethodNotFound(o)
            | RpcError::InvalidParams(o)
            | RpcError::InternalError(o)
            | RpcError::ServerError(o)
            | RpcError::ApplicationError(o) => Some(o),
            RpcError::InvalidResponse(_) => None,
        }
    }

    fn object_mut(&mut self) -> Option<&mut ErrorObject> {
        match self {
            RpcError::ParseError(o)
            | RpcError::InvalidRequest(o)
            | RpcError::MethodNotFound(o)
            | RpcError::InvalidParams(o)
            | RpcError::InternalError(o)
            | RpcError::ServerError(o)
            | RpcError::ApplicationError(o) => Some(o),
            RpcError::InvalidResponse(_) => None,
        }
    }

    /// Returns the code this error is sent with.
    pub fn code(&self) -> i64 {
        self.object().map_or(codes::INTERNAL_ERROR, |o| o.code)
    }

    /// Returns the structured data, if any.
    pub fn data(&self) -> Option<&Value> {
        self.object().and_then(|o| o.data.as_ref())
    }

    /// Converts into the object placed on the wire.
    ///
    /// `InvalidResponse` is local-only and goes out as an `InternalError`.
    pub fn to_object(&self) -> ErrorObject {
        match self {
            RpcError::InvalidResponse(reason) => {
                ErrorObject::new(codes::INTERNAL_ERROR, ErrorKind::InternalError.default_message())
                    .with_data(json!({
                        "exception": "InvalidResponse",
                        "message": reason,
                    }))
            }
            other => other
                .object()
                .cloned()
                .unwrap_or_else(|| ErrorObject::new(codes::INTERNAL_ERROR, "Internal error")),
        }
    }
}

impl From<ErrorObject> for RpcError {
    fn from(object: ErrorObject) -> Self {
        Self::from_object(object)
    }
}
