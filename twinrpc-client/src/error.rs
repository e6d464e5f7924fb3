//! Client error types.

use thiserror::Error;
use twinrpc_core::{CallError, ConnectionError};
use twinrpc_protocol::RpcError;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request timeout")]
    Timeout,

    #[error(transparent)]
    Call(#[from] CallError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// Returns the error reported by the server, if any.
    pub fn rpc(&self) -> Option<&RpcError> {
        match self {
            ClientError::Call(err) => err.rpc(),
            _ => None,
        }
    }

    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Io(_) | ClientError::Timeout => true,
            ClientError::Call(CallError::Connection(reason)) => {
                matches!(reason, ConnectionError::PeerClosed | ConnectionError::Lost(_))
            }
            ClientError::Call(CallError::Rpc(RpcError::ServerError(_))) => true,
            _ => false,
        }
    }
}
