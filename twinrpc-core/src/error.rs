//! Core error types.

use serde_json::Value;
use thiserror::Error;
use twinrpc_protocol::{ProtocolError, RpcError};

/// Why a connection left the active state.
///
/// Every request still pending at that moment fails with the same value,
/// and so does every later `request`/`notify` on the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("connection closed by peer")]
    PeerClosed,

    #[error("connection closed")]
    Closed,

    #[error("connection lost: {0}")]
    Lost(String),

    #[error("connection dropped after protocol fault: {0}")]
    Fault(String),
}

/// Errors delivered to a caller awaiting a request.
#[derive(Debug, Error)]
pub enum CallError {
    /// The peer answered with an error, or its answer was malformed.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("request cancelled")]
    Cancelled,

    /// The outgoing message could not be framed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl CallError {
    /// Returns the peer-reported error, if that is what this is.
    pub fn rpc(&self) -> Option<&RpcError> {
        match self {
            CallError::Rpc(err) => Some(err),
            _ => None,
        }
    }

    /// Returns the connection failure reason, if that is what this is.
    pub fn connection(&self) -> Option<&ConnectionError> {
        match self {
            CallError::Connection(err) => Some(err),
            _ => None,
        }
    }
}

/// A response arrived for an id with no pending request.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("unsolicited response for id {id}")]
pub struct UnsolicitedResponse {
    /// The `id` member as received (`null` if absent).
    pub id: Value,
}

impl UnsolicitedResponse {
    pub fn new(id: impl Into<Value>) -> Self {
        Self { id: id.into() }
    }
}
