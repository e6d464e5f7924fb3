//! Server error types.

use thiserror::Error;
use twinrpc_core::CallError;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("call failed: {0}")]
    Call(#[from] CallError),

    #[error("session not found: {0}")]
    SessionNotFound(String),
}
