//! # twinrpc-protocol
//!
//! Wire protocol implementation for twinrpc (JSON-RPC 2.0 over a byte stream).
//!
//! This crate provides:
//! - Binary framing with a 16-bit big-endian length prefix
//! - JSON-RPC envelope encoding, decoding and classification
//! - The closed error taxonomy and its wire representation

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;

pub use codec::{Decoder, Encoder};
pub use error::{ErrorKind, ErrorObject, ProtocolError, RpcError};
pub use frame::{Frame, LENGTH_PREFIX_SIZE};
pub use message::{Envelope, EnvelopeKind, Params, Request, RequestId, Response};

/// JSON-RPC version tag carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Default port for twinrpc servers.
pub const DEFAULT_PORT: u16 = 7411;

/// Maximum frame payload size (the largest value of the 16-bit length prefix).
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;
