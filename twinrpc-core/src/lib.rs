//! # twinrpc-core
//!
//! Bidirectional JSON-RPC connection engine for twinrpc.
//!
//! This crate provides:
//! - Correlation of outgoing requests with their responses
//! - Method lookup and handler invocation
//! - The per-connection read/write loops and failure propagation
//!
//! Both ends of a connection run the same engine: either side may issue
//! requests and notifications while serving the other's.

pub mod connection;
pub mod correlation;
pub mod error;
pub mod handler;

pub use connection::{ConnectionState, Endpoint, EndpointFactory};
pub use correlation::{Canceller, CorrelationTable, ResponseHandle};
pub use error::{CallError, ConnectionError, UnsolicitedResponse};
pub use handler::{
    handler_fn, sync_fn, Handler, HandlerError, HandlerFuture, MethodLookup, MethodTable,
};
