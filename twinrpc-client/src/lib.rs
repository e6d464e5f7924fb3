//! # twinrpc-client
//!
//! Client library for twinrpc.
//!
//! This crate provides:
//! - Async TCP client built on the twinrpc connection engine
//! - Typed calls, notifications and optional request timeouts
//! - Serving methods back to the server over the same connection

pub mod client;
pub mod connection;
pub mod error;

pub use client::Client;
pub use connection::ConnectionConfig;
pub use error::ClientError;
