//! # twinrpc-server
//!
//! TCP server for twinrpc.
//!
//! This crate provides:
//! - TCP connection handling with one connection engine per client
//! - Session tracking, so the server can call back into its clients
//! - Layered configuration (defaults, YAML file, environment)

pub mod config;
pub mod error;
pub mod server;
pub mod session;

pub use config::{Config, ConfigError, EndpointConfig, NetworkConfig};
pub use error::ServerError;
pub use server::{Server, ServerConfig, ServerStats};
pub use session::Session;
