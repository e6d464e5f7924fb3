//! Session management.

use std::net::SocketAddr;
use std::time::{Duration, Instant};
use twinrpc_core::Endpoint;
use uuid::Uuid;

/// An accepted client connection.
pub struct Session {
    /// Unique session ID.
    pub id: String,

    /// Remote address.
    pub remote_addr: SocketAddr,

    /// Engine driving the connection.
    endpoint: Endpoint,

    /// Session creation time.
    created_at: Instant,
}

impl Session {
    pub fn new(remote_addr: SocketAddr, endpoint: Endpoint) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            remote_addr,
            endpoint,
            created_at: Instant::now(),
        }
    }

    /// Returns the connection endpoint, for requests towards this client.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn is_active(&self) -> bool {
        self.endpoint.is_active()
    }

    /// Returns how long the session has been open.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Closes the underlying connection.
    pub fn close(&self) {
        self.endpoint.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}
