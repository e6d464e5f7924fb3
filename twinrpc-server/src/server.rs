//! TCP server implementation.

use crate::config::Config;
use crate::error::ServerError;
use crate::session::Session;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use twinrpc_core::connection::DEFAULT_READ_BUFFER_SIZE;
use twinrpc_core::{EndpointFactory, Handler, MethodLookup, ResponseHandle};
use twinrpc_protocol::{Params, DEFAULT_PORT};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Socket read buffer size per connection.
    pub read_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            max_connections: 1000,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }
}

impl From<&Config> for ServerConfig {
    fn from(config: &Config) -> Self {
        Self {
            bind_addr: config.network.bind_addr,
            max_connections: config.network.max_connections,
            read_buffer_size: config.endpoint.read_buffer_size,
        }
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub connections_rejected: AtomicU64,
    /// Inbound requests and notifications, counted at method lookup.
    pub requests_total: AtomicU64,
    pub methods_not_found: AtomicU64,
}

/// Counts lookups on behalf of [`ServerStats`].
struct CountingLookup {
    inner: Arc<dyn MethodLookup>,
    stats: Arc<ServerStats>,
}

impl MethodLookup for CountingLookup {
    fn lookup(&self, method: &str) -> Option<Arc<dyn Handler>> {
        self.stats.requests_total.fetch_add(1, Ordering::Relaxed);
        let handler = self.inner.lookup(method);
        if handler.is_none() {
            self.stats.methods_not_found.fetch_add(1, Ordering::Relaxed);
        }
        handler
    }
}

/// TCP server for twinrpc.
///
/// Every accepted socket gets its own endpoint; the server keeps each one
/// as a [`Session`] so it can also originate requests and notifications
/// towards its clients.
pub struct Server {
    config: ServerConfig,
    factory: EndpointFactory,
    sessions: Arc<DashMap<String, Arc<Session>>>,
    stats: Arc<ServerStats>,
    shutdown: watch::Sender<bool>,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server.
    pub fn new(config: ServerConfig, lookup: impl MethodLookup + 'static) -> Self {
        Self::with_lookup(config, Arc::new(lookup))
    }

    pub fn with_lookup(config: ServerConfig, lookup: Arc<dyn MethodLookup>) -> Self {
        let stats = Arc::new(ServerStats::default());
        let counting = CountingLookup {
            inner: lookup,
            stats: stats.clone(),
        };
        let factory =
            EndpointFactory::new(counting).with_read_buffer_size(config.read_buffer_size);
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            factory,
            sessions: Arc::new(DashMap::new()),
            stats,
            shutdown,
            running: AtomicBool::new(false),
        }
    }

    /// Binds the configured address and runs the server.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Runs the server on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        let mut shutdown_rx = self.shutdown.subscribe();
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("Server listening on {}", local_addr);

        while !*shutdown_rx.borrow_and_update() {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.accept(stream, addr),
                        Err(e) => tracing::error!("Accept error: {}", e),
                    }
                }
                _ = shutdown_rx.changed() => {}
            }
        }

        tracing::info!("Server shutting down");
        self.close_all();
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn accept(&self, stream: TcpStream, addr: SocketAddr) {
        if self.stats.connections_active.load(Ordering::Relaxed)
            >= self.config.max_connections as u64
        {
            tracing::warn!("Connection limit reached, rejecting {}", addr);
            self.stats
                .connections_rejected
                .fetch_add(1, Ordering::Relaxed);
            return;
        }

        stream.set_nodelay(true).ok();
        self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
        self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

        let endpoint = self.factory.build(stream, addr.to_string());
        let session = Arc::new(Session::new(addr, endpoint.clone()));
        let id = session.id.clone();
        self.sessions.insert(id.clone(), session);
        tracing::info!("Client connected: {} (session {})", addr, id);

        let sessions = self.sessions.clone();
        let stats = self.stats.clone();
        tokio::spawn(async move {
            let reason = endpoint.closed().await;
            sessions.remove(&id);
            stats.connections_active.fetch_sub(1, Ordering::Relaxed);
            tracing::info!("Client disconnected: {} ({})", addr, reason);
        });
    }

    /// Initiates server shutdown. Live sessions are closed.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Sends a request to one client.
    pub fn request_session(
        &self,
        id: &str,
        method: &str,
        params: impl Into<Params>,
    ) -> Result<ResponseHandle, ServerError> {
        let session = self
            .session(id)
            .ok_or_else(|| ServerError::SessionNotFound(id.to_string()))?;
        Ok(session.endpoint().request(method, params)?)
    }

    /// Sends a notification to one client.
    pub fn notify_session(
        &self,
        id: &str,
        method: &str,
        params: impl Into<Params>,
    ) -> Result<(), ServerError> {
        let session = self
            .session(id)
            .ok_or_else(|| ServerError::SessionNotFound(id.to_string()))?;
        Ok(session.endpoint().notify(method, params)?)
    }

    /// Sends a notification to every connected client. Returns how many
    /// sessions it was queued for.
    pub fn broadcast_notify(&self, method: &str, params: impl Into<Params>) -> usize {
        let params = params.into();
        let mut delivered = 0;
        for entry in self.sessions.iter() {
            match entry.value().endpoint().notify(method, params.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::debug!("Broadcast to session {} skipped: {}", entry.key(), e),
            }
        }
        delivered
    }

    fn close_all(&self) {
        // Collect first: closing removes entries from the map concurrently.
        let sessions: Vec<Arc<Session>> =
            self.sessions.iter().map(|entry| entry.value().clone()).collect();
        for session in sessions {
            session.close();
        }
    }
}
