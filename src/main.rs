//! twinrpc - bidirectional JSON-RPC 2.0 server
//!
//! Serves a small demo method table over length-prefixed TCP.

mod methods;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use twinrpc_server::{Config, Server, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // From file if TWINRPC_CONFIG is set, then env overrides
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("TWINRPC_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    let methods = methods::demo_methods();
    tracing::info!("Starting twinrpc server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Max connections: {}", config.network.max_connections);
    tracing::info!("  Methods: {}", methods.names().join(", "));

    let server = Arc::new(Server::new(ServerConfig::from(&config), methods));

    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    server.run().await?;

    tracing::info!("Server stopped");
    Ok(())
}
