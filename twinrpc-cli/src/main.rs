//! twinrpc-cli - Command-line interface for twinrpc
//!
//! Issues one-shot requests and notifications against a twinrpc server.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use twinrpc_client::{Client, ConnectionConfig};

#[derive(Parser)]
#[command(name = "twinrpc-cli")]
#[command(about = "Command-line interface for twinrpc JSON-RPC servers")]
#[command(version)]
struct Cli {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:7411", env = "TWINRPC_SERVER")]
    server: SocketAddr,

    /// Request timeout in seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Call a method and print its result
    Call {
        /// Method name
        method: String,

        /// Parameters as a JSON array or object (or @file.json)
        params: Option<String>,
    },

    /// Send a notification (no result)
    Notify {
        /// Method name
        method: String,

        /// Parameters as a JSON array or object (or @file.json)
        params: Option<String>,
    },

    /// Ping the server
    Ping,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = ConnectionConfig::new(cli.server);
    if let Some(secs) = cli.timeout {
        config = config.with_request_timeout(Duration::from_secs(secs));
    }

    let client = Client::connect(config).await.map_err(|e| {
        eprintln!("{}: {}", "Connection failed".red(), e);
        e
    })?;

    match commands::execute(&client, cli.command).await {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("{}", e);
            client.close();
            std::process::exit(1);
        }
    }

    client.close();
    Ok(())
}
