//! Command execution.

use crate::Commands;
use colored::Colorize;
use serde_json::Value;
use twinrpc_client::{Client, ClientError};
use twinrpc_protocol::{Params, RpcError};

/// Executes a command and returns the formatted output.
pub async fn execute(client: &Client, cmd: Commands) -> Result<String, String> {
    match cmd {
        Commands::Call { method, params } => {
            let params = parse_params(params.as_deref())?;
            let result = client
                .request(&method, params)
                .await
                .map_err(|e| format_client_error(&e))?;
            Ok(format_json(&result))
        }

        Commands::Notify { method, params } => {
            let params = parse_params(params.as_deref())?;
            client
                .notify(&method, params)
                .map_err(|e| format_client_error(&e))?;
            Ok(format!("{} {}", "Sent".green(), method.cyan()))
        }

        Commands::Ping => {
            client
                .request("ping", Params::default())
                .await
                .map_err(|e| format_client_error(&e))?;
            Ok("PONG".green().to_string())
        }
    }
}

/// Parses a params argument: inline JSON or `@file.json`. Absent means `[]`.
fn parse_params(arg: Option<&str>) -> Result<Params, String> {
    let Some(arg) = arg else {
        return Ok(Params::default());
    };
    let value = parse_json_arg(arg).map_err(|e| format!("{}: {}", "Invalid params".red(), e))?;
    match value {
        Value::Array(_) | Value::Object(_) => Ok(Params::from(value)),
        other => Err(format!(
            "{}: expected a JSON array or object, got {}",
            "Invalid params".red(),
            other
        )),
    }
}

/// Parses a JSON argument (either inline JSON or @file.json).
fn parse_json_arg(arg: &str) -> Result<Value, Box<dyn std::error::Error>> {
    if let Some(path) = arg.strip_prefix('@') {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(arg)?)
    }
}

fn format_client_error(err: &ClientError) -> String {
    match err.rpc() {
        Some(rpc) => format_rpc_error(rpc),
        None => format!("{}: {}", "Error".red(), err),
    }
}

fn format_rpc_error(err: &RpcError) -> String {
    let object = err.to_object();
    let mut out = format!(
        "{} {}: {}",
        err.kind().to_string().red().bold(),
        format!("({})", object.code).dimmed(),
        object.message
    );
    if let Some(data) = &object.data {
        out.push('\n');
        out.push_str(&format_json(data));
    }
    out
}

/// Formats JSON for display.
fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
