//! Demo methods served by the `twinrpc` binary.

use serde_json::{json, Value};
use std::time::Duration;
use twinrpc_core::{handler_fn, sync_fn, HandlerError, MethodTable};
use twinrpc_protocol::Params;

pub fn demo_methods() -> MethodTable {
    MethodTable::new()
        .register("echo", sync_fn(|params| Ok(params.to_value())))
        .register("reverse", sync_fn(reverse))
        .register("sum", sync_fn(sum))
        .register("ping", sync_fn(ping))
        .register("sleep", handler_fn(sleep))
}

fn reverse(params: Params) -> Result<Value, HandlerError> {
    let mut items: Vec<Value> = params.bind()?;
    items.reverse();
    Ok(Value::Array(items))
}

/// Integer sum when every argument is an integer, float sum otherwise.
fn sum(params: Params) -> Result<Value, HandlerError> {
    if let Ok(ints) = params.bind::<Vec<i64>>() {
        let total = ints
            .iter()
            .try_fold(0i64, |acc, n| acc.checked_add(*n))
            .ok_or_else(|| HandlerError::named("OverflowError", "integer sum overflows"))?;
        return Ok(json!(total));
    }
    let floats: Vec<f64> = params.bind()?;
    Ok(json!(floats.iter().sum::<f64>()))
}

fn ping(params: Params) -> Result<Value, HandlerError> {
    params.ensure_empty()?;
    Ok(json!("pong"))
}

async fn sleep(params: Params) -> Result<Value, HandlerError> {
    let (ms,): (u64,) = params.bind()?;
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Ok(json!(ms))
}
