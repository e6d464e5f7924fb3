//! Method handlers and lookup.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};
use std::any::Any;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use twinrpc_protocol::{Params, RpcError};

/// Failure raised by a handler.
///
/// Any error type converts into this with `?`. An [`RpcError`] is sent to
/// the caller unchanged; anything else is reported as `InternalError` with
/// the failure's type name, message and cause chain in `data`.
#[derive(Debug)]
pub struct HandlerError {
    pub exception: String,
    pub message: String,
    pub traceback: Vec<String>,
    rpc: Option<RpcError>,
}

impl HandlerError {
    /// A failure with a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            exception: "Error".to_string(),
            message: message.into(),
            traceback: Vec::new(),
            rpc: None,
        }
    }

    /// A failure with an explicit exception name.
    pub fn named(exception: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            exception: exception.into(),
            ..Self::msg(message)
        }
    }

    /// Converts a caught panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "handler panicked".to_string()
        };
        Self::named("panic", message)
    }

    /// Returns the protocol error this failure carries, if any.
    pub fn rpc(&self) -> Option<&RpcError> {
        self.rpc.as_ref()
    }

    /// Converts into the error sent back to the caller.
    pub fn into_rpc_error(self) -> RpcError {
        if let Some(rpc) = self.rpc {
            return rpc;
        }
        RpcError::internal_error().with_data(json!({
            "exception": self.exception,
            "message": self.message,
            "traceback": self.traceback.join("\n"),
        }))
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.exception, self.message)
    }
}

impl<E> From<E> for HandlerError
where
    E: StdError + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        let exception = short_type_name(std::any::type_name::<E>());
        let message = err.to_string();

        let mut traceback = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            traceback.push(cause.to_string());
            source = cause.source();
        }

        let boxed: Box<dyn StdError + Send + Sync> = Box::new(err);
        let rpc = boxed.downcast::<RpcError>().ok().map(|e| *e);

        Self {
            exception,
            message,
            traceback,
            rpc,
        }
    }
}

/// `std::io::error::Error` -> `Error`, `foo::Bar<baz::Qux>` -> `Bar`.
fn short_type_name(full: &str) -> String {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

pub type HandlerFuture = BoxFuture<'static, Result<Value, HandlerError>>;

/// A callable bound to a method name.
pub trait Handler: Send + Sync {
    fn call(&self, params: Params) -> HandlerFuture;
}

struct FnHandler<F>(F);

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Params) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    fn call(&self, params: Params) -> HandlerFuture {
        (self.0)(params).boxed()
    }
}

/// Wraps an async closure as a handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

struct SyncHandler<F>(F);

impl<F> Handler for SyncHandler<F>
where
    F: Fn(Params) -> Result<Value, HandlerError> + Send + Sync,
{
    fn call(&self, params: Params) -> HandlerFuture {
        futures::future::ready((self.0)(params)).boxed()
    }
}

/// Wraps a synchronous closure as a handler.
pub fn sync_fn<F>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Params) -> Result<Value, HandlerError> + Send + Sync + 'static,
{
    Arc::new(SyncHandler(f))
}

/// Resolves method names to handlers. Consulted once per inbound request.
pub trait MethodLookup: Send + Sync {
    fn lookup(&self, method: &str) -> Option<Arc<dyn Handler>>;
}

impl<F> MethodLookup for F
where
    F: Fn(&str) -> Option<Arc<dyn Handler>> + Send + Sync,
{
    fn lookup(&self, method: &str) -> Option<Arc<dyn Handler>> {
        self(method)
    }
}

/// Name-to-handler map.
#[derive(Default, Clone)]
pub struct MethodTable {
    methods: HashMap<String, Arc<dyn Handler>>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration.
    pub fn register(mut self, name: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        self.insert(name, handler);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, handler: Arc<dyn Handler>) {
        self.methods.insert(name.into(), handler);
    }

    /// Registered method names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl MethodLookup for MethodTable {
    fn lookup(&self, method: &str) -> Option<Arc<dyn Handler>> {
        self.methods.get(method).cloned()
    }
}

/// Runs a handler to completion, turning failures and panics into the
/// error reported to the caller.
pub(crate) async fn invoke(handler: Arc<dyn Handler>, params: Params) -> Result<Value, RpcError> {
    let future = match std::panic::catch_unwind(AssertUnwindSafe(|| handler.call(params))) {
        Ok(future) => future,
        Err(payload) => return Err(HandlerError::from_panic(payload).into_rpc_error()),
    };

    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.into_rpc_error()),
        Err(payload) => Err(HandlerError::from_panic(payload).into_rpc_error()),
    }
}
