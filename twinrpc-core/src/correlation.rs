//! Correlation of outgoing requests with incoming responses.

use crate::error::{CallError, ConnectionError, UnsolicitedResponse};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use twinrpc_protocol::RpcError;

type Completion = oneshot::Sender<Result<Value, CallError>>;

struct TableState {
    pending: HashMap<String, Completion>,
    next_id: u64,
    /// Set once by `drain_all`; registration is refused afterwards.
    failed: Option<ConnectionError>,
}

/// Pending requests of one connection, keyed by generated id.
///
/// The id counter, the pending map and the failure reason share one lock,
/// so registration and draining never interleave.
pub struct CorrelationTable {
    state: Mutex<TableState>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TableState {
                pending: HashMap::new(),
                next_id: 1,
                failed: None,
            }),
        }
    }

    /// Allocates the next id and stores a completion for it.
    ///
    /// Must happen before the request is written, so the response can never
    /// overtake the registration.
    pub fn register(self: &Arc<Self>) -> Result<ResponseHandle, ConnectionError> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.failed {
            return Err(reason.clone());
        }

        let id = state.next_id.to_string();
        state.next_id += 1;

        let (tx, rx) = oneshot::channel();
        state.pending.insert(id.clone(), tx);

        Ok(ResponseHandle {
            id,
            rx,
            table: Arc::downgrade(self),
            completed: false,
        })
    }

    /// Completes the request `id` with a result.
    pub fn resolve(&self, id: &str, value: Value) -> Result<(), UnsolicitedResponse> {
        self.complete(id, Ok(value))
    }

    /// Completes the request `id` with an error.
    pub fn fail(&self, id: &str, error: RpcError) -> Result<(), UnsolicitedResponse> {
        self.complete(id, Err(CallError::Rpc(error)))
    }

    /// Removes `id` and fails it with `Cancelled`. Returns whether it was pending.
    pub fn cancel(&self, id: &str) -> bool {
        self.complete(id, Err(CallError::Cancelled)).is_ok()
    }

    fn complete(&self, id: &str, outcome: Result<Value, CallError>) -> Result<(), UnsolicitedResponse> {
        let completion = self
            .state
            .lock()
            .pending
            .remove(id)
            .ok_or_else(|| UnsolicitedResponse::new(id))?;

        // The caller may have stopped waiting; the entry is gone either way.
        let _ = completion.send(outcome);
        Ok(())
    }

    /// Drops `id` without completing it (its handle is gone).
    fn forget(&self, id: &str) {
        self.state.lock().pending.remove(id);
    }

    /// Fails every pending request with `reason` and refuses new ones.
    ///
    /// Returns `false` if the table was already drained.
    pub fn drain_all(&self, reason: ConnectionError) -> bool {
        let drained = {
            let mut state = self.state.lock();
            if state.failed.is_some() {
                return false;
            }
            state.failed = Some(reason.clone());
            std::mem::take(&mut state.pending)
        };

        tracing::debug!("Failing {} pending request(s): {}", drained.len(), reason);
        for (_, completion) in drained {
            let _ = completion.send(Err(CallError::Connection(reason.clone())));
        }
        true
    }

    /// Returns the drain reason, if the table has been drained.
    pub fn failure(&self) -> Option<ConnectionError> {
        self.state.lock().failed.clone()
    }

    /// Returns whether `id` is awaiting a response.
    pub fn is_pending(&self, id: &str) -> bool {
        self.state.lock().pending.contains_key(id)
    }

    /// Returns the number of pending requests.
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Completion handle for an outgoing request.
///
/// Resolves to the peer's result, or fails with the peer's error, the
/// connection failure reason, or `Cancelled`. Dropping the handle before it
/// completes removes the request from the table, so a late response is
/// treated as unsolicited.
pub struct ResponseHandle {
    id: String,
    rx: oneshot::Receiver<Result<Value, CallError>>,
    table: Weak<CorrelationTable>,
    completed: bool,
}

impl ResponseHandle {
    /// Returns the correlation id sent with the request.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Cancels the request. Awaiting the handle afterwards yields `Cancelled`.
    pub fn cancel(&self) {
        self.canceller().cancel();
    }

    /// Returns a detached handle that can cancel this request from elsewhere.
    pub fn canceller(&self) -> Canceller {
        Canceller {
            id: self.id.clone(),
            table: self.table.clone(),
        }
    }
}

impl Future for ResponseHandle {
    type Output = Result<Value, CallError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(outcome) => {
                this.completed = true;
                // A dropped sender means the table itself went away.
                Poll::Ready(outcome.unwrap_or(Err(CallError::Connection(ConnectionError::Closed))))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ResponseHandle {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        if let Some(table) = self.table.upgrade() {
            table.forget(&self.id);
        }
    }
}

/// Cancels one pending request.
#[derive(Clone)]
pub struct Canceller {
    id: String,
    table: Weak<CorrelationTable>,
}

impl Canceller {
    /// Returns whether the request was still pending.
    pub fn cancel(&self) -> bool {
        self.table
            .upgrade()
            .map(|table| table.cancel(&self.id))
            .unwrap_or(false)
    }
}
