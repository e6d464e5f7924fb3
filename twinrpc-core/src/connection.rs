//! Per-connection engine.
//!
//! An [`Endpoint`] owns one byte stream. A reader task decodes inbound
//! frames one at a time in arrival order and routes them: responses go to
//! the [`CorrelationTable`], requests and notifications go to handlers,
//! each of which runs on its own task so replies may complete out of order.
//! A writer task exclusively owns the write half and drains a FIFO queue,
//! so frames originated here are written in the order they were sent.

use crate::correlation::{CorrelationTable, ResponseHandle};
use crate::error::{CallError, ConnectionError, UnsolicitedResponse};
use crate::handler::{invoke, MethodLookup};
use bytes::BytesMut;
use serde_json::{json, Value};
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use twinrpc_protocol::{
    Decoder, Encoder, Envelope, EnvelopeKind, Params, Request, RequestId, Response, RpcError,
};

/// Default size of the socket read buffer (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Lifecycle of a connection. `Failed` is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Active,
    Failed(ConnectionError),
}

enum Outbound {
    Frame(BytesMut),
    Close,
}

struct Shared {
    peer: String,
    table: Arc<CorrelationTable>,
    /// Unbounded so that `request` and `notify` never wait on the writer.
    /// Once the connection fails, nothing more is queued.
    outbound: mpsc::UnboundedSender<Outbound>,
    state: watch::Sender<ConnectionState>,
    lookup: Arc<dyn MethodLookup>,
}

impl Shared {
    fn failure(&self) -> Option<ConnectionError> {
        self.table.failure()
    }

    fn is_failed(&self) -> bool {
        self.failure().is_some()
    }

    /// Moves the connection to `Failed(reason)`. Only the first call has
    /// any effect.
    fn fail(&self, reason: ConnectionError) {
        if !self.table.drain_all(reason.clone()) {
            return;
        }
        match &reason {
            ConnectionError::Closed => info!("[{}] Connection closed", self.peer),
            ConnectionError::PeerClosed => info!("[{}] Connection closed by peer", self.peer),
            other => info!("[{}] Connection failed: {}", self.peer, other),
        }
        self.state.send_replace(ConnectionState::Failed(reason));
        let _ = self.outbound.send(Outbound::Close);
    }

    fn queue(&self, frame: BytesMut) -> Result<(), ConnectionError> {
        if let Some(reason) = self.failure() {
            return Err(reason);
        }
        self.outbound
            .send(Outbound::Frame(frame))
            .map_err(|_| self.failure().unwrap_or(ConnectionError::Closed))
    }

    /// Encodes and queues a reply. If the reply itself cannot be encoded, a
    /// bare `InternalError` is sent instead; if even that fails the
    /// connection is dropped.
    fn reply(&self, id: Option<RequestId>, outcome: Result<Value, RpcError>) {
        let encoded = match (id.clone(), outcome) {
            (Some(id), Ok(value)) => Encoder::encode_response(id, value),
            (id, Err(err)) => Encoder::encode_error(id, &err),
            (None, Ok(_)) => return,
        };

        let frame = match encoded {
            Ok(frame) => frame,
            Err(err) => {
                warn!("[{}] Failed to encode reply: {}", self.peer, err);
                let fallback = RpcError::internal_error().with_data(json!({
                    "exception": "ProtocolError",
                    "message": err.to_string(),
                }));
                match Encoder::encode_error(id, &fallback) {
                    Ok(frame) => frame,
                    Err(err) => {
                        error!("[{}] Failed to encode fallback error: {}", self.peer, err);
                        self.fail(ConnectionError::Fault(err.to_string()));
                        return;
                    }
                }
            }
        };

        if let Err(reason) = self.queue(frame) {
            debug!("[{}] Reply dropped: {}", self.peer, reason);
        }
    }

    fn dispatch(self: &Arc<Self>, decoded: Result<Envelope, RpcError>) -> ControlFlow<()> {
        let envelope = match decoded {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!("[{}] Undecodable frame: {}", self.peer, err);
                self.reply(None, Err(err));
                self.fail(ConnectionError::Fault("parse error".to_string()));
                return ControlFlow::Break(());
            }
        };

        match envelope.kind() {
            EnvelopeKind::Response => self.correlate(&envelope),
            EnvelopeKind::Request | EnvelopeKind::Notification => self.serve(envelope),
        }
        ControlFlow::Continue(())
    }

    fn correlate(&self, envelope: &Envelope) {
        let id = envelope.get("id").cloned().unwrap_or(Value::Null);
        // Ids issued here are strings, so no other id type can match.
        let key = match &id {
            Value::String(s) => Some(s.clone()),
            _ => None,
        };

        let delivered = match key {
            Some(key) => {
                debug!("[{}] <- response {}", self.peer, key);
                match Response::reconstruct(envelope) {
                    Ok(value) => self.table.resolve(&key, value),
                    Err(err) => self.table.fail(&key, err),
                }
            }
            None => Err(UnsolicitedResponse::new(id)),
        };

        if let Err(unsolicited) = delivered {
            self.unsolicited(unsolicited);
        }
    }

    fn unsolicited(&self, fault: UnsolicitedResponse) {
        warn!("[{}] {}", self.peer, fault);
        // A null id could only be answered with another null-id error.
        if fault.id.is_null() {
            return;
        }
        let err = RpcError::internal_error().with_data(json!({
            "exception": "UnsolicitedResponse",
            "message": fault.to_string(),
            "id": fault.id,
        }));
        self.reply(None, Err(err));
    }

    fn serve(self: &Arc<Self>, envelope: Envelope) {
        let request = match Request::from_envelope(&envelope) {
            Ok(request) => request,
            Err(err) => {
                warn!("[{}] Invalid request: {}", self.peer, err);
                if envelope.kind() == EnvelopeKind::Request {
                    self.reply(envelope.request_id(), Err(err));
                }
                return;
            }
        };

        let Request {
            id, method, params, ..
        } = request;

        let Some(handler) = self.lookup.lookup(&method) else {
            warn!("[{}] Method not found: {}", self.peer, method);
            if id.is_some() {
                let err = RpcError::method_not_found().with_data(json!({"method": method}));
                self.reply(id, Err(err));
            }
            return;
        };

        match &id {
            Some(id) => debug!("[{}] <- request {} {}", self.peer, id, method),
            None => debug!("[{}] <- notification {}", self.peer, method),
        }

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = invoke(handler, params).await;
            if let Err(err) = &outcome {
                warn!("[{}] Method {} failed: {}", shared.peer, method, err);
            }
            if id.is_some() && !shared.is_failed() {
                shared.reply(id, outcome);
            }
        });
    }
}

/// Builds endpoints that share one method lookup.
#[derive(Clone)]
pub struct EndpointFactory {
    lookup: Arc<dyn MethodLookup>,
    read_buffer_size: usize,
}

impl EndpointFactory {
    pub fn new(lookup: impl MethodLookup + 'static) -> Self {
        Self::from_arc(Arc::new(lookup))
    }

    pub fn from_arc(lookup: Arc<dyn MethodLookup>) -> Self {
        Self {
            lookup,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Takes ownership of `stream` and starts its reader and writer tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build<S>(&self, stream: S, peer: impl Into<String>) -> Endpoint
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Active);

        let shared = Arc::new(Shared {
            peer: peer.into(),
            table: Arc::new(CorrelationTable::new()),
            outbound,
            state,
            lookup: Arc::clone(&self.lookup),
        });

        debug!("[{}] Connection started", shared.peer);
        tokio::spawn(write_loop(Arc::clone(&shared), writer, outbound_rx));
        tokio::spawn(read_loop(Arc::clone(&shared), reader, self.read_buffer_size));

        Endpoint { shared }
    }
}

async fn read_loop<R>(shared: Arc<Shared>, mut reader: R, buffer_size: usize)
where
    R: AsyncRead + Unpin,
{
    let mut state_rx = shared.state.subscribe();
    let mut decoder = Decoder::new();
    let mut buf = vec![0u8; buffer_size];

    'read: loop {
        if shared.is_failed() {
            break;
        }

        let n = tokio::select! {
            result = reader.read(&mut buf) => match result {
                Ok(0) => {
                    shared.fail(ConnectionError::PeerClosed);
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    shared.fail(ConnectionError::Lost(e.to_string()));
                    break;
                }
            },
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
        };

        decoder.extend(&buf[..n]);
        while let Some(decoded) = decoder.decode_envelope() {
            if shared.dispatch(decoded).is_break() || shared.is_failed() {
                break 'read;
            }
        }
    }

    debug!("[{}] Reader stopped", shared.peer);
}

async fn write_loop<W>(shared: Arc<Shared>, mut writer: W, mut rx: mpsc::UnboundedReceiver<Outbound>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(item) = rx.recv().await {
        let frame = match item {
            Outbound::Frame(frame) => frame,
            Outbound::Close => break,
        };

        let written = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = written {
            shared.fail(ConnectionError::Lost(e.to_string()));
            break;
        }
    }

    let _ = writer.shutdown().await;
    debug!("[{}] Writer stopped", shared.peer);
}

/// Handle to a running connection. Cheap to clone.
#[derive(Clone)]
pub struct Endpoint {
    shared: Arc<Shared>,
}

impl Endpoint {
    /// Sends a request and returns its completion handle.
    ///
    /// Fails immediately if the connection has already failed. The request
    /// is registered before it is queued, so its response cannot be missed.
    pub fn request(
        &self,
        method: &str,
        params: impl Into<Params>,
    ) -> Result<ResponseHandle, CallError> {
        let handle = self.shared.table.register()?;
        let frame = Encoder::encode_request(handle.id(), method, params)?;
        self.shared.queue(frame)?;
        debug!("[{}] -> request {} {}", self.shared.peer, handle.id(), method);
        Ok(handle)
    }

    /// Sends a notification. Nothing is awaited.
    pub fn notify(&self, method: &str, params: impl Into<Params>) -> Result<(), CallError> {
        if let Some(reason) = self.shared.failure() {
            return Err(reason.into());
        }
        let frame = Encoder::encode_notification(method, params)?;
        self.shared.queue(frame)?;
        debug!("[{}] -> notification {}", self.shared.peer, method);
        Ok(())
    }

    /// Closes the connection; pending requests fail with `Closed`.
    pub fn close(&self) {
        self.shared.fail(ConnectionError::Closed);
    }

    /// Waits until the connection fails and returns the reason.
    pub async fn closed(&self) -> ConnectionError {
        let mut rx = self.shared.state.subscribe();
        loop {
            let state = rx.borrow_and_update().clone();
            if let ConnectionState::Failed(reason) = state {
                return reason;
            }
            if rx.changed().await.is_err() {
                return ConnectionError::Closed;
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        !self.shared.is_failed()
    }

    /// Returns the peer label given at construction.
    pub fn peer(&self) -> &str {
        &self.shared.peer
    }

    /// Returns the number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.shared.table.pending_count()
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("peer", &self.shared.peer)
            .field("state", &self.state())
            .field("pending", &self.pending_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{handler_fn, sync_fn, HandlerError, MethodTable};
    use bytes::Bytes;
    use std::time::Duration;
    use tokio::io::DuplexStream;
    use tokio::time::timeout;
    use twinrpc_protocol::{ErrorKind, Frame};

    /// Drives the other end of a pipe with hand-written frames.
    struct RawPeer {
        stream: DuplexStream,
        decoder: Decoder,
    }

    impl RawPeer {
        async fn send(&mut self, value: Value) {
            let frame = Encoder::encode_json(&value).unwrap();
            self.stream.write_all(&frame).await.unwrap();
        }

        async fn send_raw(&mut self, payload: &'static [u8]) {
            let frame = Frame::new(Bytes::from_static(payload)).encode().unwrap();
            self.stream.write_all(&frame).await.unwrap();
        }

        /// Next frame as JSON, or `None` at end of stream.
        async fn recv(&mut self) -> Option<Value> {
            let mut buf = [0u8; 4096];
            loop {
                if let Some(frame) = self.decoder.decode_frame() {
                    return Some(serde_json::from_slice(&frame.payload).unwrap());
                }
                let n = timeout(Duration::from_secs(5), self.stream.read(&mut buf))
                    .await
                    .expect("timed out waiting for a frame")
                    .unwrap();
                if n == 0 {
                    return None;
                }
                self.decoder.extend(&buf[..n]);
            }
        }
    }

    fn methods(notes: mpsc::UnboundedSender<Value>) -> MethodTable {
        MethodTable::new()
            .register(
                "baz",
                sync_fn(|params| {
                    let (p, q): (Value, Value) = params.bind()?;
                    Ok(json!([q, p]))
                }),
            )
            .register("echo", sync_fn(|params| Ok(params.to_value())))
            .register(
                "boom",
                sync_fn(|_| Err(HandlerError::named("ValueError", "bigboom"))),
            )
            .register("explode", sync_fn(|_| panic!("kaboom")))
            .register(
                "slow",
                handler_fn(|params| async move {
                    let (ms,): (u64,) = params.bind()?;
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok::<_, HandlerError>(json!(ms))
                }),
            )
            .register(
                "record",
                sync_fn(move |params| {
                    let _ = notes.send(params.to_value());
                    Ok(Value::Null)
                }),
            )
    }

    fn pair() -> (Endpoint, RawPeer, mpsc::UnboundedReceiver<Value>) {
        let (notes_tx, notes_rx) = mpsc::unbounded_channel();
        let (local, remote) = tokio::io::duplex(64 * 1024);
        let endpoint = EndpointFactory::new(methods(notes_tx)).build(local, "test");
        let peer = RawPeer {
            stream: remote,
            decoder: Decoder::new(),
        };
        (endpoint, peer, notes_rx)
    }

    #[tokio::test]
    async fn test_request_resolves_once() {
        let (endpoint, mut peer, _) = pair();

        let handle = endpoint.request("foo", json!([1])).unwrap();
        assert_eq!(endpoint.pending_count(), 1);
        assert_eq!(
            peer.recv().await.unwrap(),
            json!({"jsonrpc": "2.0", "id": "1", "method": "foo", "params": [1]})
        );

        let response = json!({"jsonrpc": "2.0", "id": "1", "result": [2, 3, "bar"]});
        peer.send(response.clone()).await;
        assert_eq!(handle.await.unwrap(), json!([2, 3, "bar"]));
        assert_eq!(endpoint.pending_count(), 0);

        // Second delivery of the same id
        peer.send(response).await;
        let reply = peer.recv().await.unwrap();
        assert_eq!(reply["id"], Value::Null);
        assert_eq!(reply["error"]["code"], -32603);
        assert_eq!(reply["error"]["data"]["exception"], "UnsolicitedResponse");
        assert_eq!(reply["error"]["data"]["id"], "1");
        assert!(endpoint.is_active());
    }

    #[tokio::test]
    async fn test_request_ids_increase() {
        let (endpoint, mut peer, _) = pair();

        let _a = endpoint.request("a", Params::default()).unwrap();
        let _b = endpoint.request("b", Params::default()).unwrap();
        assert_eq!(peer.recv().await.unwrap()["id"], "1");
        assert_eq!(peer.recv().await.unwrap()["id"], "2");
    }

    #[tokio::test]
    async fn test_notify() {
        let (endpoint, mut peer, _) = pair();

        endpoint.notify("bar", json!([1, 2, "foo"])).unwrap();
        assert_eq!(
            peer.recv().await.unwrap(),
            json!({"jsonrpc": "2.0", "method": "bar", "params": [1, 2, "foo"]})
        );
        assert_eq!(endpoint.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_notify_ignores_fabricated_response() {
        let (endpoint, mut peer, _) = pair();

        endpoint.notify("bar", json!([1, 2, "foo"])).unwrap();
        peer.recv().await.unwrap();

        peer.send(json!({"jsonrpc": "2.0", "id": "1", "result": 1})).await;
        let reply = peer.recv().await.unwrap();
        assert_eq!(reply["id"], Value::Null);
        assert_eq!(reply["error"]["code"], -32603);
        assert_eq!(reply["error"]["data"]["exception"], "UnsolicitedResponse");
        assert_eq!(reply["error"]["data"]["id"], "1");

        // Nothing else was sent: the next frame answers this request.
        peer.send(json!({"jsonrpc": "2.0", "id": 7, "method": "echo", "params": []}))
            .await;
        assert_eq!(
            peer.recv().await.unwrap(),
            json!({"jsonrpc": "2.0", "id": 7, "result": []})
        );

        assert!(endpoint.is_active());
        assert_eq!(endpoint.pending_count(), 0);
        // The notification never took an id.
        let _handle = endpoint.request("foo", Params::default()).unwrap();
        assert_eq!(peer.recv().await.unwrap()["id"], "1");
    }

    #[tokio::test]
    async fn test_integer_id_does_not_match_string_id() {
        let (endpoint, mut peer, _) = pair();

        let handle = endpoint.request("foo", Params::default()).unwrap();
        peer.recv().await.unwrap();

        peer.send(json!({"jsonrpc": "2.0", "id": 1, "result": "int-id"}))
            .await;
        let reply = peer.recv().await.unwrap();
        assert_eq!(reply["id"], Value::Null);
        assert_eq!(reply["error"]["data"]["exception"], "UnsolicitedResponse");
        assert_eq!(reply["error"]["data"]["id"], 1);
        assert_eq!(endpoint.pending_count(), 1);

        peer.send(json!({"jsonrpc": "2.0", "id": "1", "result": "str-id"}))
            .await;
        assert_eq!(handle.await.unwrap(), json!("str-id"));
        assert!(endpoint.is_active());
    }

    #[tokio::test]
    async fn test_parse_error_closes_connection() {
        let (endpoint, mut peer, _) = pair();
        let handle = endpoint.request("foo", Params::default()).unwrap();
        peer.recv().await.unwrap();

        peer.send_raw(b"bigboom").await;
        peer.send(json!({"jsonrpc": "2.0", "id": "9", "method": "echo"}))
            .await;

        let reply = peer.recv().await.unwrap();
        assert_eq!(
            reply,
            json!({
                "jsonrpc": "2.0",
                "id": null,
                "error": {"code": -32700, "message": "Parse error"}
            })
        );
        // Nothing after the parse error, then end of stream
        assert_eq!(peer.recv().await, None);

        assert!(matches!(endpoint.closed().await, ConnectionError::Fault(_)));
        assert!(matches!(
            handle.await,
            Err(CallError::Connection(ConnectionError::Fault(_)))
        ));
    }

    #[tokio::test]
    async fn test_non_object_is_parse_error() {
        let (endpoint, mut peer, _) = pair();

        peer.send_raw(b"[1,2,3]").await;
        assert_eq!(peer.recv().await.unwrap()["error"]["code"], -32700);
        assert_eq!(peer.recv().await, None);
        assert!(!endpoint.is_active());
    }

    #[tokio::test]
    async fn test_close_drains_pending() {
        let (endpoint, mut peer, _) = pair();

        let a = endpoint.request("a", Params::default()).unwrap();
        let b = endpoint.request("b", Params::default()).unwrap();
        endpoint.close();

        for handle in [a, b] {
            let err = handle.await.unwrap_err();
            assert_eq!(err.connection(), Some(&ConnectionError::Closed));
        }
        assert_eq!(endpoint.state(), ConnectionState::Failed(ConnectionError::Closed));

        // Later calls fail without touching the stream
        let err = endpoint.request("c", Params::default()).err().unwrap();
        assert_eq!(err.connection(), Some(&ConnectionError::Closed));
        let err = endpoint.notify("d", Params::default()).unwrap_err();
        assert_eq!(err.connection(), Some(&ConnectionError::Closed));

        peer.recv().await.unwrap();
        peer.recv().await.unwrap();
        assert_eq!(peer.recv().await, None);
    }

    #[tokio::test]
    async fn test_peer_close_drains_pending() {
        let (endpoint, mut peer, _) = pair();

        let handle = endpoint.request("foo", Params::default()).unwrap();
        peer.recv().await.unwrap();
        drop(peer);

        let err = handle.await.unwrap_err();
        assert_eq!(err.connection(), Some(&ConnectionError::PeerClosed));
        assert_eq!(endpoint.closed().await, ConnectionError::PeerClosed);
    }

    #[tokio::test]
    async fn test_error_reconstruction_by_code() {
        let (endpoint, mut peer, _) = pair();

        for (code, kind) in [
            (json!(-32601), ErrorKind::MethodNotFound),
            (json!(-32602), ErrorKind::InvalidParams),
            (json!(-32050), ErrorKind::ServerError),
            (json!("-32098"), ErrorKind::ServerError),
            (json!(42), ErrorKind::ApplicationError),
        ] {
            let handle = endpoint.request("foo", Params::default()).unwrap();
            let id = peer.recv().await.unwrap()["id"].clone();
            peer.send(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": code, "message": "nope", "data": {"x": 1}}
            }))
            .await;

            let err = handle.await.unwrap_err();
            let rpc = err.rpc().unwrap();
            assert_eq!(rpc.kind(), kind, "{code}");
            assert_eq!(rpc.object().unwrap().message, "nope");
            assert_eq!(rpc.data(), Some(&json!({"x": 1})));
        }
    }

    #[tokio::test]
    async fn test_malformed_response_fails_caller() {
        let (endpoint, mut peer, _) = pair();

        let handle = endpoint.request("foo", Params::default()).unwrap();
        peer.recv().await.unwrap();
        peer.send(json!({"jsonrpc": "2.0", "id": "1", "error": {"code": "x"}}))
            .await;

        let err = handle.await.unwrap_err();
        assert_eq!(err.rpc().unwrap().kind(), ErrorKind::InvalidResponse);
        assert!(endpoint.is_active());
    }

    #[tokio::test]
    async fn test_serves_positional_request() {
        let (_endpoint, mut peer, _) = pair();

        peer.send(json!({"jsonrpc": "2.0", "id": "7", "method": "baz", "params": [1, 2]}))
            .await;
        assert_eq!(
            peer.recv().await.unwrap(),
            json!({"jsonrpc": "2.0", "id": "7", "result": [2, 1]})
        );
    }

    #[tokio::test]
    async fn test_integer_id_is_echoed() {
        let (_endpoint, mut peer, _) = pair();

        peer.send(json!({"jsonrpc": "2.0", "id": 5, "method": "echo", "params": {"a": 1}}))
            .await;
        assert_eq!(
            peer.recv().await.unwrap(),
            json!({"jsonrpc": "2.0", "id": 5, "result": {"a": 1}})
        );
    }

    #[tokio::test]
    async fn test_replies_complete_out_of_order() {
        let (_endpoint, mut peer, _) = pair();

        peer.send(json!({"jsonrpc": "2.0", "id": "a", "method": "slow", "params": [300]}))
            .await;
        peer.send(json!({"jsonrpc": "2.0", "id": "b", "method": "slow", "params": [1]}))
            .await;

        assert_eq!(peer.recv().await.unwrap()["id"], "b");
        assert_eq!(peer.recv().await.unwrap()["id"], "a");
    }

    #[tokio::test]
    async fn test_method_not_found() {
        let (_endpoint, mut peer, _) = pair();

        // Notification: reported, nothing sent
        peer.send(json!({"jsonrpc": "2.0", "method": "missing"})).await;
        peer.send(json!({"jsonrpc": "2.0", "id": "1", "method": "missing"}))
            .await;

        let reply = peer.recv().await.unwrap();
        assert_eq!(reply["id"], "1");
        assert_eq!(reply["error"]["code"], -32601);
        assert_eq!(reply["error"]["message"], "Method not found");
        assert_eq!(reply["error"]["data"]["method"], "missing");
    }

    #[tokio::test]
    async fn test_binding_failure_is_invalid_params() {
        let (_endpoint, mut peer, _) = pair();

        peer.send(json!({"jsonrpc": "2.0", "id": "1", "method": "baz", "params": [1]}))
            .await;
        let reply = peer.recv().await.unwrap();
        assert_eq!(reply["error"]["code"], -32602);
        assert_eq!(reply["error"]["data"]["exception"], "TypeError");
    }

    #[tokio::test]
    async fn test_handler_failure_is_internal_error() {
        let (endpoint, mut peer, _) = pair();

        peer.send(json!({"jsonrpc": "2.0", "id": "1", "method": "boom"}))
            .await;
        let reply = peer.recv().await.unwrap();
        assert_eq!(reply["id"], "1");
        assert_eq!(reply["error"]["code"], -32603);
        assert_eq!(reply["error"]["message"], "Internal error");
        assert_eq!(reply["error"]["data"]["exception"], "ValueError");
        assert_eq!(reply["error"]["data"]["message"], "bigboom");
        assert!(endpoint.is_active());
    }

    #[tokio::test]
    async fn test_handler_panic_is_internal_error() {
        let (endpoint, mut peer, _) = pair();

        peer.send(json!({"jsonrpc": "2.0", "id": "1", "method": "explode"}))
            .await;
        let reply = peer.recv().await.unwrap();
        assert_eq!(reply["error"]["code"], -32603);
        assert_eq!(reply["error"]["data"]["exception"], "panic");
        assert_eq!(reply["error"]["data"]["message"], "kaboom");
        assert!(endpoint.is_active());
    }

    #[tokio::test]
    async fn test_invalid_request() {
        let (_endpoint, mut peer, _) = pair();

        peer.send(json!({"id": 12})).await;
        let reply = peer.recv().await.unwrap();
        assert_eq!(reply["id"], 12);
        assert_eq!(reply["error"]["code"], -32600);
        assert_eq!(reply["error"]["data"]["reason"], "jsonrpc");

        peer.send(json!({"jsonrpc": "2.0", "id": "2", "method": "echo", "params": 3}))
            .await;
        let reply = peer.recv().await.unwrap();
        assert_eq!(reply["id"], "2");
        assert_eq!(reply["error"]["data"]["reason"], "params");
    }

    #[tokio::test]
    async fn test_notification_runs_handler_without_reply() {
        let (_endpoint, mut peer, mut notes) = pair();

        peer.send(json!({"jsonrpc": "2.0", "method": "record", "params": ["hi"]}))
            .await;
        assert_eq!(notes.recv().await.unwrap(), json!(["hi"]));

        // A failing notification is not answered either
        peer.send(json!({"jsonrpc": "2.0", "method": "boom"})).await;
        peer.send(json!({"jsonrpc": "2.0", "id": "1", "method": "echo"}))
            .await;
        assert_eq!(peer.recv().await.unwrap()["id"], "1");
    }

    #[tokio::test]
    async fn test_null_id_response_is_not_mirrored() {
        let (endpoint, mut peer, _) = pair();

        peer.send(json!({
            "jsonrpc": "2.0",
            "id": null,
            "error": {"code": -32700, "message": "Parse error"}
        }))
        .await;
        peer.send(json!({"jsonrpc": "2.0", "id": "1", "method": "echo"}))
            .await;

        assert_eq!(peer.recv().await.unwrap()["id"], "1");
        assert!(endpoint.is_active());
    }

    #[tokio::test]
    async fn test_cancel_makes_late_response_unsolicited() {
        let (endpoint, mut peer, _) = pair();

        let handle = endpoint.request("foo", Params::default()).unwrap();
        peer.recv().await.unwrap();

        handle.cancel();
        assert!(matches!(handle.await, Err(CallError::Cancelled)));
        assert_eq!(endpoint.pending_count(), 0);

        peer.send(json!({"jsonrpc": "2.0", "id": "1", "result": 1})).await;
        let reply = peer.recv().await.unwrap();
        assert_eq!(reply["error"]["data"]["exception"], "UnsolicitedResponse");
    }

    #[tokio::test]
    async fn test_dropped_handle_leaves_table() {
        let (endpoint, _peer, _) = pair();

        let handle = endpoint.request("foo", Params::default()).unwrap();
        assert_eq!(endpoint.pending_count(), 1);
        drop(handle);
        assert_eq!(endpoint.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_two_endpoints_call_each_other() {
        let (notes_tx, _notes_rx) = mpsc::unbounded_channel();
        let (a, b) = tokio::io::duplex(64 * 1024);
        let factory = EndpointFactory::new(methods(notes_tx));
        let left = factory.build(a, "left");
        let right = factory.build(b, "right");

        let from_left = left.request("baz", json!([1, 2])).unwrap();
        let from_right = right.request("echo", json!({"k": "v"})).unwrap();

        assert_eq!(from_left.await.unwrap(), json!([2, 1]));
        assert_eq!(from_right.await.unwrap(), json!({"k": "v"}));

        let err = left.request("boom", Params::default()).unwrap().await.unwrap_err();
        assert_eq!(err.rpc().unwrap().kind(), ErrorKind::InternalError);

        left.close();
        assert_eq!(right.closed().await, ConnectionError::PeerClosed);
    }
}
