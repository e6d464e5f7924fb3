//! Encoder and decoder for framed JSON-RPC envelopes.

use crate::error::{ProtocolError, RpcError};
use crate::frame::Frame;
use crate::message::{Envelope, Params, Request, RequestId, Response};
use bytes::{Bytes, BytesMut};
use serde_json::Value;

/// Parses a frame payload into an envelope.
///
/// Fails with `ParseError` if the payload is not valid JSON or not a JSON
/// object.
pub fn decode(payload: &[u8]) -> Result<Envelope, RpcError> {
    match serde_json::from_slice::<Value>(payload) {
        Ok(Value::Object(fields)) => Ok(Envelope::new(fields)),
        Ok(_) | Err(_) => Err(RpcError::parse_error()),
    }
}

/// Encodes envelopes into length-prefixed frames.
pub struct Encoder;

impl Encoder {
    /// Encodes a request.
    pub fn encode_request(
        id: impl Into<RequestId>,
        method: &str,
        params: impl Into<Params>,
    ) -> Result<BytesMut, ProtocolError> {
        Self::encode_json(&Request::new(id, method).with_params(params))
    }

    /// Encodes a notification (a request without an id).
    pub fn encode_notification(
        method: &str,
        params: impl Into<Params>,
    ) -> Result<BytesMut, ProtocolError> {
        Self::encode_json(&Request::notification(method).with_params(params))
    }

    /// Encodes a success response.
    pub fn encode_response(id: RequestId, result: Value) -> Result<BytesMut, ProtocolError> {
        Self::encode_json(&Response::ok(id, result))
    }

    /// Encodes an error response. `id` is `None` when it could not be determined.
    pub fn encode_error(id: Option<RequestId>, error: &RpcError) -> Result<BytesMut, ProtocolError> {
        Self::encode_json(&Response::error(id, error))
    }

    /// Encodes any JSON-serializable value into a frame.
    pub fn encode_json<T: serde::Serialize>(value: &T) -> Result<BytesMut, ProtocolError> {
        let frame = Frame::from_json(value)?;
        frame.encode()
    }
}

/// Incremental frame decoder over a byte stream.
pub struct Decoder {
    buffer: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Appends bytes to the internal buffer.
    pub fn extend_bytes(&mut self, data: Bytes) {
        self.buffer.extend_from_slice(&data);
    }

    /// Attempts to decode the next frame from the buffer.
    pub fn decode_frame(&mut self) -> Option<Frame> {
        Frame::decode(&mut self.buffer)
    }

    /// Attempts to decode the next envelope from the buffer.
    ///
    /// `None` means more data is needed; `Some(Err(_))` is a complete frame
    /// whose payload failed to parse.
    pub fn decode_envelope(&mut self) -> Option<Result<Envelope, RpcError>> {
        self.decode_frame().map(|frame| decode(&frame.payload))
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
