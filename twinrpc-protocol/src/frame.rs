//! Length-prefixed frame format.
//!
//! Frame layout:
//!
//! ```text
//! +-------------+---------------------------+
//! | payload_len | payload                   |
//! |   2 bytes   | payload_len bytes (JSON)  |
//! +-------------+---------------------------+
//! ```
//!
//! The length is an unsigned big-endian integer, so a single payload can
//! never exceed 65535 bytes.

use crate::error::ProtocolError;
use crate::MAX_PAYLOAD_SIZE;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 2;

/// A single framed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame payload (UTF-8 JSON).
    pub payload: Bytes,
}

impl Frame {
    /// Creates a new frame with the given payload.
    pub fn new(payload: Bytes) -> Self {
        Self { payload }
    }

    /// Creates a new frame from a JSON-serializable value.
    pub fn from_json<T: serde::Serialize>(value: &T) -> Result<Self, ProtocolError> {
        let payload = serde_json::to_vec(value)?;
        Ok(Self::new(Bytes::from(payload)))
    }

    /// Encodes the frame into bytes.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let payload_len = self.payload.len();
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload_len);
        buf.put_u16(payload_len as u16);
        buf.put_slice(&self.payload);
        Ok(buf)
    }

    /// Decodes a frame from bytes.
    ///
    /// Returns `Some(frame)` if a complete frame was decoded and `None` if
    /// more data is needed. Consumed bytes are removed from `buf`.
    pub fn decode(buf: &mut BytesMut) -> Option<Self> {
        if buf.len() < LENGTH_PREFIX_SIZE {
            return None;
        }

        let payload_len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
        if buf.len() < LENGTH_PREFIX_SIZE + payload_len {
            return None;
        }

        buf.advance(LENGTH_PREFIX_SIZE);
        let payload = buf.split_to(payload_len).freeze();
        Some(Self { payload })
    }
}
