//! Frame header encoding/decoding
//!
//! Every server frame starts with a 4-byte header:
//! - payload_length: 4 bytes (u32, big-endian)
//!
//! Heartbeats are not framed: the client sends the raw `HEARTBEAT_BYTE`.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::ProtocolError;

/// Size of the frame header in bytes
pub const HEADER_SIZE: usize = 4;

/// Maximum payload size. A location update is well under 200 bytes, so
/// anything near this limit indicates a corrupt stream.
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Sentinel byte sent by clients to signal liveness
pub const HEARTBEAT_BYTE: u8 = 0x01;

/// Frame header carrying the payload length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Length of the payload in bytes
    pub payload_length: u32,
}

impl FrameHeader {
    /// Create a new frame header
    pub fn new(payload_length: u32) -> Self {
        Self { payload_length }
    }

    /// Encode the header into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u32(self.payload_length);
    }

    /// Decode a header from a byte buffer
    ///
    /// Returns None if there aren't enough bytes in the buffer.
    /// Returns Err if the declared length exceeds `MAX_PAYLOAD_SIZE`; the
    /// buffer is left untouched in that case.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let declared = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if declared > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: declared,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let payload_length = src.get_u32();
        Ok(Some(Self { payload_length }))
    }
}
