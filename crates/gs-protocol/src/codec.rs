//! Tokio codec for length-prefixed server responses

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::frame::{FrameHeader, MAX_PAYLOAD_SIZE};
use crate::message::ServerResponse;

/// Codec for encoding/decoding `ServerResponse` frames
#[derive(Debug, Default)]
pub struct ResponseCodec {
    /// Current header being decoded (if any)
    pending_header: Option<FrameHeader>,
}

impl ResponseCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            pending_header: None,
        }
    }
}

impl Decoder for ResponseCodec {
    type Item = ServerResponse;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let header = match self.pending_header.take() {
            Some(h) => h,
            None => match FrameHeader::decode(src)? {
                Some(h) => h,
                None => return Ok(None),
            },
        };

        let payload_len = header.payload_length as usize;
        if src.len() < payload_len {
            src.reserve(payload_len - src.len());
            self.pending_header = Some(header);
            return Ok(None);
        }

        let payload_bytes = src.split_to(payload_len).freeze();
        let response: ServerResponse = bincode::deserialize(&payload_bytes)?;

        Ok(Some(response))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(response) = self.decode(src)? {
            return Ok(Some(response));
        }

        if src.is_empty() && self.pending_header.is_none() {
            return Ok(None);
        }

        // Peer closed in the middle of a frame
        let expected = self
            .pending_header
            .map(|h| h.payload_length as usize)
            .unwrap_or(crate::frame::HEADER_SIZE);
        tracing::debug!(expected, buffered = src.len(), "EOF inside a frame");
        Err(ProtocolError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!(
                "connection closed mid-frame: expected {} bytes, got {}",
                expected,
                src.len()
            ),
        )))
    }
}

impl Encoder<ServerResponse> for ResponseCodec {
    type Error = ProtocolError;

    fn encode(&mut self, response: ServerResponse, dst: &mut BytesMut) -> Result<(), Self::Error> {
        Encoder::<&ServerResponse>::encode(self, &response, dst)
    }
}

impl<'a> Encoder<&'a ServerResponse> for ResponseCodec {
    type Error = ProtocolError;

    fn encode(&mut self, response: &'a ServerResponse, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = bincode::serialize(response)?;
        let payload_len = payload.len();

        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        FrameHeader::new(payload_len as u32).encode(dst);
        dst.extend_from_slice(&payload);

        Ok(())
    }
}
