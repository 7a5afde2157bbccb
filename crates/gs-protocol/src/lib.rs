//! gs-protocol: Wire protocol for GNSS Share
//!
//! This crate defines the binary protocol spoken between the location
//! server and its receivers: length-prefixed `ServerResponse` frames flowing
//! server to client, and a single-byte heartbeat flowing back.

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;

pub use codec::ResponseCodec;
pub use error::ProtocolError;
pub use frame::{FrameHeader, HEADER_SIZE, HEARTBEAT_BYTE, MAX_PAYLOAD_SIZE};
pub use message::{LocationUpdate, ServerResponse, ServerStatus};

/// Default TCP port the server listens on
pub const DEFAULT_PORT: u16 = 8887;
