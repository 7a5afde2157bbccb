//! gs-client: receiving side of GNSS Share
//!
//! A `ConnectionManager` keeps one connection to the server alive: it
//! resolves the server address, connects, sends heartbeats, checks the
//! socket's health and reconnects after a fixed delay whenever the network
//! is available. Everything the consumer needs to know arrives as a
//! `LinkEvent`.

pub mod bridge;
pub mod connection;
pub mod event;
pub mod resolver;

pub use connection::{ConnectionHandle, ConnectionManager, ConnectionState, ConnectionStatus};
pub use event::LinkEvent;
