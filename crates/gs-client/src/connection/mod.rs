//! Client connection lifecycle

mod link;
mod manager;
mod reconnect;
mod state;

pub use manager::{ConnectionHandle, ConnectionManager};
pub use reconnect::FixedDelay;
pub use state::{ConnectionState, ConnectionStatus};
