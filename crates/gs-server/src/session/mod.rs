//! Per-connection session management

mod client;
mod handle;
mod registry;

pub use client::{ClientSession, SessionContext};
pub use handle::{SessionCloseReason, SessionHandle};
pub use registry::SessionRegistry;
