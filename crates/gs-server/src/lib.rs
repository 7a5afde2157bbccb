//! gs-server: location server for GNSS Share
//!
//! The server accepts receiver connections, tracks each one as a session
//! with its own heartbeat bookkeeping, and fans every new position fix out
//! to all live sessions. Position ingestion runs only while someone is
//! listening, with a grace period to ride out quick reconnects.

pub mod bridge;
pub mod broadcast;
pub mod coordinator;
pub mod ingest;
pub mod server;
pub mod session;
pub mod source;

pub use broadcast::{Broadcaster, ResponseCache};
pub use coordinator::ServerSnapshot;
pub use server::{LinkServer, ServerHandle};
pub use session::{SessionCloseReason, SessionHandle, SessionRegistry};
