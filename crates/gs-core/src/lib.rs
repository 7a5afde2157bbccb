//! gs-core: Core abstractions and configuration for GNSS Share
//!
//! This crate provides shared configuration, error types, timer handles
//! and the traits behind which the link layer reaches its external
//! collaborators (position sources and address resolution).

pub mod config;
pub mod error;
pub mod gateway;
pub mod time;
pub mod timer;
pub mod traits;

pub use error::{ConfigError, ConnectionError, ServerError};
pub use timer::TimerHandle;
