//! Core trait definitions

mod position;
mod resolver;

pub use position::{PositionEvent, PositionFix, PositionSink, PositionSource};
pub use resolver::{AddressResolver, StaticResolver};
