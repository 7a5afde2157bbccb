//! Position source abstraction
//!
//! The server does not acquire fixes itself. A `PositionSource` pushes
//! `PositionEvent`s into a `PositionSink` while started; the server only
//! controls when it runs.

use tokio::sync::mpsc;

use crate::error::ServerError;

/// A raw fix as delivered by the positioning hardware
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PositionFix {
    /// Fix time, milliseconds since the UNIX epoch
    pub timestamp: u64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub accuracy: Option<f32>,
    pub bearing: Option<f32>,
    pub speed: Option<f32>,
    pub vertical_accuracy: Option<f32>,
    pub bearing_accuracy: Option<f32>,
    pub speed_accuracy: Option<f32>,
    /// Provider name, e.g. "gps"
    pub provider: String,
}

/// Events a position source may emit
#[derive(Debug, Clone, PartialEq)]
pub enum PositionEvent {
    /// A new position fix
    Fix(PositionFix),
    /// The number of satellites currently visible changed
    Satellites(u32),
}

/// Cloneable handle a source uses to deliver events
#[derive(Debug, Clone)]
pub struct PositionSink {
    tx: mpsc::Sender<PositionEvent>,
}

impl PositionSink {
    /// Wrap a channel sender
    pub fn new(tx: mpsc::Sender<PositionEvent>) -> Self {
        Self { tx }
    }

    /// Deliver an event, waiting for queue space.
    ///
    /// Returns false once the server has stopped listening.
    pub async fn send(&self, event: PositionEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }
}

/// External producer of position events.
///
/// `start` and `stop` are called from the server's coordinator only, so
/// implementations never see concurrent calls.
pub trait PositionSource: Send {
    /// Begin delivering events into `sink`
    fn start(&mut self, sink: PositionSink) -> Result<(), ServerError>;

    /// Stop delivering events. Must be safe to call when not started.
    fn stop(&mut self);
}
