//! Position ingestion lifecycle
//!
//! Ingestion starts when the first receiver connects. When the last one
//! leaves, a grace timer is armed instead of stopping right away; a new
//! receiver arriving in time cancels it. Each armed timer carries a
//! generation so an expiry that raced a cancel is ignored.

use std::time::Duration;

use tokio::sync::mpsc;

use gs_core::timer::{cancel_slot, TimerHandle};
use gs_core::traits::{PositionSink, PositionSource};
use gs_core::ServerError;
use gs_protocol::ServerStatus;

use crate::broadcast::Broadcaster;
use crate::coordinator::ServerEvent;

/// Starts and stops the position source on behalf of the coordinator
pub struct IngestionController {
    source: Box<dyn PositionSource>,
    sink: PositionSink,
    events: mpsc::Sender<ServerEvent>,
    grace_period: Duration,
    grace_timer: Option<TimerHandle>,
    generation: u64,
    active: bool,
}

impl IngestionController {
    pub fn new(
        source: Box<dyn PositionSource>,
        sink: PositionSink,
        events: mpsc::Sender<ServerEvent>,
        grace_period: Duration,
    ) -> Self {
        Self {
            source,
            sink,
            events,
            grace_period,
            grace_timer: None,
            generation: 0,
            active: false,
        }
    }

    /// Whether the source is currently running
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether a stop is pending
    pub fn grace_pending(&self) -> bool {
        self.grace_timer.is_some()
    }

    /// A receiver is listening: cancel any pending stop and make sure the
    /// source runs
    pub fn on_listener(&mut self, broadcaster: &Broadcaster) -> Result<(), ServerError> {
        if self.grace_timer.is_some() {
            tracing::debug!("Receiver returned within grace period, keeping ingestion");
            cancel_slot(&mut self.grace_timer);
        }

        if self.active {
            return Ok(());
        }

        self.source.start(self.sink.clone())?;
        self.active = true;
        broadcaster.set_status(ServerStatus::AwaitingLocation);
        tracing::info!("Position ingestion started");
        Ok(())
    }

    /// The last receiver left: arm the grace timer
    pub fn on_last_listener_left(&mut self) {
        if !self.active {
            return;
        }

        cancel_slot(&mut self.grace_timer);
        self.generation += 1;
        let generation = self.generation;
        let events = self.events.clone();

        tracing::debug!(
            "No receivers left, stopping ingestion in {:?}",
            self.grace_period
        );
        self.grace_timer = Some(TimerHandle::once(
            "ingestion-grace",
            self.grace_period,
            move || async move {
                let _ = events.send(ServerEvent::GraceExpired { generation }).await;
            },
        ));
    }

    /// Grace timer fired. Returns true if ingestion was stopped.
    pub fn on_grace_expired(&mut self, generation: u64, broadcaster: &Broadcaster) -> bool {
        if generation != self.generation || self.grace_timer.is_none() {
            tracing::trace!("Ignoring stale grace expiry {}", generation);
            return false;
        }

        self.grace_timer = None;
        self.stop(broadcaster);
        true
    }

    /// Stop the source now
    pub fn stop(&mut self, broadcaster: &Broadcaster) {
        cancel_slot(&mut self.grace_timer);
        if !self.active {
            return;
        }

        self.source.stop();
        self.active = false;
        broadcaster.set_status(ServerStatus::LocationStopped);
        tracing::info!("Position ingestion stopped");
    }
}
