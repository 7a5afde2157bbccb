//! Message types for the GNSS Share protocol
//!
//! The server pushes `ServerResponse` frames: either a human-readable
//! status line or a full `LocationUpdate`. Receiving one supersedes the
//! previous one regardless of variant.
//!
//! # Optional fields
//!
//! Altitude, accuracy, bearing, speed and the accuracy variants are
//! `Option`s. Absence is meaningful (the fix simply did not carry that
//! value) and must survive encoding; receivers never substitute zero.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single position fix as seen by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdate {
    /// Fix time, milliseconds since the UNIX epoch
    pub timestamp: u64,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Altitude above the WGS84 ellipsoid in meters
    pub altitude: Option<f64>,
    /// Horizontal accuracy in meters
    pub accuracy: Option<f32>,
    /// Bearing in degrees
    pub bearing: Option<f32>,
    /// Speed in meters per second
    pub speed: Option<f32>,
    /// Satellites reported by the receiver when the fix was encoded
    pub satellites: u32,
    /// Name of the provider that produced the fix
    pub provider: String,
    /// Seconds between the fix and the moment it was encoded
    pub location_age: f32,
    /// Vertical accuracy in meters
    pub vertical_accuracy: Option<f32>,
    /// Bearing accuracy in degrees
    pub bearing_accuracy: Option<f32>,
    /// Speed accuracy in meters per second
    pub speed_accuracy: Option<f32>,
}

impl LocationUpdate {
    /// Create an update carrying only the required fields
    pub fn new(timestamp: u64, latitude: f64, longitude: f64, provider: impl Into<String>) -> Self {
        Self {
            timestamp,
            latitude,
            longitude,
            altitude: None,
            accuracy: None,
            bearing: None,
            speed: None,
            satellites: 0,
            provider: provider.into(),
            location_age: 0.0,
            vertical_accuracy: None,
            bearing_accuracy: None,
            speed_accuracy: None,
        }
    }

    /// Age of the fix relative to `now_millis`, in seconds
    pub fn age_at(&self, now_millis: u64) -> f32 {
        now_millis.saturating_sub(self.timestamp) as f32 / 1000.0
    }
}

/// Status values the server publishes while it has no fix to send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    /// Server started, ingestion never ran
    Uninitialized,
    /// Ingestion running, no fix yet
    AwaitingLocation,
    /// Ingestion stopped after the last receiver left
    LocationStopped,
}

impl ServerStatus {
    /// Text carried on the wire for this status
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerStatus::Uninitialized => "Uninitialized",
            ServerStatus::AwaitingLocation => "Waiting for location...",
            ServerStatus::LocationStopped => "Location updates stopped",
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frame payload pushed from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerResponse {
    /// Human-readable server state
    Status(String),
    /// Latest position fix
    LocationUpdate(LocationUpdate),
}

impl ServerResponse {
    /// Build a status response from a well-known status
    pub fn status(status: ServerStatus) -> Self {
        ServerResponse::Status(status.as_str().to_string())
    }

    /// Whether this response carries a position
    pub fn has_location(&self) -> bool {
        matches!(self, ServerResponse::LocationUpdate(_))
    }

    /// The carried position, if any
    pub fn location(&self) -> Option<&LocationUpdate> {
        match self {
            ServerResponse::LocationUpdate(update) => Some(update),
            ServerResponse::Status(_) => None,
        }
    }
}

impl From<LocationUpdate> for ServerResponse {
    fn from(update: LocationUpdate) -> Self {
        ServerResponse::LocationUpdate(update)
    }
}
