//! Conversion of position-source events into outbound frames

use gs_core::traits::{PositionEvent, PositionFix};
use gs_protocol::{LocationUpdate, ServerResponse};

/// Tracks the satellite count and last fix so each new fix can be turned
/// into a complete `LocationUpdate`
#[derive(Debug, Default)]
pub struct LocationBridge {
    satellites: u32,
    last_fix: Option<u64>,
}

impl LocationBridge {
    /// Create a bridge with no fix and zero satellites
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a source event. Returns the response to broadcast, if any.
    pub fn on_event(&mut self, event: PositionEvent, now_millis: u64) -> Option<ServerResponse> {
        match event {
            PositionEvent::Satellites(count) => {
                self.satellites = count;
                None
            }
            PositionEvent::Fix(fix) => {
                self.last_fix = Some(fix.timestamp);
                Some(self.to_update(fix, now_millis).into())
            }
        }
    }

    /// Build the wire value for `fix`; the age is fixed at this point
    pub fn to_update(&self, fix: PositionFix, now_millis: u64) -> LocationUpdate {
        let mut update = LocationUpdate::new(fix.timestamp, fix.latitude, fix.longitude, fix.provider);
        update.altitude = fix.altitude;
        update.accuracy = fix.accuracy;
        update.bearing = fix.bearing;
        update.speed = fix.speed;
        update.vertical_accuracy = fix.vertical_accuracy;
        update.bearing_accuracy = fix.bearing_accuracy;
        update.speed_accuracy = fix.speed_accuracy;
        update.satellites = self.satellites;
        update.location_age = update.age_at(now_millis);
        update
    }

    /// Satellites last reported by the source
    pub fn satellites(&self) -> u32 {
        self.satellites
    }

    /// Timestamp of the last fix seen
    pub fn last_fix(&self) -> Option<u64> {
        self.last_fix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(timestamp: u64) -> PositionFix {
        PositionFix {
            timestamp,
            latitude: 55.75,
            longitude: 37.62,
            altitude: Some(0.0),
            speed: Some(12.5),
            provider: "gps".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_fix_carries_satellites_and_age() {
        let mut bridge = LocationBridge::new();
        assert!(bridge.on_event(PositionEvent::Satellites(9), 0).is_none());

        let response = bridge
            .on_event(PositionEvent::Fix(fix(10_000)), 12_500)
            .unwrap();
        let update = response.location().unwrap();

        assert_eq!(update.satellites, 9);
        assert_eq!(update.location_age, 2.5);
        assert_eq!(update.provider, "gps");
        assert_eq!(bridge.last_fix(), Some(10_000));
    }

    #[test]
    fn test_absent_fields_stay_absent() {
        let bridge = LocationBridge::new();
        let update = bridge.to_update(fix(1), 1);

        // Zero altitude is present, not absent
        assert_eq!(update.altitude, Some(0.0));
        assert_eq!(update.accuracy, None);
        assert_eq!(update.bearing_accuracy, None);
        assert_eq!(update.speed, Some(12.5));
    }

    #[test]
    fn test_fix_from_the_future_has_zero_age() {
        let bridge = LocationBridge::new();
        assert_eq!(bridge.to_update(fix(5_000), 1_000).location_age, 0.0);
    }
}
