use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Convenience alias for UTC DT
pub type UtcDT = DateTime<Utc>;

/// A "part" of a location
pub type LocationComponent = f64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
/// A single position reported by a [crate::LocationProvider]. Never mutated once built, the
/// coordinator hands out copies.
pub struct Fix {
    /// Latitude in degrees
    pub lat: LocationComponent,
    /// Longitude in degrees
    pub long: LocationComponent,
    /// Horizontal accuracy radius in meters
    pub accuracy: LocationComponent,
    /// When the provider produced this fix
    pub timestamp: UtcDT,
    /// Altitude in meters, if the provider knows it
    pub altitude: Option<LocationComponent>,
    /// Vertical accuracy in meters
    pub altitude_accuracy: Option<LocationComponent>,
    /// Bearing in degrees, optional as GPS can't always determine
    pub heading: Option<LocationComponent>,
    /// Ground speed in meters per second
    pub speed: Option<LocationComponent>,
}

impl Fix {
    /// Create a fix with only the required components set
    pub fn new(
        lat: LocationComponent,
        long: LocationComponent,
        accuracy: LocationComponent,
        timestamp: UtcDT,
    ) -> Self {
        Self {
            lat,
            long,
            accuracy: accuracy.max(0.0),
            timestamp,
            altitude: None,
            altitude_accuracy: None,
            heading: None,
            speed: None,
        }
    }

    pub fn with_altitude(
        mut self,
        altitude: LocationComponent,
        accuracy: LocationComponent,
    ) -> Self {
        self.altitude = Some(altitude);
        self.altitude_accuracy = Some(accuracy.max(0.0));
        self
    }

    /// How old this fix is at `now`. Fixes stamped in the future count as brand new.
    pub fn age(&self, now: UtcDT) -> Duration {
        (now - self.timestamp).to_std().unwrap_or(Duration::ZERO)
    }

    /// Whether this fix is young enough to satisfy a request tolerating `maximum_age`
    pub fn is_fresh(&self, now: UtcDT, maximum_age: Duration) -> bool {
        self.age(now) <= maximum_age
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix_at(timestamp: UtcDT) -> Fix {
        Fix::new(37.0, -122.0, 5.0, timestamp)
    }

    #[test]
    fn test_age_of_past_fix() {
        let now = Utc::now();
        let fix = fix_at(now - chrono::Duration::seconds(30));
        assert_eq!(fix.age(now), Duration::from_secs(30));
    }

    #[test]
    fn test_future_fix_has_no_age() {
        let now = Utc::now();
        let fix = fix_at(now + chrono::Duration::seconds(30));
        assert_eq!(fix.age(now), Duration::ZERO);
        assert!(fix.is_fresh(now, Duration::ZERO));
    }

    #[test]
    fn test_freshness_boundary_is_inclusive() {
        let now = Utc::now();
        let fix = fix_at(now - chrono::Duration::seconds(60));
        assert!(fix.is_fresh(now, Duration::from_secs(60)));
        assert!(!fix.is_fresh(now, Duration::from_secs(59)));
    }

    #[test]
    fn test_negative_accuracy_clamped() {
        let fix = Fix::new(0.0, 0.0, -3.0, Utc::now()).with_altitude(12.0, -1.0);
        assert_eq!(fix.accuracy, 0.0);
        assert_eq!(fix.altitude, Some(12.0));
        assert_eq!(fix.altitude_accuracy, Some(0.0));
    }
}
