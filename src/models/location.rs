//! Location fix data model.
//!
//! A single reading from one location provider, as handed to us by the platform.

use geo::{HaversineDistance, Point};
use serde::{Deserialize, Serialize};

/// Platform location provider a fix originates from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Provider {
    Network,
    Gps,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Network => "network",
            Provider::Gps => "gps",
        }
    }
}

/// Point-in-time location fix. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub provider: Provider,
    /// Epoch milliseconds reported by the provider.
    pub timestamp_ms: i64,
    pub accuracy_m: f64,
    pub altitude_m: f64,
    /// 0 when the provider does not report satellites.
    pub satellites: u32,
    pub latitude: f64,
    pub longitude: f64,
    pub speed_mps: f64,
}

impl LocationSample {
    /// Minimal fix with unknown altitude, speed and satellites.
    pub fn basic(
        provider: Provider,
        timestamp_ms: i64,
        latitude: f64,
        longitude: f64,
        accuracy_m: f64,
    ) -> Self {
        Self {
            provider,
            timestamp_ms,
            accuracy_m,
            altitude_m: 0.0,
            satellites: 0,
            latitude,
            longitude,
            speed_mps: 0.0,
        }
    }

    /// Great-circle distance in metres.
    pub fn distance_to(&self, other: &LocationSample) -> f64 {
        self.point().haversine_distance(&other.point())
    }

    fn point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}
