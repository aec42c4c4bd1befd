//! Persisted sample data model.
//!
//! One row of the `Base` table: an admitted location fix joined with the radio
//! snapshot that was current when it was sampled.

use serde::{Deserialize, Serialize};

use crate::models::{LocationSample, SignalSnapshot};

/// Row keyed by whole seconds since the epoch. Saving a record whose key already
/// exists replaces the stored row completely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRecord {
    pub time_seconds: i64,
    pub accuracy: f64,
    pub altitude: f64,
    pub satellites: u32,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub cdma_dbm: Option<i32>,
    pub evdo_dbm: Option<i32>,
    pub evdo_snr: Option<i32>,
    pub signal_strength: Option<i32>,
    pub carrier: String,
}

impl PersistedRecord {
    pub fn from_sample(location: &LocationSample, signal: &SignalSnapshot) -> Self {
        Self {
            time_seconds: location.timestamp_ms.div_euclid(1000),
            accuracy: location.accuracy_m,
            altitude: location.altitude_m,
            satellites: location.satellites,
            latitude: location.latitude,
            longitude: location.longitude,
            speed: location.speed_mps,
            cdma_dbm: signal.cdma_dbm,
            evdo_dbm: signal.evdo_dbm,
            evdo_snr: signal.evdo_snr,
            signal_strength: signal.gsm_signal_strength,
            carrier: signal.carrier.clone(),
        }
    }
}
