//! Fix arbitration and the final gate in front of the store.
//!
//! Every rejection here is an expected outcome, not a failure: the candidate is
//! simply not persisted.

use std::fmt;

use log::{debug, warn};

use crate::db::PersistedRecord;
use crate::models::{LocationSample, SignalSnapshot};

use super::config::DutyCycleConfig;
use super::source::Environment;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    MissingLocation,
    MissingSignal,
    /// Older than the allowed drift when compared with the wall clock.
    TooOld { age_ms: i64 },
    TooClose { distance_m: f64 },
    AirplaneMode,
    /// Timestamp too far from the wall clock in either direction.
    ClockDrift { drift_ms: i64 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MissingLocation => write!(f, "no location"),
            Rejection::MissingSignal => write!(f, "no signal reading yet"),
            Rejection::TooOld { age_ms } => write!(f, "fix is {age_ms}ms old"),
            Rejection::TooClose { distance_m } => {
                write!(f, "fix is only {distance_m:.1}m from the last accepted one")
            }
            Rejection::AirplaneMode => write!(f, "airplane mode is on"),
            Rejection::ClockDrift { drift_ms } => write!(f, "fix drifts {drift_ms}ms from now"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionResult {
    Accepted(PersistedRecord),
    Rejected(Rejection),
}

/// Stateful arbiter: remembers the last accepted fix so each decision is made
/// relative to what was accepted, not to what was merely seen.
#[derive(Debug, Clone)]
pub struct SampleAdmission {
    min_distance_m: f64,
    max_drift_ms: i64,
    last_accepted: Option<LocationSample>,
}

impl SampleAdmission {
    pub fn new(config: &DutyCycleConfig) -> Self {
        Self {
            min_distance_m: config.min_location_distance_m,
            max_drift_ms: i64::try_from(config.max_allowed_drift.as_millis()).unwrap_or(i64::MAX),
            last_accepted: None,
        }
    }

    pub fn last_accepted(&self) -> Option<&LocationSample> {
        self.last_accepted.as_ref()
    }

    /// Picks the better of the network and GPS fixes after filtering each one.
    ///
    /// The more accurate survivor wins; equal accuracy goes to GPS. The winner
    /// becomes the new last accepted fix. With no survivor the last accepted fix
    /// is left untouched and `None` is returned.
    pub fn select_best_location(
        &mut self,
        network: Option<&LocationSample>,
        gps: Option<&LocationSample>,
        now_ms: i64,
    ) -> Option<LocationSample> {
        let network = self.surviving(network, now_ms);
        let gps = self.surviving(gps, now_ms);

        let winner = match (network, gps) {
            (None, None) => return None,
            (Some(network), None) => network,
            (None, Some(gps)) => gps,
            (Some(network), Some(gps)) => {
                if gps.accuracy_m <= network.accuracy_m {
                    gps
                } else {
                    network
                }
            }
        };

        self.last_accepted = Some(winner.clone());
        Some(winner.clone())
    }

    /// Last check before a fix and signal pair becomes a stored row.
    pub fn admit(
        &self,
        location: Option<&LocationSample>,
        signal: Option<&SignalSnapshot>,
        environment: &dyn Environment,
        now_ms: i64,
    ) -> AdmissionResult {
        let Some(location) = location else {
            return AdmissionResult::Rejected(Rejection::MissingLocation);
        };
        let Some(signal) = signal else {
            debug!("dropping fix at {}: no signal yet", location.timestamp_ms);
            return AdmissionResult::Rejected(Rejection::MissingSignal);
        };

        if environment.is_airplane_mode_on() {
            debug!("dropping fix at {}: airplane mode", location.timestamp_ms);
            return AdmissionResult::Rejected(Rejection::AirplaneMode);
        }

        let drift_ms = now_ms.saturating_sub(location.timestamp_ms);
        if drift_ms.saturating_abs() > self.max_drift_ms {
            if drift_ms < 0 {
                warn!(
                    "fix from {} is {}ms in the future; ignoring",
                    location.provider.as_str(),
                    -drift_ms
                );
            } else {
                debug!("out of date fix ignored ({drift_ms}ms old)");
            }
            return AdmissionResult::Rejected(Rejection::ClockDrift { drift_ms });
        }

        AdmissionResult::Accepted(PersistedRecord::from_sample(location, signal))
    }

    fn surviving<'a>(
        &self,
        candidate: Option<&'a LocationSample>,
        now_ms: i64,
    ) -> Option<&'a LocationSample> {
        let candidate = candidate?;
        match self.check(candidate, now_ms) {
            Ok(()) => Some(candidate),
            Err(rejection) => {
                debug!("{} fix rejected: {rejection}", candidate.provider.as_str());
                None
            }
        }
    }

    fn check(&self, candidate: &LocationSample, now_ms: i64) -> Result<(), Rejection> {
        let age_ms = now_ms.saturating_sub(candidate.timestamp_ms);
        if age_ms > self.max_drift_ms {
            return Err(Rejection::TooOld { age_ms });
        }

        if let Some(last) = &self.last_accepted {
            if self.min_distance_m > 0.0 {
                let distance_m = candidate.distance_to(last);
                if distance_m <= self.min_distance_m {
                    return Err(Rejection::TooClose { distance_m });
                }
            }
        }

        Ok(())
    }
}
