use std::time::Duration;

/// Largest accepted gap between a fix's timestamp and the wall clock.
pub const MAX_ALLOWED_DRIFT: Duration = Duration::from_millis(30_000);

/// Lower bound applied to any requested poll interval.
pub const MIN_LOCATION_INTERVAL_FLOOR: Duration = Duration::from_millis(1_000);

/// Upper bound for the poll interval and both windows (one year).
pub const MAX_WINDOW: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Operating parameters of the duty cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct DutyCycleConfig {
    /// Poll period inside the active window. Never below [`MIN_LOCATION_INTERVAL_FLOOR`].
    ///
    /// This and both windows are capped at [`MAX_WINDOW`].
    pub min_location_interval: Duration,

    /// Fixes closer than this to the last accepted one are dropped; `0` disables the check.
    pub min_location_distance_m: f64,

    /// How long listeners stay registered per cycle.
    pub active_window: Duration,

    /// How long listeners stay unregistered between windows.
    pub sleep_window: Duration,

    pub max_allowed_drift: Duration,
}

impl DutyCycleConfig {
    pub fn new(
        min_location_interval: Duration,
        min_location_distance_m: f64,
        active_window: Duration,
        sleep_window: Duration,
    ) -> Self {
        Self {
            min_location_interval: min_location_interval
                .clamp(MIN_LOCATION_INTERVAL_FLOOR, MAX_WINDOW),
            min_location_distance_m: min_location_distance_m.max(0.0),
            active_window: active_window.min(MAX_WINDOW),
            sleep_window: sleep_window.min(MAX_WINDOW),
            max_allowed_drift: MAX_ALLOWED_DRIFT,
        }
    }
}

impl Default for DutyCycleConfig {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(60),
            50.0,
            Duration::from_secs(30),
            Duration::from_secs(30),
        )
    }
}
