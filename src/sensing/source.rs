//! Boundary to the platform: location providers, the radio, and device flags.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;

use crate::models::{LocationSample, Provider};

use super::radio::RadioSignalTracker;

/// Read-only device flags queried before starting and before admission.
pub trait Environment: Send + Sync {
    fn is_airplane_mode_on(&self) -> bool;
    fn is_gps_enabled(&self) -> bool;
    fn is_location_providing_allowed(&self) -> bool;
}

/// Location providers. Pushed updates are delivered into the given mailbox.
pub trait LocationSource: Send + Sync {
    fn last_known_location(&self, provider: Provider) -> Option<LocationSample>;

    /// Fails when the provider is unavailable (some emulators have no network provider).
    fn request_updates(
        &self,
        provider: Provider,
        min_interval: Duration,
        min_distance_m: f64,
        mailbox: FixMailbox,
    ) -> Result<()>;

    fn remove_updates(&self, provider: Provider);
}

/// Radio state callbacks (signal strength, cell location, data connection, service state).
pub trait RadioSource: Send + Sync {
    fn listen(&self, tracker: RadioSignalTracker) -> Result<()>;
    fn stop_listening(&self);
}

/// Latest fix pushed by each provider's update callback.
#[derive(Clone, Default)]
pub struct FixMailbox {
    slots: Arc<Mutex<HashMap<Provider, LocationSample>>>,
}

impl FixMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Location-update callback entry point. Callable from any thread.
    pub fn on_location_changed(&self, fix: LocationSample) {
        self.slots().insert(fix.provider, fix);
    }

    pub fn latest(&self, provider: Provider) -> Option<LocationSample> {
        self.slots().get(&provider).cloned()
    }

    /// The newer of the pushed fix and `pulled`.
    pub fn freshest(&self, provider: Provider, pulled: Option<LocationSample>) -> Option<LocationSample> {
        match (self.latest(provider), pulled) {
            (Some(pushed), Some(pulled)) if pushed.timestamp_ms > pulled.timestamp_ms => Some(pushed),
            (pushed, None) => pushed,
            (_, pulled) => pulled,
        }
    }

    pub fn clear(&self) {
        self.slots().clear();
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<Provider, LocationSample>> {
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freshest_prefers_newer_timestamp() {
        let mailbox = FixMailbox::new();
        assert_eq!(mailbox.freshest(Provider::Gps, None), None);

        let pushed = LocationSample::basic(Provider::Gps, 2_000, 1.0, 1.0, 5.0);
        mailbox.on_location_changed(pushed.clone());

        let older = LocationSample::basic(Provider::Gps, 1_000, 2.0, 2.0, 5.0);
        assert_eq!(mailbox.freshest(Provider::Gps, Some(older)), Some(pushed.clone()));

        let newer = LocationSample::basic(Provider::Gps, 3_000, 3.0, 3.0, 5.0);
        assert_eq!(mailbox.freshest(Provider::Gps, Some(newer.clone())), Some(newer));

        assert_eq!(mailbox.freshest(Provider::Gps, None), Some(pushed));
        assert_eq!(mailbox.latest(Provider::Network), None);

        mailbox.clear();
        assert_eq!(mailbox.latest(Provider::Gps), None);
    }
}
