use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;

use crate::models::{CellLocation, DataConnectionState, SignalSnapshot, SignalStrengths};

/// Single-slot mailbox for radio state.
///
/// Each callback replaces the stored snapshot with a new one derived from the
/// previous value; readers take an owned copy at sampling time. No snapshot is
/// available until the first signal-strength report arrives.
#[derive(Clone, Default)]
pub struct RadioSignalTracker {
    slot: Arc<Mutex<Slot>>,
}

#[derive(Default)]
struct Slot {
    latest: SignalSnapshot,
    signal_reported: bool,
}

impl RadioSignalTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_signal_strengths_changed(&self, strengths: SignalStrengths) {
        debug!("signal strengths changed: {strengths:?}");
        let mut slot = lock(&self.slot);
        slot.latest = slot.latest.with_strengths(strengths);
        slot.signal_reported = true;
    }

    pub fn on_cell_location_changed(&self, cell: Option<CellLocation>) {
        self.update(|snapshot| snapshot.cell = cell);
    }

    pub fn on_data_connection_state_changed(&self, state: DataConnectionState) {
        self.update(|snapshot| snapshot.data_state = state);
    }

    /// Service state carries the operator name; `None` clears it.
    pub fn on_service_state_changed(&self, operator_name: Option<String>) {
        self.update(|snapshot| snapshot.carrier = operator_name.unwrap_or_default());
    }

    /// Owned copy of the latest state, `None` until a signal reading arrived.
    pub fn snapshot(&self) -> Option<SignalSnapshot> {
        let slot = lock(&self.slot);
        slot.signal_reported.then(|| slot.latest.clone())
    }

    /// Forgets everything reported so far.
    pub fn reset(&self) {
        *lock(&self.slot) = Slot::default();
    }

    fn update(&self, apply: impl FnOnce(&mut SignalSnapshot)) {
        let mut slot = lock(&self.slot);
        let mut next = slot.latest.clone();
        apply(&mut next);
        slot.latest = next;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
