use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use cellmapper_lib::models::SignalStrengths;
use cellmapper_lib::{
    DutyCycleConfig, Environment, FixMailbox, LocationSample, LocationSource, Provider,
    RadioSignalTracker, RadioSource, SamplerContext, SamplerController, SamplerState,
    SamplingSettings, SettingsStore, TimeSeriesStore,
};

#[derive(Default)]
struct FakeLocation {
    fresh_gps: bool,
    unavailable: Option<Provider>,
    polls: Mutex<Vec<Provider>>,
    requested: Mutex<Vec<Provider>>,
    removed: Mutex<Vec<Provider>>,
}

impl FakeLocation {
    fn polls_of(&self, provider: Provider) -> usize {
        self.polls.lock().unwrap().iter().filter(|p| **p == provider).count()
    }
}

impl LocationSource for FakeLocation {
    fn last_known_location(&self, provider: Provider) -> Option<LocationSample> {
        self.polls.lock().unwrap().push(provider);
        if self.fresh_gps && provider == Provider::Gps {
            let mut fix = LocationSample::basic(
                Provider::Gps,
                Utc::now().timestamp_millis(),
                52.52,
                13.405,
                8.0,
            );
            fix.satellites = 6;
            Some(fix)
        } else {
            None
        }
    }

    fn request_updates(
        &self,
        provider: Provider,
        _min_interval: Duration,
        _min_distance_m: f64,
        _mailbox: FixMailbox,
    ) -> Result<()> {
        if self.unavailable == Some(provider) {
            bail!("provider {} does not exist", provider.as_str());
        }
        self.requested.lock().unwrap().push(provider);
        Ok(())
    }

    fn remove_updates(&self, provider: Provider) {
        self.removed.lock().unwrap().push(provider);
    }
}

#[derive(Default)]
struct FakeRadio {
    listens: AtomicUsize,
    stops: AtomicUsize,
}

impl RadioSource for FakeRadio {
    fn listen(&self, tracker: RadioSignalTracker) -> Result<()> {
        self.listens.fetch_add(1, Ordering::SeqCst);
        tracker.on_service_state_changed(Some("Carrier".into()));
        tracker.on_signal_strengths_changed(SignalStrengths {
            gsm_signal_strength: Some(14),
            ..SignalStrengths::default()
        });
        Ok(())
    }

    fn stop_listening(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeEnvironment {
    location_allowed: bool,
    airplane: AtomicBool,
}

impl Default for FakeEnvironment {
    fn default() -> Self {
        Self {
            location_allowed: true,
            airplane: AtomicBool::new(false),
        }
    }
}

impl Environment for FakeEnvironment {
    fn is_airplane_mode_on(&self) -> bool {
        self.airplane.load(Ordering::SeqCst)
    }
    fn is_gps_enabled(&self) -> bool {
        true
    }
    fn is_location_providing_allowed(&self) -> bool {
        self.location_allowed
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    location: Arc<FakeLocation>,
    radio: Arc<FakeRadio>,
    controller: SamplerController,
}

fn harness(location: FakeLocation, environment: FakeEnvironment) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = TimeSeriesStore::new(dir.path().join("CellMapper.sqlite3"));
    let location = Arc::new(location);
    let radio = Arc::new(FakeRadio::default());
    let ctx = SamplerContext::new(
        store,
        location.clone(),
        radio.clone(),
        Arc::new(environment),
    );

    Harness {
        _dir: dir,
        location,
        radio,
        controller: SamplerController::new(ctx),
    }
}

fn config(active_ms: u64, interval_ms: u64, sleep_ms: u64) -> DutyCycleConfig {
    DutyCycleConfig::new(
        Duration::from_millis(interval_ms),
        0.0,
        Duration::from_millis(active_ms),
        Duration::from_millis(sleep_ms),
    )
}

#[tokio::test(start_paused = true)]
async fn active_window_polls_three_times_before_sleeping() {
    let mut h = harness(FakeLocation::default(), FakeEnvironment::default());
    let mut states = h.controller.subscribe();

    h.controller.start(config(3_000, 1_000, 5_000)).await.unwrap();
    states
        .wait_for(|state| *state == SamplerState::Sleeping)
        .await
        .unwrap();

    assert_eq!(h.location.polls_of(Provider::Network), 3);
    assert_eq!(h.location.polls_of(Provider::Gps), 3);
    assert_eq!(h.radio.listens.load(Ordering::SeqCst), 1);
    assert_eq!(h.radio.stops.load(Ordering::SeqCst), 1);
    assert_eq!(
        *h.location.removed.lock().unwrap(),
        *h.location.requested.lock().unwrap()
    );

    h.controller.stop().await.unwrap();
    assert_eq!(h.controller.state(), SamplerState::Stopped);
    assert_eq!(h.radio.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn sleep_window_leads_back_to_listening() {
    let mut h = harness(FakeLocation::default(), FakeEnvironment::default());
    let mut states = h.controller.subscribe();

    h.controller.start(config(3_000, 1_000, 5_000)).await.unwrap();
    states
        .wait_for(|state| *state == SamplerState::Sleeping)
        .await
        .unwrap();
    states
        .wait_for(|state| *state == SamplerState::Listening)
        .await
        .unwrap();

    assert_eq!(h.radio.listens.load(Ordering::SeqCst), 2);
    h.controller.stop().await.unwrap();
    assert_eq!(h.radio.stops.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn stop_while_listening_removes_listeners() {
    let mut h = harness(FakeLocation::default(), FakeEnvironment::default());
    let mut states = h.controller.subscribe();

    h.controller.start(config(60_000, 1_000, 60_000)).await.unwrap();
    states
        .wait_for(|state| *state == SamplerState::Listening)
        .await
        .unwrap();
    assert!(h.controller.is_running());

    h.controller.stop().await.unwrap();
    h.controller.stop().await.unwrap();

    assert!(!h.controller.is_running());
    assert_eq!(h.radio.stops.load(Ordering::SeqCst), 1);
    assert_eq!(
        *h.location.removed.lock().unwrap(),
        vec![Provider::Gps, Provider::Network]
    );
}

#[tokio::test(start_paused = true)]
async fn unavailable_provider_is_skipped() {
    let location = FakeLocation {
        unavailable: Some(Provider::Network),
        ..FakeLocation::default()
    };
    let mut h = harness(location, FakeEnvironment::default());
    let mut states = h.controller.subscribe();

    h.controller.start(config(2_000, 1_000, 60_000)).await.unwrap();
    states
        .wait_for(|state| *state == SamplerState::Sleeping)
        .await
        .unwrap();

    assert_eq!(*h.location.requested.lock().unwrap(), vec![Provider::Gps]);
    assert_eq!(*h.location.removed.lock().unwrap(), vec![Provider::Gps]);
    assert_eq!(h.location.polls_of(Provider::Gps), 2);
    h.controller.stop().await.unwrap();
}

#[tokio::test]
async fn start_refused_when_location_is_not_allowed() {
    let environment = FakeEnvironment {
        location_allowed: false,
        ..FakeEnvironment::default()
    };
    let mut h = harness(FakeLocation::default(), environment);

    assert!(h.controller.start(config(3_000, 1_000, 3_000)).await.is_err());
    assert!(!h.controller.is_running());
    assert_eq!(h.radio.listens.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn double_start_is_rejected() {
    let mut h = harness(FakeLocation::default(), FakeEnvironment::default());
    h.controller.start(config(3_000, 1_000, 3_000)).await.unwrap();
    assert!(h.controller.start(config(3_000, 1_000, 3_000)).await.is_err());
    h.controller.stop().await.unwrap();
}

#[tokio::test]
async fn accepted_fix_is_persisted_with_signal() {
    let location = FakeLocation {
        fresh_gps: true,
        ..FakeLocation::default()
    };
    let mut h = harness(location, FakeEnvironment::default());
    let store = h.controller.context().store.clone();

    h.controller.start(config(30_000, 1_000, 30_000)).await.unwrap();

    let mut rows = 0;
    for _ in 0..100 {
        rows = store.row_count().await.unwrap();
        if rows > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    h.controller.stop().await.unwrap();
    assert!(rows >= 1);

    let dump = store.last_row_dump().await.unwrap();
    assert!(dump.contains("satellites:     6"));
    assert!(dump.contains("signalStrength: 14"));
    assert!(dump.contains("carrier:        Carrier"));
    store.close();
}

#[tokio::test(start_paused = true)]
async fn settings_change_restarts_sampler() {
    let dir = tempfile::tempdir().unwrap();
    let settings = SettingsStore::new(dir.path().join("settings.json")).unwrap();
    let h = harness(FakeLocation::default(), FakeEnvironment::default());
    let radio = h.radio.clone();
    let mut states = h.controller.subscribe();

    let cancel = CancellationToken::new();
    let supervisor = tokio::spawn(h.controller.supervise(settings.subscribe(), cancel.clone()));

    states
        .wait_for(|state| *state == SamplerState::Listening)
        .await
        .unwrap();
    assert_eq!(radio.listens.load(Ordering::SeqCst), 1);

    settings
        .update_sampling(SamplingSettings {
            update_duration_secs: 10,
            ..SamplingSettings::default()
        })
        .unwrap();

    while radio.listens.load(Ordering::SeqCst) < 2 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(radio.stops.load(Ordering::SeqCst), 1);

    cancel.cancel();
    supervisor.await.unwrap();
    assert_eq!(radio.stops.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn oversized_active_window_keeps_sampler_alive() {
    let mut h = harness(FakeLocation::default(), FakeEnvironment::default());
    let mut states = h.controller.subscribe();
    let config = SamplingSettings {
        update_duration_secs: u64::MAX,
        ..SamplingSettings::default()
    }
    .duty_cycle();

    h.controller.start(config).await.unwrap();
    states
        .wait_for(|state| *state == SamplerState::Listening)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(600)).await;

    assert!(h.controller.is_running());
    assert_eq!(h.controller.state(), SamplerState::Listening);
    assert!(h.location.polls_of(Provider::Gps) >= 10);

    h.controller.stop().await.unwrap();
    assert_eq!(h.radio.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn pushed_fixes_are_cleared_when_a_window_opens() {
    let mut h = harness(FakeLocation::default(), FakeEnvironment::default());
    let fixes = h.controller.context().fixes.clone();
    fixes.on_location_changed(LocationSample::basic(Provider::Gps, 1_000, 1.0, 1.0, 5.0));
    let mut states = h.controller.subscribe();

    h.controller.start(config(3_000, 1_000, 5_000)).await.unwrap();
    states
        .wait_for(|state| *state == SamplerState::Listening)
        .await
        .unwrap();

    assert_eq!(fixes.latest(Provider::Gps), None);
    h.controller.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn dropping_controller_cancels_the_loop() {
    let mut h = harness(FakeLocation::default(), FakeEnvironment::default());
    let mut states = h.controller.subscribe();

    h.controller.start(config(60_000, 1_000, 60_000)).await.unwrap();
    states
        .wait_for(|state| *state == SamplerState::Listening)
        .await
        .unwrap();

    drop(h.controller);
    states
        .wait_for(|state| *state == SamplerState::Stopped)
        .await
        .unwrap();

    assert_eq!(h.radio.stops.load(Ordering::SeqCst), 1);
    assert_eq!(
        *h.location.removed.lock().unwrap(),
        vec![Provider::Gps, Provider::Network]
    );
}

const BASE_TABLE_SQL: &str = "CREATE TABLE Base (time INTEGER PRIMARY KEY, accuracy REAL, \
     altitude REAL, satellites INTEGER, latitude REAL, longitude REAL, speed REAL, \
     cdmaDbm INTEGER, evdoDbm INTEGER, evdoSnr INTEGER, signalStrength INTEGER, carrier TEXT)";

#[tokio::test]
async fn failed_save_does_not_stop_polling() {
    let location = FakeLocation {
        fresh_gps: true,
        ..FakeLocation::default()
    };
    let mut h = harness(location, FakeEnvironment::default());
    let store = h.controller.context().store.clone();
    store.open().unwrap();
    let side = rusqlite::Connection::open(store.path()).unwrap();
    side.execute_batch("DROP TABLE Base").unwrap();

    h.controller.start(config(60_000, 1_000, 60_000)).await.unwrap();
    for _ in 0..100 {
        if h.location.polls_of(Provider::Gps) >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(h.location.polls_of(Provider::Gps) >= 2);
    assert!(h.controller.is_running());
    assert!(store.row_count().await.is_err());

    side.execute_batch(BASE_TABLE_SQL).unwrap();
    drop(side);

    let mut rows = 0;
    for _ in 0..100 {
        rows = store.row_count().await.unwrap_or(0);
        if rows > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    h.controller.stop().await.unwrap();
    assert!(rows >= 1);
}

#[tokio::test]
async fn stop_does_not_wait_for_a_blocked_save() {
    let location = FakeLocation {
        fresh_gps: true,
        ..FakeLocation::default()
    };
    let mut h = harness(location, FakeEnvironment::default());
    let store = h.controller.context().store.clone();
    store.open().unwrap();

    // holds the write lock so the sampler's insert waits on the busy timeout
    let side = rusqlite::Connection::open(store.path()).unwrap();
    side.execute_batch("BEGIN EXCLUSIVE").unwrap();

    h.controller.start(config(60_000, 1_000, 60_000)).await.unwrap();
    while h.location.polls_of(Provider::Gps) == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    let stopping = std::time::Instant::now();
    h.controller.stop().await.unwrap();
    assert!(stopping.elapsed() < Duration::from_secs(2));
    assert_eq!(h.radio.stops.load(Ordering::SeqCst), 1);

    side.execute_batch("ROLLBACK").unwrap();
}
