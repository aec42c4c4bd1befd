use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::TimeSeriesStore;
use crate::models::Provider;

use super::admission::{AdmissionResult, Rejection, SampleAdmission};
use super::config::{DutyCycleConfig, MAX_WINDOW};
use super::radio::RadioSignalTracker;
use super::source::{Environment, FixMailbox, LocationSource, RadioSource};

// Set to false to silence the per-tick chatter of this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const SAVE_TIMEOUT_SECS: u64 = 10;

/// Providers in registration order.
const PROVIDERS: [Provider; 2] = [Provider::Gps, Provider::Network];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SamplerState {
    Stopped,
    /// Listeners registered, polling every `min_location_interval`.
    Listening,
    /// Listeners unregistered until the sleep window ends.
    Sleeping,
}

/// Everything the duty cycle talks to.
#[derive(Clone)]
pub struct SamplerContext {
    pub store: TimeSeriesStore,
    pub location: Arc<dyn LocationSource>,
    pub radio: Arc<dyn RadioSource>,
    pub environment: Arc<dyn Environment>,
    pub tracker: RadioSignalTracker,
    pub fixes: FixMailbox,
}

impl SamplerContext {
    pub fn new(
        store: TimeSeriesStore,
        location: Arc<dyn LocationSource>,
        radio: Arc<dyn RadioSource>,
        environment: Arc<dyn Environment>,
    ) -> Self {
        Self {
            store,
            location,
            radio,
            environment,
            tracker: RadioSignalTracker::new(),
            fixes: FixMailbox::new(),
        }
    }
}

/// Listener registrations held for one active window. Whatever was added is
/// removed exactly once, at the latest when the guard is dropped.
struct ListenerRegistration<'a> {
    ctx: &'a SamplerContext,
    radio: bool,
    providers: Vec<Provider>,
}

impl<'a> ListenerRegistration<'a> {
    fn new(ctx: &'a SamplerContext) -> Self {
        Self {
            ctx,
            radio: false,
            providers: Vec::with_capacity(PROVIDERS.len()),
        }
    }

    fn is_registered(&self) -> bool {
        self.radio || !self.providers.is_empty()
    }

    fn register(&mut self, config: &DutyCycleConfig) {
        if self.is_registered() {
            return;
        }
        log_info!("add listeners");

        match self.ctx.radio.listen(self.ctx.tracker.clone()) {
            Ok(()) => self.radio = true,
            Err(err) => log_warn!("radio state listener unavailable: {err:#}"),
        }

        for provider in PROVIDERS {
            let requested = self.ctx.location.request_updates(
                provider,
                config.min_location_interval,
                config.min_location_distance_m,
                self.ctx.fixes.clone(),
            );
            match requested {
                Ok(()) => self.providers.push(provider),
                Err(err) => log_warn!(
                    "{} provider is unavailable, continuing without it: {err:#}",
                    provider.as_str()
                ),
            }
        }
    }

    fn unregister(&mut self) {
        if !self.is_registered() {
            return;
        }
        log_info!("remove listeners");

        for provider in self.providers.drain(..) {
            self.ctx.location.remove_updates(provider);
        }
        if self.radio {
            self.ctx.radio.stop_listening();
            self.radio = false;
        }
    }
}

impl Drop for ListenerRegistration<'_> {
    fn drop(&mut self) {
        self.unregister();
    }
}

/// Alternates active and sleep windows until `cancel_token` fires.
///
/// The signal tracker and the pushed fixes are reset at the start of every
/// active window so a row never pairs a fix with a reading from an earlier window.
pub async fn duty_cycle_loop(
    ctx: SamplerContext,
    config: DutyCycleConfig,
    state_tx: Arc<watch::Sender<SamplerState>>,
    cancel_token: CancellationToken,
) {
    let run_id = Uuid::new_v4();
    log_info!("duty cycle {run_id} starting with {config:?}");

    let mut admission = SampleAdmission::new(&config);
    let mut registration = ListenerRegistration::new(&ctx);

    loop {
        log_info!("start location listening");
        ctx.tracker.reset();
        ctx.fixes.clear();
        registration.register(&config);
        state_tx.send_replace(SamplerState::Listening);

        let window_done = listen(&ctx, &config, &mut admission, &cancel_token).await;
        if !window_done {
            break;
        }

        registration.unregister();
        state_tx.send_replace(SamplerState::Sleeping);
        log_debug!(
            "wait for next iteration in {}ms with updates disabled",
            config.sleep_window.as_millis()
        );

        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = time::sleep(config.sleep_window) => {}
        }
    }

    registration.unregister();
    state_tx.send_replace(SamplerState::Stopped);
    log_info!("duty cycle {run_id} stopped");
}

/// Polls until the active window closes (`true`) or the token is cancelled (`false`).
async fn listen(
    ctx: &SamplerContext,
    config: &DutyCycleConfig,
    admission: &mut SampleAdmission,
    cancel_token: &CancellationToken,
) -> bool {
    let now = Instant::now();
    let window_end = now
        .checked_add(config.active_window)
        .unwrap_or_else(|| now + MAX_WINDOW);
    let mut ticker = time::interval(config.min_location_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => return false,
            _ = time::sleep_until(window_end) => return true,
            _ = ticker.tick() => {}
        }

        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => return false,
            _ = poll_once(ctx, admission) => {}
        }
    }
}

async fn poll_once(ctx: &SamplerContext, admission: &mut SampleAdmission) {
    log_debug!("request location update");

    let network = ctx
        .fixes
        .freshest(Provider::Network, ctx.location.last_known_location(Provider::Network));
    let gps = ctx
        .fixes
        .freshest(Provider::Gps, ctx.location.last_known_location(Provider::Gps));

    let now_ms = Utc::now().timestamp_millis();
    let best = admission.select_best_location(network.as_ref(), gps.as_ref(), now_ms);
    let signal = ctx.tracker.snapshot();

    match admission.admit(best.as_ref(), signal.as_ref(), ctx.environment.as_ref(), now_ms) {
        AdmissionResult::Accepted(record) => {
            let save = ctx.store.save(&record);
            if time::timeout(Duration::from_secs(SAVE_TIMEOUT_SECS), save)
                .await
                .is_err()
            {
                log_warn!(
                    "saving sample at {} timed out (> {}s)",
                    record.time_seconds,
                    SAVE_TIMEOUT_SECS
                );
            }
        }
        AdmissionResult::Rejected(Rejection::MissingLocation) => {
            log_debug!("no new location this tick");
        }
        AdmissionResult::Rejected(rejection) => {
            log_debug!("sample rejected: {rejection}");
        }
    }
}
