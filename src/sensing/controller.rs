use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::{error, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::settings::SamplingSettings;

use super::config::DutyCycleConfig;
use super::loop_worker::{duty_cycle_loop, SamplerContext, SamplerState};

/// Owns the duty-cycle task: at most one runs at a time. Dropping the
/// controller cancels the task, which then removes its listeners on its own.
pub struct SamplerController {
    ctx: SamplerContext,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    state_tx: Arc<watch::Sender<SamplerState>>,
}

impl SamplerController {
    pub fn new(ctx: SamplerContext) -> Self {
        let (state_tx, _) = watch::channel(SamplerState::Stopped);
        Self {
            ctx,
            handle: None,
            cancel_token: None,
            state_tx: Arc::new(state_tx),
        }
    }

    pub fn context(&self) -> &SamplerContext {
        &self.ctx
    }

    pub fn state(&self) -> SamplerState {
        *self.state_tx.borrow()
    }

    /// Receiver for state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SamplerState> {
        self.state_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub async fn start(&mut self, config: DutyCycleConfig) -> Result<()> {
        if self.handle.is_some() {
            bail!("sampling already active");
        }

        let environment = &self.ctx.environment;
        if !environment.is_location_providing_allowed() {
            bail!("location providing is not allowed on this device");
        }
        if !environment.is_gps_enabled() {
            warn!("GPS is disabled; sampling with the network provider only");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(duty_cycle_loop(
            self.ctx.clone(),
            config,
            Arc::clone(&self.state_tx),
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Cancels the loop and waits until its listeners are gone. No-op when stopped.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        let joined = match self.handle.take() {
            Some(handle) => handle.await.context("sampling loop task failed to join"),
            None => Ok(()),
        };
        self.state_tx.send_replace(SamplerState::Stopped);
        joined
    }

    /// Full stop followed by a start with `config`; there is no partial reconfiguration.
    pub async fn restart(&mut self, config: DutyCycleConfig) -> Result<()> {
        self.stop().await?;
        self.start(config).await
    }

    /// Runs the sampler until `cancel_token` fires, restarting it on every
    /// settings change. A failed start is logged and retried on the next change.
    pub async fn supervise(
        mut self,
        mut settings_rx: watch::Receiver<SamplingSettings>,
        cancel_token: CancellationToken,
    ) {
        let initial = settings_rx.borrow_and_update().duty_cycle();
        if let Err(err) = self.start(initial).await {
            error!("failed to start sampling: {err:#}");
        }

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                changed = settings_rx.changed() => {
                    if changed.is_err() {
                        info!("settings source closed; keeping current configuration");
                        cancel_token.cancelled().await;
                        break;
                    }

                    let config = settings_rx.borrow_and_update().duty_cycle();
                    info!("sampling settings changed; restarting with {config:?}");
                    if let Err(err) = self.restart(config).await {
                        error!("failed to restart sampling: {err:#}");
                    }
                }
            }
        }

        if let Err(err) = self.stop().await {
            error!("failed to stop sampling: {err:#}");
        }
    }
}

impl Drop for SamplerController {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
    }
}
