//! Server-side campaign drivers.
//!
//! [`Orchestrator`] keeps at most one driver task per sending campaign. Each
//! driver calls [`CampaignEngine::dispatch`] and then waits the interval the
//! engine reported before the next call. Waits are cancellable; a batch that
//! is already sending always runs to completion.
//!
//! On boot and every `sweep_interval` the orchestrator adopts every `sending`
//! campaign without a driver, so progress survives restarts and clients that
//! disconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use clinic_core::types::DbId;
use clinic_db::models::status::CampaignStatus;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::engine::{CampaignEngine, DispatchOutcome};
use crate::error::DispatchError;

/// Default period between recovery sweeps.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Default wait after a retryable dispatch failure.
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// Tunables for the driver loop and the recovery sweep.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    pub sweep_interval: Duration,
    /// Wait after a retryable error. The campaign's own interval wins if longer.
    pub retry_backoff: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Bookkeeping for one running driver.
struct ManagedDriver {
    generation: u64,
    /// Child of the orchestrator's master token.
    cancel: CancellationToken,
}

/// Supervises per-campaign driver tasks.
pub struct Orchestrator {
    engine: Arc<CampaignEngine>,
    settings: OrchestratorSettings,
    drivers: Mutex<HashMap<DbId, ManagedDriver>>,
    generation: AtomicU64,
    /// Master token, cancelled on shutdown.
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Orchestrator {
    pub fn new(engine: Arc<CampaignEngine>, settings: OrchestratorSettings) -> Arc<Self> {
        Arc::new(Self {
            engine,
            settings,
            drivers: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        })
    }

    /// Spawn a driver for the campaign. Returns `false` if one is already
    /// running or the orchestrator is shutting down.
    pub fn start(self: &Arc<Self>, campaign_id: DbId) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }

        let mut drivers = self.drivers();
        if drivers.contains_key(&campaign_id) {
            return false;
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let cancel = self.cancel.child_token();
        drivers.insert(
            campaign_id,
            ManagedDriver {
                generation,
                cancel: cancel.clone(),
            },
        );
        drop(drivers);

        let this = Arc::clone(self);
        self.tracker.spawn(async move {
            tracing::info!(campaign_id, "Campaign driver started");
            drive(&this.engine, campaign_id, &cancel, this.settings).await;
            this.forget(campaign_id, generation);
            tracing::info!(campaign_id, "Campaign driver exited");
        });
        true
    }

    /// Cancel the campaign's driver wait. Returns `false` if none was running.
    pub fn stop(&self, campaign_id: DbId) -> bool {
        match self.drivers().remove(&campaign_id) {
            Some(driver) => {
                driver.cancel.cancel();
                tracing::info!(campaign_id, "Campaign driver stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_driving(&self, campaign_id: DbId) -> bool {
        self.drivers().contains_key(&campaign_id)
    }

    pub fn active_drivers(&self) -> usize {
        self.drivers().len()
    }

    /// Start a driver for every `sending` campaign that has none.
    pub async fn adopt_sending(self: &Arc<Self>) -> Result<usize, DispatchError> {
        let ids = self.engine.sending_campaign_ids().await?;
        let adopted = ids.into_iter().filter(|&id| self.start(id)).count();
        if adopted > 0 {
            tracing::info!(adopted, "Adopted sending campaigns");
        }
        Ok(adopted)
    }

    /// Recovery loop: adopt on start, then every `sweep_interval`, until
    /// `shutdown` is cancelled. Then stops every driver and waits for
    /// in-flight batches.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.settings.sweep_interval);
        tracing::info!(
            sweep_interval_secs = self.settings.sweep_interval.as_secs(),
            "Campaign orchestrator started",
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Campaign orchestrator shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.adopt_sending().await {
                        tracing::error!(error = %e, "Campaign sweep failed");
                    }
                }
            }
        }

        self.shutdown().await;
    }

    /// Cancel every driver and wait for their tasks to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.drivers().clear();
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("Campaign orchestrator shut down complete");
    }

    /// Remove the entry only if it still belongs to the exiting driver.
    fn forget(&self, campaign_id: DbId, generation: u64) {
        let mut drivers = self.drivers();
        if drivers
            .get(&campaign_id)
            .is_some_and(|d| d.generation == generation)
        {
            drivers.remove(&campaign_id);
        }
    }

    fn drivers(&self) -> MutexGuard<'_, HashMap<DbId, ManagedDriver>> {
        self.drivers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Driver loop
// ---------------------------------------------------------------------------

/// Drive one campaign until it completes, leaves `sending`, or `cancel` fires.
async fn drive(
    engine: &CampaignEngine,
    campaign_id: DbId,
    cancel: &CancellationToken,
    settings: OrchestratorSettings,
) {
    // Honour the throttle window left over from before a restart.
    let initial_wait = match engine.find_campaign(campaign_id).await {
        Ok(campaign) => {
            if campaign.status() != Some(CampaignStatus::Sending) {
                return;
            }
            engine.throttle_remaining(&campaign)
        }
        Err(DispatchError::NotFound(_)) => return,
        Err(e) => {
            tracing::warn!(campaign_id, error = %e, "Driver could not load campaign");
            settings.retry_backoff
        }
    };
    if !wait_or_cancel(initial_wait, cancel).await {
        return;
    }

    loop {
        if cancel.is_cancelled() {
            return;
        }

        let campaign = match engine.find_campaign(campaign_id).await {
            Ok(campaign) => campaign,
            Err(DispatchError::NotFound(_)) => return,
            Err(e) => {
                tracing::warn!(campaign_id, error = %e, "Driver could not load campaign");
                if !wait_or_cancel(settings.retry_backoff, cancel).await {
                    return;
                }
                continue;
            }
        };
        if campaign.status() != Some(CampaignStatus::Sending) {
            tracing::debug!(campaign_id, status_id = campaign.status_id, "Campaign no longer sending");
            return;
        }
        let throttle = Duration::from_millis(campaign.batch_interval_ms.max(0) as u64);

        let delay = match engine.dispatch(campaign_id).await {
            Ok(DispatchOutcome::Completed) => return,
            Ok(DispatchOutcome::Batch(report)) => {
                Duration::from_millis(report.next_dispatch_ms.max(0) as u64)
            }
            Err(DispatchError::CampaignNotSending { .. } | DispatchError::NotFound(_)) => return,
            Err(DispatchError::ThrottleActive { retry_after_ms, .. }) => {
                tracing::debug!(campaign_id, retry_after_ms, "Throttle window still open");
                Duration::from_millis(retry_after_ms.max(0) as u64)
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!(campaign_id, error = %e, "Dispatch failed, backing off");
                settings.retry_backoff.max(throttle)
            }
            Err(e) => {
                tracing::error!(campaign_id, error = %e, "Dispatch failed, driver stopping");
                return;
            }
        };

        if !wait_or_cancel(delay, cancel).await {
            return;
        }
    }
}

/// Sleep for `duration`. Returns `false` if cancelled first.
async fn wait_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_wait_returns_false() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!wait_or_cancel(Duration::from_secs(3600), &cancel).await);
        assert!(!wait_or_cancel(Duration::ZERO, &cancel).await);
    }
}
