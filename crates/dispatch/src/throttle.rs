//! Minimum spacing between the starts of consecutive batches.
//!
//! Batch starts are remembered in-process on tokio's monotonic clock. A
//! campaign with no start recorded in this process (for example right after a
//! restart) falls back to the persisted `last_batch_at`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use clinic_core::types::{DbId, Timestamp};
use tokio::time::Instant;

/// Start instants of the most recent batch per campaign.
#[derive(Debug, Default)]
pub struct BatchThrottle {
    started: Mutex<HashMap<DbId, Instant>>,
}

impl BatchThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a batch of `campaign_id` began delivering at `at`.
    pub fn record_start(&self, campaign_id: DbId, at: Instant) {
        self.started().insert(campaign_id, at);
    }

    /// Time the campaign must still wait before its next batch may start.
    ///
    /// Uses the campaign's current interval, so a longer interval set while
    /// sending also stretches the window already in progress.
    pub fn remaining(
        &self,
        campaign_id: DbId,
        batch_interval_ms: i64,
        last_batch_at: Option<Timestamp>,
    ) -> Duration {
        let interval = Duration::from_millis(batch_interval_ms.max(0) as u64);
        match self.started().get(&campaign_id) {
            Some(started) => interval.saturating_sub(started.elapsed()),
            None => remaining_throttle(last_batch_at, batch_interval_ms, Utc::now()),
        }
    }

    pub fn forget(&self, campaign_id: DbId) {
        self.started().remove(&campaign_id);
    }

    fn started(&self) -> MutexGuard<'_, HashMap<DbId, Instant>> {
        self.started.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Time left in the throttle window that started at `last_batch_at`.
pub fn remaining_throttle(
    last_batch_at: Option<Timestamp>,
    batch_interval_ms: i64,
    now: Timestamp,
) -> Duration {
    let Some(last) = last_batch_at else {
        return Duration::ZERO;
    };
    let elapsed_ms = (now - last).num_milliseconds().max(0);
    Duration::from_millis((batch_interval_ms - elapsed_ms).max(0) as u64)
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    #[test]
    fn no_previous_batch_means_no_wait() {
        assert_eq!(remaining_throttle(None, 60_000, Utc::now()), Duration::ZERO);
    }

    #[test]
    fn waits_out_the_rest_of_the_window() {
        let now = Utc::now();
        let last = now - TimeDelta::seconds(20);
        assert_eq!(
            remaining_throttle(Some(last), 60_000, now),
            Duration::from_secs(40)
        );
    }

    #[test]
    fn elapsed_window_means_no_wait() {
        let now = Utc::now();
        let last = now - TimeDelta::minutes(10);
        assert_eq!(remaining_throttle(Some(last), 60_000, now), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn recorded_start_blocks_until_interval_passes() {
        let throttle = BatchThrottle::new();
        assert_eq!(throttle.remaining(1, 60_000, None), Duration::ZERO);

        throttle.record_start(1, Instant::now());
        assert_eq!(throttle.remaining(1, 60_000, None), Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(throttle.remaining(1, 60_000, None), Duration::from_secs(15));

        // A longer interval stretches the window already running.
        assert_eq!(throttle.remaining(1, 120_000, None), Duration::from_secs(75));

        tokio::time::advance(Duration::from_secs(15)).await;
        assert_eq!(throttle.remaining(1, 60_000, None), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn persisted_start_applies_without_local_record() {
        let throttle = BatchThrottle::new();
        let last = Some(Utc::now() - TimeDelta::seconds(10));
        let left = throttle.remaining(2, 60_000, last);
        assert!(left > Duration::from_secs(45) && left <= Duration::from_secs(50));

        throttle.record_start(2, Instant::now());
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(throttle.remaining(2, 60_000, last), Duration::ZERO);

        throttle.forget(2);
        assert!(throttle.remaining(2, 60_000, last) > Duration::ZERO);
    }
}
