// Dedup cleanup scheduler
// Bounds the event dedup store by purging ids older than the retention window

use crate::application::cancel::CancelToken;
use crate::application::constants::CLEANUP_ERROR_BACKOFF;
use crate::error::Result;
use crate::port::{EventDeduplicationStore, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{error, info};

/// Periodic `delete_published_before(now - retention)` runner
pub struct DedupCleanupScheduler {
    store: Arc<dyn EventDeduplicationStore>,
    time_provider: Arc<dyn TimeProvider>,
    retention: Duration,
    interval: Duration,
}

impl DedupCleanupScheduler {
    /// Create a new cleanup scheduler
    ///
    /// # Arguments
    /// * `store` - Dedup store to purge
    /// * `time_provider` - Clock used for the cutoff
    /// * `retention` - How long published ids are remembered
    /// * `interval` - How often the purge runs
    pub fn new(
        store: Arc<dyn EventDeduplicationStore>,
        time_provider: Arc<dyn TimeProvider>,
        retention: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            time_provider,
            retention,
            interval,
        }
    }

    /// Run the cleanup loop until `cancel` fires (background task)
    ///
    /// The first purge happens immediately. Should be spawned in tokio::spawn
    pub async fn run(self, mut cancel: CancelToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            retention_secs = self.retention.as_secs(),
            "Dedup cleanup scheduler started"
        );

        let mut tick = interval(self.interval.max(Duration::from_millis(1)));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = cancel.cancelled() => break,
            }

            if let Err(e) = self.run_now().await {
                error!(error = %e, "Scheduled dedup cleanup failed");
                tokio::select! {
                    _ = sleep(CLEANUP_ERROR_BACKOFF) => {}
                    _ = cancel.cancelled() => break,
                }
            }
        }

        info!("Dedup cleanup scheduler stopped");
    }

    /// Purge immediately (manual trigger)
    ///
    /// # Returns
    /// Number of purged event ids
    pub async fn run_now(&self) -> Result<u64> {
        let retention_ms = i64::try_from(self.retention.as_millis()).unwrap_or(i64::MAX);
        let cutoff = self.time_provider.now_millis().saturating_sub(retention_ms);

        let deleted = self.store.delete_published_before(cutoff).await?;
        let remaining = self.store.published_count().await?;

        info!(deleted, remaining, cutoff_ms = cutoff, "Dedup cleanup completed");
        Ok(deleted)
    }
}
