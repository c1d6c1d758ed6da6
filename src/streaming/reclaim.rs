//! Reclaiming streams abandoned by a crashed or hung producer.

use crate::core::{StreamId, StreamStatus};
use crate::error::Result;
use crate::storage::{ChunkStore, DEFAULT_STALE_AFTER};
use crate::streaming::hub::{StreamUpdate, UpdateHub};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Default time between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Marks stale `pending`/`streaming` streams as `timeout`.
#[derive(Clone)]
pub struct Reclaimer {
    store: Arc<dyn ChunkStore>,
    stale_after: Duration,
    interval: Duration,
    hub: Option<UpdateHub>,
}

impl Reclaimer {
    /// Creates a reclaimer with default thresholds.
    #[must_use]
    pub fn new(store: Arc<dyn ChunkStore>) -> Self {
        Self {
            store,
            stale_after: DEFAULT_STALE_AFTER,
            interval: DEFAULT_SWEEP_INTERVAL,
            hub: None,
        }
    }

    /// Sets how long a stream may go without progress.
    #[must_use]
    pub const fn stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Sets the time between sweeps of [`Reclaimer::spawn`].
    #[must_use]
    pub const fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Publishes a `timeout` update per reclaimed stream.
    #[must_use]
    pub fn with_hub(mut self, hub: UpdateHub) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Runs one sweep and returns the reclaimed stream ids.
    ///
    /// # Errors
    ///
    /// Returns an error if the store update fails.
    pub fn sweep(&self) -> Result<Vec<StreamId>> {
        let reclaimed = self.store.reclaim_stale(self.stale_after)?;
        if reclaimed.is_empty() {
            debug!("no stale streams");
            return Ok(reclaimed);
        }

        info!(
            count = reclaimed.len(),
            stale_after_secs = self.stale_after.as_secs(),
            "reclaimed stale streams"
        );
        if let Some(hub) = &self.hub {
            for id in &reclaimed {
                hub.publish(StreamUpdate {
                    stream_id: id.clone(),
                    status: StreamStatus::Timeout,
                    flushed_bytes: 0,
                });
            }
        }
        Ok(reclaimed)
    }

    /// Sweeps periodically on the Tokio runtime until the handle is aborted.
    ///
    /// A failing sweep is logged and retried on the next tick.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep() {
                    warn!(error = %e, "stale stream sweep failed");
                }
            }
        })
    }
}

impl std::fmt::Debug for Reclaimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reclaimer")
            .field("stale_after", &self.stale_after)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
