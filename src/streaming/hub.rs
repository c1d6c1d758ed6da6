//! Change notifications for stream readers.
//!
//! The coordinator publishes a [`StreamUpdate`] after every flush and every
//! status transition it performs. Readers subscribe per stream id and
//! re-read the body from the store when notified, which gives a UI
//! push-on-change semantics without a reactive database.

use crate::core::{StreamBody, StreamId, StreamStatus};
use crate::error::Result;
use crate::storage::ChunkStore;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Default number of updates buffered per subscriber before it lags.
pub const DEFAULT_HUB_CAPACITY: usize = 256;

/// A change to one stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamUpdate {
    /// Stream that changed.
    pub stream_id: StreamId,
    /// Status after the change.
    pub status: StreamStatus,
    /// Bytes durably persisted so far by the current run.
    pub flushed_bytes: usize,
}

/// Broadcast hub for stream updates. Cheap to clone.
#[derive(Debug, Clone)]
pub struct UpdateHub {
    tx: broadcast::Sender<StreamUpdate>,
}

impl UpdateHub {
    /// Creates a hub buffering up to `capacity` updates per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an update. Having no subscribers is not an error.
    pub fn publish(&self, update: StreamUpdate) {
        let _ = self.tx.send(update);
    }

    /// Subscribes to updates of one stream.
    #[must_use]
    pub fn subscribe(&self, stream_id: StreamId) -> StreamSubscription {
        StreamSubscription {
            stream_id,
            rx: self.tx.subscribe(),
        }
    }

    /// Returns the number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for UpdateHub {
    fn default() -> Self {
        Self::new(DEFAULT_HUB_CAPACITY)
    }
}

/// Updates of a single stream.
#[derive(Debug)]
pub struct StreamSubscription {
    stream_id: StreamId,
    rx: broadcast::Receiver<StreamUpdate>,
}

impl StreamSubscription {
    /// Returns the watched stream id.
    #[must_use]
    pub const fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// Waits for the next change of the watched stream.
    ///
    /// Returns `None` once the hub is gone. After falling behind, returns
    /// `Some(None)`: something changed but the details were dropped, so
    /// the caller should re-read the store.
    pub async fn changed(&mut self) -> Option<Option<StreamUpdate>> {
        loop {
            match self.rx.recv().await {
                Ok(update) if update.stream_id == self.stream_id => return Some(Some(update)),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(stream_id = %self.stream_id, skipped, "subscriber lagged");
                    return Some(None);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Waits for the next change of a stream and returns its fresh body.
///
/// Returns `Ok(None)` once the hub is gone.
///
/// # Errors
///
/// Returns an error if the store read fails.
pub async fn watch_body(
    store: &dyn ChunkStore,
    subscription: &mut StreamSubscription,
) -> Result<Option<StreamBody>> {
    if subscription.changed().await.is_none() {
        return Ok(None);
    }
    store.get_body(subscription.stream_id()).map(Some)
}
