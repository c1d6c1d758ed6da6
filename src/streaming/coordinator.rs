//! Stream coordinator.
//!
//! Drives a single stream's production run: admission, live tee of each
//! fragment to an outbound sink, batching into durable chunks through a
//! [`FlushPolicy`], and finalization as `done` or `error`.
//!
//! Failure handling follows two rules. Failures on the outbound path (the
//! sink) are logged and the sink is dropped; persistence continues.
//! Failures on the persistence path abort the run into `error`.

use crate::core::{StreamBody, StreamId, StreamStatus};
use crate::error::{Error, Result, StreamError};
use crate::flush::{FlushPolicy, create_policy, default_policy};
use crate::storage::ChunkStore;
use crate::streaming::hub::{DEFAULT_HUB_CAPACITY, StreamSubscription, StreamUpdate, UpdateHub};
use crate::streaming::sink::OutboundSink;
use futures_util::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Decides when accumulated text is persisted.
    pub flush_policy: Arc<dyn FlushPolicy>,
    /// Updates buffered per hub subscriber.
    pub hub_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            flush_policy: Arc::new(default_policy()),
            hub_capacity: DEFAULT_HUB_CAPACITY,
        }
    }
}

impl CoordinatorConfig {
    /// Builds a configuration from a flush policy specification.
    ///
    /// # Errors
    ///
    /// Returns an error if the specification is invalid.
    pub fn from_policy_spec(spec: &str) -> Result<Self> {
        Ok(Self {
            flush_policy: Arc::from(create_policy(spec)?),
            ..Self::default()
        })
    }
}

/// Outcome of [`StreamCoordinator::begin_stream`].
#[derive(Debug)]
pub enum Admission {
    /// This call won admission; production runs on the returned task.
    Started(StreamTask),
    /// The stream was not `pending`. Nothing was written.
    AlreadyStarted,
}

impl Admission {
    /// Returns true if a production run was started.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        matches!(self, Self::Started(_))
    }

    /// Returns the production task, if one was started.
    #[must_use]
    pub fn into_task(self) -> Option<StreamTask> {
        match self {
            Self::Started(task) => Some(task),
            Self::AlreadyStarted => None,
        }
    }
}

/// Counters for one production run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Fragments appended by the producer.
    pub fragments: usize,
    /// Bytes appended by the producer.
    pub bytes: usize,
    /// Chunks written, including the final one.
    pub chunks: usize,
    /// Whether the outbound sink failed during the run.
    pub sink_failed: bool,
}

/// Handle to a detached production run.
///
/// Dropping the handle does not stop the run.
#[derive(Debug)]
pub struct StreamTask {
    stream_id: StreamId,
    handle: JoinHandle<Result<RunSummary>>,
}

impl StreamTask {
    /// Returns the stream being produced.
    #[must_use]
    pub const fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// Returns true once the run has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the run and returns its outcome.
    ///
    /// # Errors
    ///
    /// Returns the producer or storage failure that ended the run, or
    /// [`StreamError::TaskFailed`] if the producer panicked or the task was
    /// cancelled.
    pub async fn wait(self) -> Result<RunSummary> {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(join_err) => Err(StreamError::TaskFailed {
                id: self.stream_id.to_string(),
                reason: join_err.to_string(),
            }
            .into()),
        }
    }
}

/// Orchestrates production runs over a shared chunk store.
///
/// Cheap to clone; clones share the store, policy and update hub.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use ptstream::core::StreamStatus;
/// use ptstream::storage::{ChunkStore, SqliteStore};
/// use ptstream::streaming::{NullSink, StreamCoordinator};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let store = SqliteStore::in_memory().unwrap();
/// store.init().unwrap();
/// let coordinator = StreamCoordinator::new(Arc::new(store));
///
/// let id = coordinator.create_stream().unwrap();
/// let admission = coordinator
///     .begin_stream(&id, |append| async move {
///         append.append("Hello ").await?;
///         append.append("World.").await?;
///         Ok(())
///     }, NullSink)
///     .unwrap();
/// admission.into_task().unwrap().wait().await.unwrap();
///
/// let body = coordinator.read_body(Some(&id)).unwrap();
/// assert_eq!(body.text, "Hello World.");
/// assert_eq!(body.status, StreamStatus::Done);
/// # });
/// ```
#[derive(Clone)]
pub struct StreamCoordinator {
    store: Arc<dyn ChunkStore>,
    policy: Arc<dyn FlushPolicy>,
    hub: UpdateHub,
}

impl StreamCoordinator {
    /// Creates a coordinator with the default configuration.
    #[must_use]
    pub fn new(store: Arc<dyn ChunkStore>) -> Self {
        Self::with_config(store, CoordinatorConfig::default())
    }

    /// Creates a coordinator with an explicit configuration.
    #[must_use]
    pub fn with_config(store: Arc<dyn ChunkStore>, config: CoordinatorConfig) -> Self {
        Self {
            store,
            policy: config.flush_policy,
            hub: UpdateHub::new(config.hub_capacity),
        }
    }

    /// Returns the underlying store.
    #[must_use]
    pub const fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    /// Returns the update hub.
    #[must_use]
    pub const fn hub(&self) -> &UpdateHub {
        &self.hub
    }

    /// Returns the flush policy in use.
    #[must_use]
    pub fn policy(&self) -> &dyn FlushPolicy {
        self.policy.as_ref()
    }

    /// Creates a new `pending` stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub fn create_stream(&self) -> Result<StreamId> {
        let id = self.store.create_stream()?;
        debug!(stream_id = %id, "stream created");
        self.hub.publish(StreamUpdate {
            stream_id: id.clone(),
            status: StreamStatus::Pending,
            flushed_bytes: 0,
        });
        Ok(id)
    }

    /// Reads the current body; `None` yields empty text and `pending`.
    ///
    /// # Errors
    ///
    /// Returns `StreamNotFound` for unknown ids, or a storage error.
    pub fn read_body(&self, id: Option<&StreamId>) -> Result<StreamBody> {
        self.store.read_body(id)
    }

    /// Subscribes to changes of one stream.
    #[must_use]
    pub fn subscribe(&self, id: StreamId) -> StreamSubscription {
        self.hub.subscribe(id)
    }

    /// Starts a production run for `id`, unless one already started.
    ///
    /// On admission the stream moves to `streaming` and `producer` is
    /// spawned on the Tokio runtime with a [`ChunkAppender`]; this call
    /// returns without waiting for it. When the stream is not `pending`,
    /// returns [`Admission::AlreadyStarted`] and the sink is dropped unused.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `StreamNotFound` for unknown ids, or a storage error from the
    /// admission update.
    pub fn begin_stream<P, Fut, S>(&self, id: &StreamId, producer: P, sink: S) -> Result<Admission>
    where
        P: FnOnce(ChunkAppender) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
        S: OutboundSink + 'static,
    {
        if !self.store.try_begin(id)? {
            warn!(stream_id = %id, "stream was already started");
            return Ok(Admission::AlreadyStarted);
        }
        info!(stream_id = %id, policy = self.policy.name(), "stream admitted");
        self.hub.publish(StreamUpdate {
            stream_id: id.clone(),
            status: StreamStatus::Streaming,
            flushed_bytes: 0,
        });

        let pipeline = Arc::new(Mutex::new(Pipeline {
            stream_id: id.clone(),
            store: Arc::clone(&self.store),
            policy: Arc::clone(&self.policy),
            hub: self.hub.clone(),
            sink: Some(Box::new(sink)),
            pending: String::new(),
            flushed_bytes: 0,
            summary: RunSummary::default(),
            state: RunState::Open,
        }));
        let appender = ChunkAppender {
            stream_id: id.clone(),
            pipeline: Arc::clone(&pipeline),
        };

        let handle = tokio::spawn(run_production(pipeline, appender, producer));
        Ok(Admission::Started(StreamTask {
            stream_id: id.clone(),
            handle,
        }))
    }
}

impl std::fmt::Debug for StreamCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCoordinator")
            .field("policy", &self.policy)
            .field("hub", &self.hub)
            .finish_non_exhaustive()
    }
}

/// The "append fragment" operation handed to producers.
///
/// Clones share the same run. Once the run is finalized, further appends
/// fail with [`StreamError::Finalized`].
#[derive(Clone)]
pub struct ChunkAppender {
    stream_id: StreamId,
    pipeline: Arc<Mutex<Pipeline>>,
}

impl ChunkAppender {
    /// Returns the stream being produced.
    #[must_use]
    pub const fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// Appends a fragment: forwards it to the sink, accumulates it, and
    /// persists the accumulated text if the flush policy says so.
    ///
    /// # Errors
    ///
    /// Returns a storage error if a flush fails (the run is then aborted),
    /// or a [`StreamError`] if the run is no longer open.
    pub async fn append(&self, fragment: impl AsRef<str> + Send) -> Result<()> {
        let mut pipeline = self.pipeline.lock().await;
        pipeline.append(fragment.as_ref()).await
    }
}

impl std::fmt::Debug for ChunkAppender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkAppender")
            .field("stream_id", &self.stream_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Open,
    /// A flush failed; appends are refused until finalization.
    Aborted,
    Finalized,
}

/// Per-run state behind the appender.
struct Pipeline {
    stream_id: StreamId,
    store: Arc<dyn ChunkStore>,
    policy: Arc<dyn FlushPolicy>,
    hub: UpdateHub,
    /// `None` once closed or failed.
    sink: Option<Box<dyn OutboundSink>>,
    /// Unflushed text.
    pending: String,
    flushed_bytes: usize,
    summary: RunSummary,
    state: RunState,
}

impl Pipeline {
    async fn append(&mut self, fragment: &str) -> Result<()> {
        match self.state {
            RunState::Open => {}
            RunState::Aborted => {
                return Err(StreamError::Aborted {
                    id: self.stream_id.to_string(),
                }
                .into());
            }
            RunState::Finalized => {
                return Err(StreamError::Finalized {
                    id: self.stream_id.to_string(),
                }
                .into());
            }
        }

        self.forward(fragment).await;
        self.pending.push_str(fragment);
        self.summary.fragments += 1;
        self.summary.bytes += fragment.len();

        if self.policy.should_flush(fragment, &self.pending) {
            self.flush(false).await?;
        }
        Ok(())
    }

    async fn forward(&mut self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        let written = sink.write(fragment.as_bytes()).await;
        if let Err(e) = written {
            warn!(
                stream_id = %self.stream_id,
                error = %e,
                "outbound write failed; continuing with persistence only"
            );
            self.sink = None;
            self.summary.sink_failed = true;
        }
    }

    /// Persists the pending text as one chunk.
    async fn flush(&mut self, is_final: bool) -> Result<()> {
        let text = std::mem::take(&mut self.pending);
        let bytes = text.len();
        let written = on_store(&self.store, &self.stream_id, move |store, id| {
            store.append_chunk(id, &text, is_final)
        })
        .await;
        if let Err(e) = written {
            error!(stream_id = %self.stream_id, error = %e, "failed to persist chunk");
            self.state = RunState::Aborted;
            return Err(e);
        }

        self.flushed_bytes += bytes;
        self.summary.chunks += 1;
        debug!(stream_id = %self.stream_id, bytes, is_final, "flushed chunk");

        let status = if is_final {
            self.read_status(StreamStatus::Done).await
        } else {
            StreamStatus::Streaming
        };
        self.publish(status);
        Ok(())
    }

    /// Reads back the durable status, or `fallback` if the read fails.
    async fn read_status(&mut self, fallback: StreamStatus) -> StreamStatus {
        match on_store(&self.store, &self.stream_id, |store, id| store.get_status(id)).await {
            Ok(status) => status,
            Err(e) => {
                warn!(
                    stream_id = %self.stream_id,
                    error = %e,
                    %fallback,
                    "failed to read back stream status"
                );
                fallback
            }
        }
    }

    fn publish(&self, status: StreamStatus) {
        self.hub.publish(StreamUpdate {
            stream_id: self.stream_id.clone(),
            status,
            flushed_bytes: self.flushed_bytes,
        });
    }

    async fn close_sink(&mut self) {
        if let Some(mut sink) = self.sink.take()
            && let Err(e) = sink.close().await
        {
            warn!(stream_id = %self.stream_id, error = %e, "failed to close outbound sink");
            self.summary.sink_failed = true;
        }
    }

    /// Normal completion: final chunk (possibly empty), sink closed.
    async fn complete(&mut self) -> Result<RunSummary> {
        if let Err(e) = self.flush(true).await {
            return Err(self.fail(e).await);
        }
        self.state = RunState::Finalized;
        self.close_sink().await;
        info!(
            stream_id = %self.stream_id,
            fragments = self.summary.fragments,
            bytes = self.summary.bytes,
            chunks = self.summary.chunks,
            "stream completed"
        );
        Ok(self.summary.clone())
    }

    /// Failure path: keep what can be kept, mark `error` unless the stream
    /// already reached a terminal status, close the sink.
    async fn fail(&mut self, cause: Error) -> Error {
        if self.state == RunState::Open && !self.pending.is_empty() {
            // Best effort; the original cause is what gets reported.
            let _ = self.flush(false).await;
        }
        let marked =
            on_store(&self.store, &self.stream_id, |store, id| store.fail_if_active(id)).await;
        let status = match marked {
            Ok(true) => StreamStatus::Error,
            Ok(false) => {
                let status = self.read_status(StreamStatus::Error).await;
                debug!(stream_id = %self.stream_id, %status, "stream already final; status kept");
                status
            }
            Err(e) => {
                error!(stream_id = %self.stream_id, error = %e, "failed to mark stream as errored");
                StreamStatus::Error
            }
        };
        self.state = RunState::Finalized;
        self.publish(status);
        self.close_sink().await;
        error!(stream_id = %self.stream_id, error = %cause, "stream failed");
        cause
    }
}

/// Runs a store call on the blocking pool so a slow disk or a lock held by
/// another process does not stall a runtime worker.
async fn on_store<T, F>(store: &Arc<dyn ChunkStore>, id: &StreamId, op: F) -> Result<T>
where
    F: FnOnce(&dyn ChunkStore, &StreamId) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    let stream_id = id.clone();
    let reason_id = id.to_string();
    tokio::task::spawn_blocking(move || op(store.as_ref(), &stream_id))
        .await
        .map_err(|e| StreamError::TaskFailed {
            id: reason_id,
            reason: e.to_string(),
        })?
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned());
    message.map_or_else(
        || "producer panicked".to_string(),
        |m| format!("producer panicked: {m}"),
    )
}

async fn run_production<P, Fut>(
    pipeline: Arc<Mutex<Pipeline>>,
    appender: ChunkAppender,
    producer: P,
) -> Result<RunSummary>
where
    P: FnOnce(ChunkAppender) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let stream_id = appender.stream_id().clone();
    let produced = AssertUnwindSafe(async move { producer(appender).await })
        .catch_unwind()
        .await;
    let mut pipeline = pipeline.lock().await;

    let outcome = match produced {
        Ok(Ok(())) => Ok(()),
        // Our own errors surface unchanged when propagated with `?`.
        Ok(Err(e)) => Err(e.downcast::<Error>().unwrap_or_else(Error::Producer)),
        Err(payload) => Err(StreamError::TaskFailed {
            id: stream_id.to_string(),
            reason: panic_reason(payload.as_ref()),
        }
        .into()),
    };

    match (outcome, pipeline.state) {
        (Ok(()), RunState::Open) => pipeline.complete().await,
        (Ok(()), _) => {
            // The producer swallowed a flush failure.
            let cause = StreamError::Aborted {
                id: stream_id.to_string(),
            }
            .into();
            Err(pipeline.fail(cause).await)
        }
        (Err(cause), _) => Err(pipeline.fail(cause).await),
    }
}
