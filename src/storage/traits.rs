//! Chunk store trait definition.
//!
//! Defines the interface the stream coordinator and readers use for
//! durable stream state, enabling pluggable storage backends.

use crate::core::{Chunk, StreamBody, StreamId, StreamRecord, StreamStatus};
use crate::error::Result;
use serde::Serialize;
use std::time::Duration;

/// Default age after which a non-terminal stream is considered stalled.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(20 * 60);

/// Trait for durable stream storage.
///
/// Implementations are shared between one production task per stream and
/// any number of readers, so every method takes `&self` and must be safe to
/// call concurrently. Each method is atomic on its own; nothing here spans
/// multiple calls.
///
/// Methods are synchronous and may block (on disk I/O, or on a lock held by
/// another process). Async callers run them on the blocking pool.
pub trait ChunkStore: Send + Sync {
    /// Allocates a new stream in `pending` status.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    fn create_stream(&self) -> Result<StreamId>;

    /// Appends a chunk to a stream.
    ///
    /// `text` may be empty. When `is_final` is set the stream also moves to
    /// `done`, unless it already reached a terminal status. No admission
    /// check is performed; the caller must own the stream's production run.
    ///
    /// # Errors
    ///
    /// Returns `StreamNotFound` for unknown ids, or a database error.
    fn append_chunk(&self, id: &StreamId, text: &str, is_final: bool) -> Result<()>;

    /// Overwrites the status of a stream unconditionally.
    ///
    /// # Errors
    ///
    /// Returns `StreamNotFound` for unknown ids, or a database error.
    fn set_status(&self, id: &StreamId, status: StreamStatus) -> Result<()>;

    /// Moves a stream to `error` unless it already reached a terminal
    /// status. Returns `false` when the status was left unchanged.
    ///
    /// # Errors
    ///
    /// Returns `StreamNotFound` for unknown ids, or a database error.
    fn fail_if_active(&self, id: &StreamId) -> Result<bool>;

    /// Reads the current status of a stream.
    ///
    /// # Errors
    ///
    /// Returns `StreamNotFound` for unknown ids, or a database error.
    fn get_status(&self, id: &StreamId) -> Result<StreamStatus>;

    /// Reads the current status and all chunks concatenated in creation
    /// order. Safe to call while the stream is being written.
    ///
    /// # Errors
    ///
    /// Returns `StreamNotFound` for unknown ids, or a database error.
    fn get_body(&self, id: &StreamId) -> Result<StreamBody>;

    /// Atomically moves a stream from `pending` to `streaming`.
    ///
    /// Returns `false` when the stream was not `pending`, which callers
    /// treat as "already started".
    ///
    /// # Errors
    ///
    /// Returns `StreamNotFound` for unknown ids, or a database error.
    fn try_begin(&self, id: &StreamId) -> Result<bool>;

    /// Marks streams stuck in `pending` or `streaming` for at least
    /// `older_than` as `timeout`. Returns the ids that were changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    fn reclaim_stale(&self, older_than: Duration) -> Result<Vec<StreamId>>;

    /// Lists the persisted chunks of a stream in creation order.
    ///
    /// # Errors
    ///
    /// Returns `StreamNotFound` for unknown ids, or a database error.
    fn get_chunks(&self, id: &StreamId) -> Result<Vec<Chunk>>;

    /// Lists streams, oldest first, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn list_streams(&self, status: Option<StreamStatus>) -> Result<Vec<StreamRecord>>;

    /// Gets storage statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if statistics cannot be gathered.
    fn stats(&self) -> Result<StorageStats>;

    /// Reader entry point for UIs: `None` means "no stream yet" and yields
    /// empty text with `pending` status instead of an error.
    ///
    /// # Errors
    ///
    /// Returns `StreamNotFound` for unknown ids, or a database error.
    fn read_body(&self, id: Option<&StreamId>) -> Result<StreamBody> {
        id.map_or_else(|| Ok(StreamBody::empty()), |id| self.get_body(id))
    }
}

/// Storage statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StorageStats {
    /// Number of streams stored.
    pub stream_count: usize,
    /// Streams in `pending`.
    pub pending: usize,
    /// Streams in `streaming`.
    pub streaming: usize,
    /// Streams in `done`.
    pub done: usize,
    /// Streams in `error`.
    pub error: usize,
    /// Streams in `timeout`.
    pub timeout: usize,
    /// Total number of chunks across all streams.
    pub chunk_count: usize,
    /// Total size of all chunk text in bytes.
    pub total_text_size: usize,
    /// Schema version.
    pub schema_version: u32,
    /// Database file size in bytes (if applicable).
    pub db_size: Option<u64>,
}

impl StorageStats {
    /// Records `count` streams with the given status.
    pub const fn record_status(&mut self, status: StreamStatus, count: usize) {
        match status {
            StreamStatus::Pending => self.pending = count,
            StreamStatus::Streaming => self.streaming = count,
            StreamStatus::Done => self.done = count,
            StreamStatus::Error => self.error = count,
            StreamStatus::Timeout => self.timeout = count,
        }
    }
}
