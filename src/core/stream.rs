//! Stream identity, lifecycle status and readable body.
//!
//! A stream is one logical text-generation session. Its status moves
//! forward only: `pending -> streaming -> {done, error}`, with the
//! maintenance sweep able to move `pending`/`streaming` to `timeout`.

use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque unique identifier for a stream.
///
/// Generated by the store at creation time (UUID v4 text).
///
/// # Examples
///
/// ```
/// use ptstream::core::StreamId;
///
/// let id = StreamId::generate();
/// let parsed: StreamId = id.as_str().parse().unwrap();
/// assert_eq!(id, parsed);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wraps an existing identifier string without validation.
    ///
    /// Identifiers are opaque; unknown ones are rejected by the store with
    /// `StreamNotFound`, not here.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StreamId {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(StorageError::StreamNotFound { id: s.to_string() });
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl AsRef<str> for StreamId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lifecycle status of a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    /// Created, no production run admitted yet.
    #[default]
    Pending,
    /// A production run holds the stream.
    Streaming,
    /// Production completed and the final chunk was written.
    Done,
    /// Production or persistence failed.
    Error,
    /// Reclassified by the maintenance sweep after stalling.
    Timeout,
}

impl StreamStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Streaming,
        Self::Done,
        Self::Error,
        Self::Timeout,
    ];

    /// Returns the storage/wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Streaming => "streaming",
            Self::Done => "done",
            Self::Error => "error",
            Self::Timeout => "timeout",
        }
    }

    /// Returns true for statuses no stream ever leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Timeout)
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "streaming" => Ok(Self::Streaming),
            "done" => Ok(Self::Done),
            "error" => Ok(Self::Error),
            "timeout" => Ok(Self::Timeout),
            _ => Err(StorageError::InvalidStatus(s.to_string())),
        }
    }
}

/// Current text and status of a stream, as seen by a reader.
///
/// Read mid-flight, `text` is a prefix of the eventual final text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamBody {
    /// All persisted chunks concatenated in creation order.
    pub text: String,
    /// Status at read time.
    pub status: StreamStatus,
}

impl StreamBody {
    /// Body returned for "no stream yet": empty text, `pending`.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true once the body can no longer change.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Stored stream record (without its chunks).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRecord {
    /// Stream identifier.
    pub id: StreamId,
    /// Current status.
    pub status: StreamStatus,
    /// Unix timestamp (milliseconds) of creation.
    pub created_at: i64,
    /// Unix timestamp (milliseconds) of the last write.
    pub updated_at: i64,
    /// Number of persisted chunks.
    pub chunk_count: usize,
    /// Total persisted text size in bytes.
    pub text_size: usize,
}
