//! Persisted chunk representation.
//!
//! A chunk is an immutable fragment of a stream's text, written by a flush.
//! Chunks carry no sequence number: creation order (the storage row id) is
//! the only ordering, and reading a stream means concatenating its chunks in
//! that order.

use crate::core::stream::StreamId;
use serde::{Deserialize, Serialize};

/// A durable fragment of a stream's text.
///
/// # Examples
///
/// ```
/// use ptstream::core::{Chunk, StreamId};
///
/// let chunk = Chunk::new(StreamId::new("s1"), "Hello, world!".to_string());
/// assert_eq!(chunk.size(), 13);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Row identifier (assigned by storage layer). Defines creation order.
    pub id: Option<i64>,

    /// Stream this chunk belongs to.
    pub stream_id: StreamId,

    /// Text payload. May be empty (final flush with no new content).
    pub text: String,

    /// Unix timestamp (milliseconds) when the chunk was created.
    pub created_at: i64,
}

impl Chunk {
    /// Creates an unsaved chunk.
    #[must_use]
    pub fn new(stream_id: StreamId, text: String) -> Self {
        Self {
            id: None,
            stream_id,
            text,
            created_at: current_timestamp_ms(),
        }
    }

    /// Returns the size of the chunk in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.text.len()
    }

    /// Checks if the chunk is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Returns a preview of the chunk text (first N characters).
    #[must_use]
    pub fn preview(&self, max_len: usize) -> &str {
        match self.text.char_indices().nth(max_len) {
            Some((idx, _)) => &self.text[..idx],
            None => &self.text,
        }
    }
}

/// Concatenates chunks in the order given.
#[must_use]
pub fn concat_chunks(chunks: &[Chunk]) -> String {
    let mut out = String::with_capacity(chunks.iter().map(Chunk::size).sum());
    for chunk in chunks {
        out.push_str(&chunk.text);
    }
    out
}

/// Returns the current Unix timestamp in milliseconds.
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn current_timestamp_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
