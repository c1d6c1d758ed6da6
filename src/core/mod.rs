//! Core domain models for ptstream.
//!
//! Streams and chunks as pure data: identifiers, lifecycle status, the
//! reader-facing body, and persisted chunk records. No I/O lives here.

pub mod chunk;
pub mod stream;

pub use chunk::{Chunk, concat_chunks, current_timestamp_ms};
pub use stream::{StreamBody, StreamId, StreamRecord, StreamStatus};
