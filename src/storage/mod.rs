//! Storage layer for ptstream.
//!
//! Durable record of each stream's status and its ordered chunks, backed by
//! `SQLite`. The [`ChunkStore`] trait is the seam the coordinator and the
//! readers depend on.

pub mod schema;
pub mod sqlite;
pub mod traits;

pub use schema::{CURRENT_SCHEMA_VERSION, SCHEMA_SQL};
pub use sqlite::SqliteStore;
pub use traits::{ChunkStore, DEFAULT_STALE_AFTER, StorageStats};

/// Default database path relative to the working directory.
pub const DEFAULT_DB_PATH: &str = ".ptstream/streams.db";
