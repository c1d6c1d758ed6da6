//! `SQLite` chunk store implementation.
//!
//! One connection guarded by a mutex serves the production task and all
//! readers of a process. Other processes (the CLI `watch` command, for
//! instance) open their own connection; WAL mode lets them read while a
//! writer is active.

// SQLite stores all integers as i64. These casts are intentional and safe
// because we only store non-negative values that fit in usize.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use crate::core::{
    Chunk, StreamBody, StreamId, StreamRecord, StreamStatus, concat_chunks, current_timestamp_ms,
};
use crate::error::{Result, StorageError};
use crate::storage::schema::{
    CHECK_SCHEMA_SQL, CURRENT_SCHEMA_VERSION, GET_VERSION_SQL, LIST_STREAMS_SQL, SCHEMA_SQL,
    SET_VERSION_SQL, STREAM_CHUNKS_SQL,
};
use crate::storage::traits::{ChunkStore, StorageStats};
use parking_lot::Mutex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How long a connection waits on a lock held by another process.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-based chunk store.
///
/// # Examples
///
/// ```
/// use ptstream::storage::{ChunkStore, SqliteStore};
/// use ptstream::core::StreamStatus;
///
/// let store = SqliteStore::in_memory().unwrap();
/// store.init().unwrap();
/// let id = store.create_stream().unwrap();
/// assert_eq!(store.get_status(&id).unwrap(), StreamStatus::Pending);
/// ```
pub struct SqliteStore {
    /// `SQLite` connection.
    conn: Mutex<Connection>,
    /// Path to the database file (None for in-memory).
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens or creates a `SQLite` database at the given path.
    ///
    /// The parent directory is created if missing. Call [`Self::init`]
    /// before use.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or configured.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Database(e.to_string()))?;
        }

        let conn = Connection::open(&path).map_err(StorageError::from)?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(StorageError::from)?;
        conn.execute("PRAGMA foreign_keys = ON;", [])
            .map_err(StorageError::from)?;

        // journal_mode returns the resulting mode as a row
        let _: String = conn
            .query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))
            .map_err(StorageError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path),
        })
    }

    /// Creates an in-memory `SQLite` database.
    ///
    /// Useful for testing and for single-process servers that do not need
    /// the text after restart.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        conn.execute("PRAGMA foreign_keys = ON;", [])
            .map_err(StorageError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Creates the schema if needed. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a migration error if the database was written by a newer
    /// schema version, or a database error.
    pub fn init(&self) -> Result<()> {
        let conn = self.conn.lock();
        let is_init: i64 = conn
            .query_row(CHECK_SCHEMA_SQL, [], |row| row.get(0))
            .map_err(StorageError::from)?;

        if is_init == 0 {
            conn.execute_batch(SCHEMA_SQL)
                .map_err(StorageError::from)?;
            Self::set_schema_version(&conn, CURRENT_SCHEMA_VERSION)?;
            return Ok(());
        }

        match Self::get_schema_version(&conn)? {
            Some(version) if version > CURRENT_SCHEMA_VERSION => {
                Err(StorageError::Migration(format!(
                    "database schema v{version} is newer than supported v{CURRENT_SCHEMA_VERSION}"
                ))
                .into())
            }
            Some(_) => Ok(()),
            None => {
                // schema_info exists but was never stamped
                conn.execute_batch(SCHEMA_SQL)
                    .map_err(StorageError::from)?;
                Self::set_schema_version(&conn, CURRENT_SCHEMA_VERSION)
            }
        }
    }

    /// Checks if the schema exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the check cannot be performed.
    pub fn is_initialized(&self) -> Result<bool> {
        let count: i64 = self
            .conn
            .lock()
            .query_row(CHECK_SCHEMA_SQL, [], |row| row.get(0))
            .map_err(StorageError::from)?;
        Ok(count > 0)
    }

    fn get_schema_version(conn: &Connection) -> Result<Option<u32>> {
        let version: Option<String> = conn
            .query_row(GET_VERSION_SQL, [], |row| row.get(0))
            .optional()
            .map_err(StorageError::from)?;

        Ok(version.and_then(|v| v.parse().ok()))
    }

    fn set_schema_version(conn: &Connection, version: u32) -> Result<()> {
        conn.execute(SET_VERSION_SQL, params![version.to_string()])
            .map_err(StorageError::from)?;
        Ok(())
    }

    /// Reads a stream's status or fails with `StreamNotFound`.
    fn status_of(conn: &Connection, id: &StreamId) -> Result<StreamStatus> {
        conn.query_row(
            "SELECT status FROM streams WHERE id = ?",
            params![id],
            |row| row.get(0),
        )
        .optional()
        .map_err(StorageError::from)?
        .ok_or_else(|| not_found(id))
    }

    fn chunks_of(conn: &Connection, id: &StreamId) -> Result<Vec<Chunk>> {
        let mut stmt = conn
            .prepare(STREAM_CHUNKS_SQL)
            .map_err(StorageError::from)?;

        let chunks = stmt
            .query_map(params![id], |row| {
                Ok(Chunk {
                    id: Some(row.get(0)?),
                    stream_id: row.get(1)?,
                    text: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })
            .map_err(StorageError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;

        Ok(chunks)
    }
}

fn not_found(id: &StreamId) -> crate::error::Error {
    StorageError::StreamNotFound {
        id: id.to_string(),
    }
    .into()
}

impl ChunkStore for SqliteStore {
    fn create_stream(&self) -> Result<StreamId> {
        let id = StreamId::generate();
        let now = current_timestamp_ms();

        self.conn
            .lock()
            .execute(
                "INSERT INTO streams (id, status, created_at, updated_at) VALUES (?, ?, ?, ?)",
                params![id, StreamStatus::Pending, now, now],
            )
            .map_err(StorageError::from)?;

        Ok(id)
    }

    fn append_chunk(&self, id: &StreamId, text: &str, is_final: bool) -> Result<()> {
        let now = current_timestamp_ms();
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(StorageError::from)?;

        Self::status_of(&tx, id)?;

        tx.execute(
            "INSERT INTO chunks (stream_id, text, created_at) VALUES (?, ?, ?)",
            params![id, text, now],
        )
        .map_err(StorageError::from)?;

        if is_final {
            // Terminal statuses stay terminal.
            tx.execute(
                r"
            UPDATE streams SET status = ?2, updated_at = ?3
            WHERE id = ?1 AND status IN ('pending', 'streaming')
        ",
                params![id, StreamStatus::Done, now],
            )
            .map_err(StorageError::from)?;
        } else {
            tx.execute(
                "UPDATE streams SET updated_at = ?2 WHERE id = ?1",
                params![id, now],
            )
            .map_err(StorageError::from)?;
        }

        tx.commit().map_err(StorageError::from)?;
        Ok(())
    }

    fn set_status(&self, id: &StreamId, status: StreamStatus) -> Result<()> {
        let changed = self
            .conn
            .lock()
            .execute(
                "UPDATE streams SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, status, current_timestamp_ms()],
            )
            .map_err(StorageError::from)?;

        if changed == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    fn fail_if_active(&self, id: &StreamId) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                r"
            UPDATE streams SET status = ?2, updated_at = ?3
            WHERE id = ?1 AND status IN ('pending', 'streaming')
        ",
                params![id, StreamStatus::Error, current_timestamp_ms()],
            )
            .map_err(StorageError::from)?;

        if changed == 1 {
            return Ok(true);
        }
        Self::status_of(&conn, id)?;
        Ok(false)
    }

    fn get_status(&self, id: &StreamId) -> Result<StreamStatus> {
        Self::status_of(&self.conn.lock(), id)
    }

    fn get_body(&self, id: &StreamId) -> Result<StreamBody> {
        let mut conn = self.conn.lock();
        // One read transaction so status and text come from the same snapshot.
        let tx = conn.transaction().map_err(StorageError::from)?;
        let status = Self::status_of(&tx, id)?;
        let text = concat_chunks(&Self::chunks_of(&tx, id)?);
        tx.commit().map_err(StorageError::from)?;

        Ok(StreamBody { text, status })
    }

    fn try_begin(&self, id: &StreamId) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE streams SET status = ?2, updated_at = ?3 WHERE id = ?1 AND status = ?4",
                params![
                    id,
                    StreamStatus::Streaming,
                    current_timestamp_ms(),
                    StreamStatus::Pending
                ],
            )
            .map_err(StorageError::from)?;

        if changed == 1 {
            return Ok(true);
        }

        // Distinguish "already started" from "unknown id".
        Self::status_of(&conn, id)?;
        Ok(false)
    }

    fn reclaim_stale(&self, older_than: Duration) -> Result<Vec<StreamId>> {
        let now = current_timestamp_ms();
        let age = i64::try_from(older_than.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now.saturating_sub(age);

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StorageError::from)?;

        let ids = {
            let mut stmt = tx
                .prepare(
                    r"
                SELECT id FROM streams
                WHERE status IN ('pending', 'streaming') AND updated_at <= ?1
                ORDER BY created_at, rowid
            ",
                )
                .map_err(StorageError::from)?;
            stmt.query_map(params![cutoff], |row| row.get::<_, StreamId>(0))
                .map_err(StorageError::from)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(StorageError::from)?
        };

        tx.execute(
            r"
            UPDATE streams SET status = ?1, updated_at = ?2
            WHERE status IN ('pending', 'streaming') AND updated_at <= ?3
        ",
            params![StreamStatus::Timeout, now, cutoff],
        )
        .map_err(StorageError::from)?;

        tx.commit().map_err(StorageError::from)?;
        Ok(ids)
    }

    fn get_chunks(&self, id: &StreamId) -> Result<Vec<Chunk>> {
        let conn = self.conn.lock();
        Self::status_of(&conn, id)?;
        Self::chunks_of(&conn, id)
    }

    fn list_streams(&self, status: Option<StreamStatus>) -> Result<Vec<StreamRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(LIST_STREAMS_SQL)
            .map_err(StorageError::from)?;

        let streams = stmt
            .query_map(params![status], |row| {
                Ok(StreamRecord {
                    id: row.get(0)?,
                    status: row.get(1)?,
                    created_at: row.get(2)?,
                    updated_at: row.get(3)?,
                    chunk_count: row.get::<_, i64>(4)? as usize,
                    text_size: row.get::<_, i64>(5)? as usize,
                })
            })
            .map_err(StorageError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;

        Ok(streams)
    }

    fn stats(&self) -> Result<StorageStats> {
        let conn = self.conn.lock();
        let mut stats = StorageStats::default();

        {
            let mut stmt = conn
                .prepare("SELECT status, COUNT(*) FROM streams GROUP BY status")
                .map_err(StorageError::from)?;
            let counts = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, StreamStatus>(0)?, row.get::<_, i64>(1)?))
                })
                .map_err(StorageError::from)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(StorageError::from)?;

            for (status, count) in counts {
                stats.record_status(status, count as usize);
                stats.stream_count += count as usize;
            }
        }

        let (chunk_count, total_text_size): (i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(LENGTH(CAST(text AS BLOB))), 0) FROM chunks",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(StorageError::from)?;
        stats.chunk_count = chunk_count as usize;
        stats.total_text_size = total_text_size as usize;

        stats.schema_version = Self::get_schema_version(&conn)?.unwrap_or(0);
        stats.db_size = self
            .path
            .as_ref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len());

        Ok(stats)
    }
}

impl ToSql for StreamStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for StreamStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: StorageError| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for StreamId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for StreamId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str().map(Self::new)
    }
}
