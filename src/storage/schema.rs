//! Database schema definitions.
//!
//! Two related tables: `streams` (indexed by status for the maintenance
//! sweep) and `chunks` (indexed by owning stream, ordered by row id for
//! concatenation).

/// Current schema version.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// SQL schema for initial database setup.
pub const SCHEMA_SQL: &str = r"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_info (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Streams (one row per generation session)
CREATE TABLE IF NOT EXISTS streams (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL CHECK (
        status IN ('pending', 'streaming', 'done', 'error', 'timeout')
    ),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Index for the stale-stream sweep
CREATE INDEX IF NOT EXISTS idx_streams_status ON streams(status, updated_at);

-- Chunks (immutable text fragments, creation order = id order)
CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    stream_id TEXT NOT NULL,
    text TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (stream_id) REFERENCES streams(id)
);

-- Index for ordered concatenation by stream
CREATE INDEX IF NOT EXISTS idx_chunks_stream ON chunks(stream_id, id);
";

/// SQL to check if schema is initialized.
pub const CHECK_SCHEMA_SQL: &str = r"
SELECT COUNT(*) FROM sqlite_master
WHERE type='table' AND name='schema_info';
";

/// SQL to get schema version.
pub const GET_VERSION_SQL: &str = r"
SELECT value FROM schema_info WHERE key = 'version';
";

/// SQL to set schema version.
pub const SET_VERSION_SQL: &str = r"
INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?);
";

/// Chunks of one stream, in creation order.
pub const STREAM_CHUNKS_SQL: &str = r"
SELECT id, stream_id, text, created_at FROM chunks WHERE stream_id = ? ORDER BY id
";

/// Stream rows with chunk aggregates, optionally filtered by status.
pub const LIST_STREAMS_SQL: &str = r"
SELECT s.id, s.status, s.created_at, s.updated_at,
       COUNT(c.id), COALESCE(SUM(LENGTH(CAST(c.text AS BLOB))), 0)
FROM streams s
LEFT JOIN chunks c ON c.stream_id = s.id
WHERE (?1 IS NULL OR s.status = ?1)
GROUP BY s.id
ORDER BY s.created_at, s.rowid
";
