//! Error types for ptstream operations.
//!
//! This module provides the error hierarchy using `thiserror` for storage,
//! flush policy configuration, stream coordination and CLI commands.
//!
//! Two failure classes never show up here: a refused admission is reported
//! as [`crate::streaming::Admission::AlreadyStarted`], and outbound sink
//! failures are logged and swallowed (see [`crate::streaming::SinkError`]).

use thiserror::Error;

/// Result type alias for ptstream operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Storage-related errors (database operations).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Flush policy construction errors.
    #[error("flush policy error: {0}")]
    Flush(#[from] FlushError),

    /// Stream coordination errors.
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    /// The caller-supplied producer failed while generating text.
    #[error("producer failed: {0}")]
    Producer(anyhow::Error),

    /// I/O errors (file and terminal operations).
    #[error("I/O error: {0}")]
    Io(String),

    /// CLI command errors.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// Configuration errors.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },
}

/// Storage-specific errors for database operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database connection or query error.
    #[error("database error: {0}")]
    Database(String),

    /// Storage not initialized (init command not run).
    #[error("ptstream not initialized. Run: ptstream init")]
    NotInitialized,

    /// Stream not found by ID.
    #[error("stream not found: {id}")]
    StreamNotFound {
        /// Stream ID that was not found.
        id: String,
    },

    /// A stored status value could not be decoded.
    #[error("invalid stream status: {0}")]
    InvalidStatus(String),

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),
}

/// Errors raised while building a flush policy from configuration.
#[derive(Error, Debug)]
pub enum FlushError {
    /// Unknown policy name.
    #[error("unknown flush policy: {name}")]
    UnknownPolicy {
        /// Name of the unknown policy.
        name: String,
    },

    /// Invalid policy parameter.
    #[error("invalid flush policy configuration: {reason}")]
    InvalidConfig {
        /// Reason the configuration is invalid.
        reason: String,
    },

    /// Regex compilation error.
    #[error("regex error: {0}")]
    Regex(String),
}

/// Errors raised by the stream coordinator outside of storage.
#[derive(Error, Debug)]
pub enum StreamError {
    /// The appender was used after its production run was finalized.
    #[error("stream {id} is already finalized")]
    Finalized {
        /// Stream ID.
        id: String,
    },

    /// An earlier flush failed; the run is being aborted.
    #[error("stream {id} aborted after a storage failure")]
    Aborted {
        /// Stream ID.
        id: String,
    },

    /// The production task panicked or was cancelled.
    #[error("production task for stream {id} did not complete: {reason}")]
    TaskFailed {
        /// Stream ID.
        id: String,
        /// Reason reported by the runtime.
        reason: String,
    },
}

/// CLI command-specific errors.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Invalid argument provided.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Command execution failed.
    #[error("command execution failed: {0}")]
    ExecutionFailed(String),
}

impl Error {
    /// Returns true if this error reports an unknown stream identifier.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Storage(StorageError::StreamNotFound { .. }))
    }
}

// Implement From traits for standard library and dependency errors

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(StorageError::Database(err.to_string()))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<regex::Error> for FlushError {
    fn from(err: regex::Error) -> Self {
        Self::Regex(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::NotInitialized;
        assert_eq!(err.to_string(), "ptstream not initialized. Run: ptstream init");

        let err = StorageError::StreamNotFound {
            id: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "stream not found: abc");

        let err = StorageError::InvalidStatus("finished".to_string());
        assert!(err.to_string().contains("finished"));
    }

    #[test]
    fn test_flush_error_display() {
        let err = FlushError::UnknownPolicy {
            name: "foobar".to_string(),
        };
        assert_eq!(err.to_string(), "unknown flush policy: foobar");

        let err = FlushError::InvalidConfig {
            reason: "zero bytes".to_string(),
        };
        assert!(err.to_string().contains("zero bytes"));
    }

    #[test]
    fn test_stream_error_display() {
        let err = StreamError::Finalized {
            id: "s1".to_string(),
        };
        assert_eq!(err.to_string(), "stream s1 is already finalized");

        let err = StreamError::TaskFailed {
            id: "s2".to_string(),
            reason: "panicked".to_string(),
        };
        assert!(err.to_string().contains("panicked"));
    }

    #[test]
    fn test_producer_error_display() {
        let err = Error::Producer(anyhow::anyhow!("model crashed"));
        assert_eq!(err.to_string(), "producer failed: model crashed");
    }

    #[test]
    fn test_is_not_found() {
        let err: Error = StorageError::StreamNotFound {
            id: "x".to_string(),
        }
        .into();
        assert!(err.is_not_found());

        let err: Error = StorageError::NotInitialized.into();
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_from_command() {
        let cmd_err = CommandError::InvalidArgument("--bad".to_string());
        let err: Error = cmd_err.into();
        assert!(matches!(err, Error::Command(_)));
        assert!(err.to_string().contains("invalid argument"));
    }

    #[test]
    fn test_error_config() {
        let err = Error::Config {
            message: "bad config".to_string(),
        };
        assert_eq!(err.to_string(), "configuration error: bad config");
    }

    #[test]
    fn test_from_rusqlite_error_to_error() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: Error = rusqlite_err.into();
        assert!(matches!(err, Error::Storage(StorageError::Database(_))));
    }

    #[test]
    #[allow(clippy::invalid_regex)]
    fn test_from_regex_error_to_flush_error() {
        let regex_err = regex::Regex::new("[invalid").unwrap_err();
        let err: FlushError = regex_err.into();
        assert!(matches!(err, FlushError::Regex(_)));
    }
}
