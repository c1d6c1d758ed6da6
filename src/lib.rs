//! # ptstream
//!
//! Persistent text streams.
//!
//! A producer (typically a language model emitting tokens) generates text
//! fragment by fragment. ptstream forwards every fragment to a live
//! consumer as soon as it exists, and durably persists the text in chunks so
//! that any reader can recover what was produced: while it is still being
//! produced, after the live connection drops, and after a process restart.
//!
//! ## Components
//!
//! - **Chunk store** ([`storage`]): append-only chunks per stream plus a
//!   status (`pending`, `streaming`, `done`, `error`, `timeout`), backed by
//!   `SQLite`
//! - **Flush policy** ([`flush`]): decides when accumulated text is persisted
//! - **Stream coordinator** ([`streaming`]): admission, live tee, batching
//!   and finalization of one production run
//! - **HTTP contract** ([`http`]): `200` with a live body or `205` when the
//!   stream already started
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use ptstream::{SqliteStore, StreamCoordinator, StreamStatus};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let store = SqliteStore::in_memory().unwrap();
//! store.init().unwrap();
//! let coordinator = StreamCoordinator::new(Arc::new(store));
//! let id = coordinator.create_stream().unwrap();
//!
//! let response = coordinator
//!     .stream_response(&id, (), |(), append| async move {
//!         append.append("Hi there.").await?;
//!         Ok(())
//!     })
//!     .unwrap();
//! assert_eq!(response.code(), 200);
//! assert_eq!(response.body.read_to_string().await, "Hi there.");
//!
//! response.task.unwrap().wait().await.unwrap();
//! assert_eq!(coordinator.read_body(Some(&id)).unwrap().status, StreamStatus::Done);
//! # });
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cli;
pub mod core;
pub mod error;
pub mod flush;
pub mod http;
pub mod storage;
pub mod streaming;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

// Re-export core domain types
pub use core::{Chunk, StreamBody, StreamId, StreamRecord, StreamStatus};

// Re-export storage types
pub use storage::{ChunkStore, DEFAULT_DB_PATH, SqliteStore, StorageStats};

// Re-export flush policy types
pub use flush::{FlushPolicy, SentencePolicy, available_policies, create_policy};

// Re-export streaming types
pub use streaming::{
    Admission, ChunkAppender, CoordinatorConfig, OutboundSink, Reclaimer, ResponseBody,
    RunSummary, StreamCoordinator, StreamTask, UpdateHub,
};

// Re-export HTTP contract types
pub use http::{ResponseStatus, StreamResponse, stream_response};

// Re-export CLI types
pub use cli::{Cli, Commands, OutputFormat};
