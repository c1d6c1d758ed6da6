//! Stream production and delivery.
//!
//! - [`coordinator`]: admission, live tee, batched persistence, finalization
//! - [`sink`]: outbound destinations for live bytes
//! - [`hub`]: change notifications for readers
//! - [`reclaim`]: timing out abandoned streams

pub mod coordinator;
pub mod hub;
pub mod reclaim;
pub mod sink;

pub use coordinator::{
    Admission, ChunkAppender, CoordinatorConfig, RunSummary, StreamCoordinator, StreamTask,
};
pub use hub::{DEFAULT_HUB_CAPACITY, StreamSubscription, StreamUpdate, UpdateHub, watch_body};
pub use reclaim::{DEFAULT_SWEEP_INTERVAL, Reclaimer};
pub use sink::{ChannelSink, NullSink, OutboundSink, ResponseBody, SinkError, WriterSink};
