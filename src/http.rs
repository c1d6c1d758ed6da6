//! Transport-neutral HTTP response contract for stream requests.
//!
//! A request for a stream either wins admission and receives `200` with a
//! body that streams the produced text live, or finds the stream already
//! started and receives `205 Reset Content` with an empty body. A web
//! framework adapter only has to map [`StreamResponse`] onto its own types.

use crate::core::StreamId;
use crate::error::Result;
use crate::streaming::{
    Admission, ChannelSink, ChunkAppender, ResponseBody, StreamCoordinator, StreamTask,
};
use serde::Serialize;
use std::future::Future;

/// Status line of a stream response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// `200 OK`: this request drives the stream.
    Ok,
    /// `205 Reset Content`: the stream was already started elsewhere.
    ResetContent,
}

impl ResponseStatus {
    /// Numeric HTTP status code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::ResetContent => 205,
        }
    }
}

/// Response to a stream request.
#[derive(Debug)]
pub struct StreamResponse {
    /// Status to send.
    pub status: ResponseStatus,
    /// Body; empty for `205`.
    pub body: ResponseBody,
    /// The production run, present for `200`.
    pub task: Option<StreamTask>,
}

impl StreamResponse {
    /// Numeric HTTP status code.
    #[must_use]
    pub const fn code(&self) -> u16 {
        self.status.code()
    }
}

/// Handles a stream request.
///
/// The `request` payload is handed to `producer` together with the
/// appender, so producers can be written as plain request handlers.
///
/// # Errors
///
/// Returns `StreamNotFound` for unknown ids, or a storage error.
pub fn stream_response<R, P, Fut>(
    coordinator: &StreamCoordinator,
    id: &StreamId,
    request: R,
    producer: P,
) -> Result<StreamResponse>
where
    R: Send + 'static,
    P: FnOnce(R, ChunkAppender) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let (sink, body) = ChannelSink::channel();
    let admission = coordinator.begin_stream(id, move |append| producer(request, append), sink)?;

    Ok(match admission {
        Admission::Started(task) => StreamResponse {
            status: ResponseStatus::Ok,
            body,
            task: Some(task),
        },
        Admission::AlreadyStarted => StreamResponse {
            status: ResponseStatus::ResetContent,
            body: ResponseBody::empty(),
            task: None,
        },
    })
}

impl StreamCoordinator {
    /// Handles a stream request; see [`stream_response`].
    ///
    /// # Errors
    ///
    /// Returns `StreamNotFound` for unknown ids, or a storage error.
    pub fn stream_response<R, P, Fut>(
        &self,
        id: &StreamId,
        request: R,
        producer: P,
    ) -> Result<StreamResponse>
    where
        R: Send + 'static,
        P: FnOnce(R, ChunkAppender) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        stream_response(self, id, request, producer)
    }
}
