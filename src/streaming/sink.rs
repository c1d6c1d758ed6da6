//! Outbound sinks: the live destination of produced bytes.
//!
//! A sink can fail independently of persistence. The coordinator drops a
//! sink on its first failure and keeps persisting, so a broken client
//! connection never costs durable text.

use async_trait::async_trait;
use futures_util::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Failure of an outbound sink. Logged and swallowed by the coordinator.
#[derive(Error, Debug)]
pub enum SinkError {
    /// The receiving side went away (client disconnected).
    #[error("outbound receiver closed")]
    Closed,

    /// Writing to the underlying transport failed.
    #[error("outbound write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Live destination for produced text.
///
/// Writes are issued strictly in fragment order from a single task.
#[async_trait]
pub trait OutboundSink: Send {
    /// Forwards one fragment's bytes.
    async fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError>;

    /// Signals end of output. Called at most once.
    async fn close(&mut self) -> Result<(), SinkError>;
}

#[async_trait]
impl<S> OutboundSink for Box<S>
where
    S: OutboundSink + ?Sized,
{
    async fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        (**self).write(bytes).await
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        (**self).close().await
    }
}

/// Sink feeding an in-process channel, read back as a [`ResponseBody`].
///
/// The channel is unbounded: the generator never waits on the network.
#[derive(Debug)]
pub struct ChannelSink {
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

impl ChannelSink {
    /// Creates a connected sink/body pair.
    #[must_use]
    pub fn channel() -> (Self, ResponseBody) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self { tx: Some(tx) },
            ResponseBody {
                inner: UnboundedReceiverStream::new(rx),
            },
        )
    }
}

#[async_trait]
impl OutboundSink for ChannelSink {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        let tx = self.tx.as_ref().ok_or(SinkError::Closed)?;
        tx.send(bytes.to_vec()).map_err(|_| SinkError::Closed)
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        // Dropping the sender ends the body stream.
        self.tx = None;
        Ok(())
    }
}

/// Sink writing to any async writer (a socket, stdout, a file).
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Wraps a writer.
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Returns the wrapped writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W> OutboundSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// Sink discarding everything, for runs with no live client.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl OutboundSink for NullSink {
    async fn write(&mut self, _bytes: &[u8]) -> Result<(), SinkError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Readable byte stream handed back to the transport layer.
///
/// Yields one item per forwarded fragment and ends when the production run
/// closes its sink.
#[derive(Debug)]
pub struct ResponseBody {
    inner: UnboundedReceiverStream<Vec<u8>>,
}

impl ResponseBody {
    /// A body that ends immediately.
    #[must_use]
    pub fn empty() -> Self {
        let (_, body) = ChannelSink::channel();
        body
    }

    /// Drains the body into a string (lossy on invalid UTF-8).
    pub async fn read_to_string(self) -> String {
        use futures_util::StreamExt;

        let bytes: Vec<u8> = self
            .inner
            .fold(Vec::new(), |mut acc, part| async move {
                acc.extend_from_slice(&part);
                acc
            })
            .await;
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Stream for ResponseBody {
    type Item = Vec<u8>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
