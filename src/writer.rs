//! Single-writer queue turning a frame sink into an [`OutgoingFrames`] pipeline.
//!
//! Any number of threads may submit frames through a [`FrameWriter`]; one driver future pulls
//! them off an unbounded queue and writes them to the sink strictly in submission order, one
//! at a time, settling each frame's [`Completion`] with the outcome of its write.
use std::future::Future;

use futures::{
    channel::mpsc::{self, UnboundedReceiver, UnboundedSender},
    Sink, SinkExt, StreamExt,
};

use crate::{frame::Frame, pipeline::Completion, pipeline::OutgoingFrames, Result, WebSocketError};

type Request = (Frame, Completion);

/// Submitting end of the single-writer queue.
///
/// `FrameWriter` is cheap to clone; all clones feed the same driver.
///
/// # Example
/// ```rust
/// use futures::{SinkExt, StreamExt};
/// use wsession::{frame::Frame, Completion, FrameWriter, OutgoingFrames, WebSocketError};
///
/// #[tokio::main]
/// async fn main() {
///     let (tx, mut rx) = futures::channel::mpsc::unbounded::<Frame>();
///     let sink = tx.sink_map_err(|_| WebSocketError::ConnectionClosed);
///     let (writer, task) = FrameWriter::spawn(sink);
///
///     let (completion, written) = Completion::channel();
///     writer.output(Frame::text("hello"), completion);
///     written.await.unwrap();
///
///     assert_eq!(rx.next().await.unwrap().to_str().unwrap(), "hello");
///
///     writer.shutdown();
///     task.await.unwrap().unwrap();
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FrameWriter {
    tx: UnboundedSender<Request>,
}

impl FrameWriter {
    /// Creates a writer over `sink`, returning the driver future performing the writes.
    ///
    /// The driver resolves once every `FrameWriter` is dropped or [`shut down`](Self::shutdown)
    /// and the queue is drained, closing the sink. If a write fails, the failing frame's
    /// completion receives the sink error, every queued and later frame fails with
    /// [`WebSocketError::ConnectionClosed`], and the driver resolves to that same error.
    pub fn new<S>(sink: S) -> (Self, impl Future<Output = Result<()>>)
    where
        S: Sink<Frame, Error = WebSocketError> + Unpin,
    {
        let (tx, rx) = mpsc::unbounded();
        (Self { tx }, drive(rx, sink))
    }

    /// Creates a writer and spawns its driver on the tokio runtime.
    pub fn spawn<S>(sink: S) -> (Self, tokio::task::JoinHandle<Result<()>>)
    where
        S: Sink<Frame, Error = WebSocketError> + Unpin + Send + 'static,
    {
        let (writer, driver) = Self::new(sink);
        (writer, tokio::spawn(driver))
    }

    /// Stops accepting frames. Frames already queued are still written.
    pub fn shutdown(&self) {
        self.tx.close_channel();
    }

    /// Returns `true` once the writer no longer accepts frames.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl OutgoingFrames for FrameWriter {
    fn output(&self, frame: Frame, completion: Completion) {
        if let Err(err) = self.tx.unbounded_send((frame, completion)) {
            let (_, completion) = err.into_inner();
            completion.failed(WebSocketError::ConnectionClosed);
        }
    }
}

async fn drive<S>(mut rx: UnboundedReceiver<Request>, mut sink: S) -> Result<()>
where
    S: Sink<Frame, Error = WebSocketError> + Unpin,
{
    #[cfg(feature = "logging")]
    log::debug!("frame writer started");

    while let Some((frame, completion)) = rx.next().await {
        if let Err(err) = sink.send(frame).await {
            #[cfg(feature = "logging")]
            log::warn!("frame writer failed: {}", err);

            rx.close();
            completion.failed(err);

            while let Some((_, completion)) = rx.next().await {
                completion.failed(WebSocketError::ConnectionClosed);
            }
            return Err(WebSocketError::ConnectionClosed);
        }

        completion.succeeded();
    }

    #[cfg(feature = "logging")]
    log::debug!("frame writer stopped");

    sink.close().await
}
