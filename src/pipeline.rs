//! Frame pipeline capabilities.
//!
//! Frames travel through two chains of stages:
//!
//! - inbound, from the connection through the session to the application handler, every stage
//!   implementing [`IncomingFrames`];
//! - outbound, from the session through the extension chain to the wire, every stage implementing
//!   [`OutgoingFrames`].
//!
//! Outbound writes are asynchronous. Each frame travels with a [`Completion`] that the last stage
//! settles exactly once, reporting success or failure back to the caller that made the write.
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{ready, Context, Poll},
};

use futures::channel::oneshot;
use pin_project::pin_project;

use crate::{frame::Frame, Result, WebSocketError};

/// Receiver of inbound frames and protocol errors.
///
/// Protocol errors are delivered as values: a malformed frame or a policy violation is reported
/// through [`incoming_error`](IncomingFrames::incoming_error) and never raised to the caller.
///
/// Deliveries to one receiver are serialized by the connection's read path.
pub trait IncomingFrames: Send + Sync {
    fn incoming_frame(&self, frame: Frame);

    /// Receives a protocol error, one for which [`WebSocketError::is_protocol_error`] holds.
    ///
    /// Local rejections (`OutgoingNotConfigured`, `AlreadyConnected`, `InvalidRange`) and
    /// downstream write failures are never delivered here; they reach the caller as a return
    /// value or through the write's [`Completion`].
    fn incoming_error(&self, err: WebSocketError);
}

impl<T: IncomingFrames + ?Sized> IncomingFrames for Arc<T> {
    fn incoming_frame(&self, frame: Frame) {
        (**self).incoming_frame(frame)
    }

    fn incoming_error(&self, err: WebSocketError) {
        (**self).incoming_error(err)
    }
}

impl<T: IncomingFrames + ?Sized> IncomingFrames for Box<T> {
    fn incoming_frame(&self, frame: Frame) {
        (**self).incoming_frame(frame)
    }

    fn incoming_error(&self, err: WebSocketError) {
        (**self).incoming_error(err)
    }
}

/// A stage of the outbound pipeline.
///
/// `output` submits and returns without waiting for the write. The implementation must
/// eventually settle `completion` exactly once, with the outcome of the write, either itself or
/// by handing it down to the next stage.
pub trait OutgoingFrames: Send + Sync {
    fn output(&self, frame: Frame, completion: Completion);
}

impl<T: OutgoingFrames + ?Sized> OutgoingFrames for Arc<T> {
    fn output(&self, frame: Frame, completion: Completion) {
        (**self).output(frame, completion)
    }
}

/// Completion callback of one outbound write.
///
/// Binds the caller's context to the caller's callback, so the context comes back unchanged
/// when the write settles. Settling consumes the completion, which therefore fires at most once.
/// Dropping it without settling means the callback never runs.
pub struct Completion {
    callback: Box<dyn FnOnce(Result<()>) + Send>,
}

impl Completion {
    /// Creates a completion handing `context` back to `callback` once the write settles.
    ///
    /// # Example
    /// ```rust
    /// use wsession::Completion;
    ///
    /// let completion = Completion::new(42u32, |id, result| {
    ///     assert_eq!(id, 42);
    ///     assert!(result.is_ok());
    /// });
    /// completion.succeeded();
    /// ```
    pub fn new<C, F>(context: C, callback: F) -> Self
    where
        C: Send + 'static,
        F: FnOnce(C, Result<()>) + Send + 'static,
    {
        Self {
            callback: Box::new(move |result| callback(context, result)),
        }
    }

    /// A completion nobody waits for.
    pub fn noop() -> Self {
        Self {
            callback: Box::new(|_| {}),
        }
    }

    /// Creates a completion paired with a future resolving to the write's outcome.
    ///
    /// If the completion is dropped without being settled, the future resolves to
    /// [`WebSocketError::ConnectionClosed`].
    pub fn channel() -> (Self, WriteFuture) {
        let (tx, rx) = oneshot::channel();
        let completion = Self {
            callback: Box::new(move |result| {
                let _ = tx.send(result);
            }),
        };
        (completion, WriteFuture { rx })
    }

    /// Reports a successful write.
    pub fn succeeded(self) {
        self.complete(Ok(()))
    }

    /// Reports a failed write.
    pub fn failed(self, err: WebSocketError) {
        self.complete(Err(err))
    }

    /// Settles the write with `result`.
    pub fn complete(self, result: Result<()>) {
        (self.callback)(result)
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}

/// Future returned by [`Completion::channel`], resolving once the write settles.
#[pin_project]
#[derive(Debug)]
pub struct WriteFuture {
    #[pin]
    rx: oneshot::Receiver<Result<()>>,
}

impl Future for WriteFuture {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match ready!(this.rx.poll(cx)) {
            Ok(result) => Poll::Ready(result),
            Err(oneshot::Canceled) => Poll::Ready(Err(WebSocketError::ConnectionClosed)),
        }
    }
}
