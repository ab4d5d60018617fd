//! The WebSocket session: one per established connection.
//!
//! A [`Session`] sits between a [`LogicalConnection`] and the application [`Handler`]:
//!
//! ```text
//! application ── write_text / write_binary / ping ──▶ Session ──▶ OutgoingFrames ──▶ wire
//! wire ──▶ LogicalConnection ──▶ Session::incoming_* ──▶ Handler (unless input is closed)
//! ```
//!
//! # Half-closed connections
//! Writes made once the connection's output is closed are dropped silently: the call returns
//! `Ok(())`, nothing reaches the pipeline and the callback never runs. Likewise frames and
//! errors arriving once input is closed are not delivered to the handler. Callers racing a close
//! need no error handling for it. The async helpers ([`Session::send_text`] and friends) report
//! the dropped write as [`WebSocketError::ConnectionClosed`], since their future would otherwise
//! never settle.
//!
//! # Concurrency
//! Outbound calls may come from any number of threads. Submissions into the pipeline are
//! serialized by the session, so an unsynchronized pipeline never sees two frames at once. The
//! lock is reentrant: a pipeline settling a completion synchronously may have its callback
//! write again on the same thread.
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock, Weak,
    },
};

use bytes::Bytes;
use parking_lot::{ReentrantMutex, RwLock};

use crate::{
    close::{CloseCode, CloseInfo},
    connection::{LogicalConnection, SuspendToken},
    frame::Frame,
    pipeline::{Completion, IncomingFrames, OutgoingFrames},
    policy::WebSocketPolicy,
    state::{CloseDirection, ConnectionState},
    Result, WebSocketError,
};

/// The application side of a session.
///
/// On top of receiving frames and errors, a handler is given a back reference to its session
/// when the session connects, so that it can write and close without holding a session
/// pointer of its own. [`SessionSlot`] is a ready-made place to keep it.
pub trait Handler: IncomingFrames {
    /// Registers the session. Called once, by [`Session::on_connect`], right before
    /// [`Handler::on_connect`].
    ///
    /// The reference is weak: the session owns its handler, not the other way around.
    fn attach(&self, session: Weak<Session>);

    /// The session is connected. The session is already attached and may be used.
    fn on_connect(&self) {}
}

impl<T: Handler + ?Sized> Handler for Arc<T> {
    fn attach(&self, session: Weak<Session>) {
        (**self).attach(session)
    }

    fn on_connect(&self) {
        (**self).on_connect()
    }
}

/// Storage for the back reference a [`Handler`] receives in [`Handler::attach`].
#[derive(Debug, Default)]
pub struct SessionSlot {
    session: OnceLock<Weak<Session>>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the session. Returns `false` if a session was already attached.
    pub fn attach(&self, session: Weak<Session>) -> bool {
        self.session.set(session).is_ok()
    }

    /// Returns the session, or `None` if not attached yet or already dropped.
    pub fn get(&self) -> Option<Arc<Session>> {
        self.session.get().and_then(Weak::upgrade)
    }

    pub fn is_attached(&self) -> bool {
        self.session.get().is_some()
    }
}

/// One WebSocket session.
///
/// Created once the handshake completes, with the negotiated connection, the application handler,
/// the policy and the subprotocol. The handler is owned by the session; the connection is shared
/// and the session never manages its lifecycle beyond requesting close or disconnect.
///
/// The outgoing pipeline is configured after construction with [`Session::set_outgoing`], and
/// may be replaced later, for instance when extensions are reconfigured.
///
/// After the connection closes the session stays usable for inspection: state, remote address,
/// policy and subprotocol.
pub struct Session {
    policy: WebSocketPolicy,
    subprotocol: String,
    handler: Box<dyn Handler>,
    connection: Arc<dyn LogicalConnection>,
    outgoing: RwLock<Option<Arc<dyn OutgoingFrames>>>,
    write_lock: ReentrantMutex<()>,
    connected: AtomicBool,
}

impl Session {
    /// Creates a session. Call [`Session::set_outgoing`] and then [`Session::on_connect`] to
    /// start it.
    pub fn new<H>(
        handler: H,
        connection: Arc<dyn LogicalConnection>,
        policy: WebSocketPolicy,
        subprotocol: impl Into<String>,
    ) -> Arc<Self>
    where
        H: Handler + 'static,
    {
        Arc::new(Self {
            policy,
            subprotocol: subprotocol.into(),
            handler: Box::new(handler),
            connection,
            outgoing: RwLock::new(None),
            write_lock: ReentrantMutex::new(()),
            connected: AtomicBool::new(false),
        })
    }

    /// Sets, or replaces, the outgoing pipeline.
    ///
    /// Every outbound call made after this returns is submitted to `outgoing`.
    pub fn set_outgoing(&self, outgoing: Arc<dyn OutgoingFrames>) {
        let previous = self.outgoing.write().replace(outgoing);

        #[cfg(feature = "logging")]
        log::debug!(
            "set_outgoing() subprotocol={:?} replaced={}",
            self.subprotocol,
            previous.is_some()
        );

        drop(previous);
    }

    /// The current outgoing pipeline.
    pub fn outgoing(&self) -> Option<Arc<dyn OutgoingFrames>> {
        self.outgoing.read().clone()
    }

    /// The application handler receiving this session's inbound traffic.
    pub fn handler(&self) -> &dyn Handler {
        &*self.handler
    }

    /// The connection this session runs over.
    pub fn connection(&self) -> &Arc<dyn LogicalConnection> {
        &self.connection
    }

    /// Connects the session to its handler.
    ///
    /// Attaches the session to the handler first, then fires [`Handler::on_connect`], so the
    /// handler may use the session from within its connect callback.
    ///
    /// # Errors
    /// Returns [`WebSocketError::AlreadyConnected`] on any call after the first.
    pub fn on_connect(self: &Arc<Self>) -> Result<()> {
        if self.connected.swap(true, Ordering::AcqRel) {
            return Err(WebSocketError::AlreadyConnected);
        }

        #[cfg(feature = "logging")]
        log::debug!("on_connect() subprotocol={:?}", self.subprotocol);

        self.handler.attach(Arc::downgrade(self));
        self.handler.on_connect();

        Ok(())
    }

    /// Writes a text message as a single final TEXT frame.
    ///
    /// `callback` receives `context` back once the pipeline settles the write.
    pub fn write_text<C, F>(&self, context: C, callback: F, text: impl Into<String>) -> Result<()>
    where
        C: Send + 'static,
        F: FnOnce(C, Result<()>) + Send + 'static,
    {
        self.submit(Completion::new(context, callback), || {
            let text = text.into();

            #[cfg(feature = "logging")]
            log::debug!("write_text(len={})", text.len());

            Ok(Frame::text(text))
        })
    }

    /// Writes a binary message as a single final BINARY frame.
    pub fn write_binary<C, F>(
        &self,
        context: C,
        callback: F,
        payload: impl Into<Bytes>,
    ) -> Result<()>
    where
        C: Send + 'static,
        F: FnOnce(C, Result<()>) + Send + 'static,
    {
        self.submit(Completion::new(context, callback), || {
            let frame = Frame::binary(payload);

            #[cfg(feature = "logging")]
            log::debug!("write_binary(len={})", frame.payload().len());

            Ok(frame)
        })
    }

    /// Writes `len` bytes of `buf` starting at `offset` as a single final BINARY frame.
    ///
    /// # Errors
    /// Returns [`WebSocketError::InvalidRange`] if the range does not fit in `buf`. The callback
    /// is not invoked in that case.
    pub fn write_binary_range<C, F>(
        &self,
        context: C,
        callback: F,
        buf: &[u8],
        offset: usize,
        len: usize,
    ) -> Result<()>
    where
        C: Send + 'static,
        F: FnOnce(C, Result<()>) + Send + 'static,
    {
        self.submit(Completion::new(context, callback), || {
            #[cfg(feature = "logging")]
            log::debug!("write_binary_range(offset={offset}, len={len})");

            Frame::binary_range(buf, offset, len)
        })
    }

    /// Sends a PING frame carrying `payload`.
    ///
    /// # Errors
    /// Returns [`WebSocketError::ControlFrameTooLarge`] if `payload` exceeds 125 bytes. The
    /// callback is not invoked in that case.
    pub fn ping<C, F>(&self, context: C, callback: F, payload: impl Into<Bytes>) -> Result<()>
    where
        C: Send + 'static,
        F: FnOnce(C, Result<()>) + Send + 'static,
    {
        self.submit(Completion::new(context, callback), || {
            let frame = Frame::ping(payload)?;

            #[cfg(feature = "logging")]
            log::debug!("ping(len={})", frame.payload().len());

            Ok(frame)
        })
    }

    /// Writes a text message and waits for the pipeline to settle it.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        let (completion, fut) = Completion::channel();
        self.submit(completion, || Ok(Frame::text(text.into())))?;
        fut.await
    }

    /// Writes a binary message and waits for the pipeline to settle it.
    pub async fn send_binary(&self, payload: impl Into<Bytes>) -> Result<()> {
        let (completion, fut) = Completion::channel();
        self.submit(completion, || Ok(Frame::binary(payload)))?;
        fut.await
    }

    /// Sends a PING frame and waits for the pipeline to settle it.
    pub async fn send_ping(&self, payload: impl Into<Bytes>) -> Result<()> {
        let (completion, fut) = Completion::channel();
        self.submit(completion, || Frame::ping(payload))?;
        fut.await
    }

    /// Serializes data to JSON and writes it as a text message.
    ///
    /// This method requires the `json` feature to be enabled in your Cargo.toml:
    /// ```toml
    /// [dependencies]
    /// wsession = { version = "0.1", features = ["json"] }
    /// ```
    #[cfg(feature = "json")]
    #[cfg_attr(docsrs, doc(cfg(feature = "json")))]
    pub async fn send_json<T: serde::Serialize>(&self, data: &T) -> Result<()> {
        let bytes = serde_json::to_vec(data)?;
        let (completion, fut) = Completion::channel();
        self.submit(completion, || Ok(Frame::text(bytes)))?;
        fut.await
    }

    /// Starts the close handshake with [`CloseCode::Normal`].
    ///
    /// The connection builds and sends the CLOSE frame.
    pub fn close(&self) {
        self.connection.close();
    }

    /// Starts the close handshake with the given status code and reason.
    pub fn close_with(&self, code: CloseCode, reason: &str) {
        self.connection.close_with(code, reason);
    }

    /// Tears the connection down without a close handshake.
    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    /// Stops reading until the returned token is resumed.
    pub fn suspend(&self) -> Box<dyn SuspendToken> {
        self.connection.suspend()
    }

    /// Reports a close handshake step to the connection.
    pub fn on_close_handshake(&self, direction: CloseDirection, close: &CloseInfo) {
        self.connection.on_close_handshake(direction, close);
    }

    /// Returns `true` if the connection currently reports itself open.
    pub fn is_open(&self) -> bool {
        self.connection.is_open()
    }

    /// Returns `true` if the connection is delivering inbound frames, i.e. input is open and
    /// reading is not suspended.
    pub fn is_reading(&self) -> bool {
        self.connection.is_reading()
    }

    /// Returns `true` once the connection's input is closed. Inbound frames are dropped from then on.
    pub fn is_input_closed(&self) -> bool {
        self.connection.is_input_closed()
    }

    /// Returns `true` once the connection's output is closed. Writes are dropped from then on.
    pub fn is_output_closed(&self) -> bool {
        self.connection.is_output_closed()
    }

    /// The connection's current state.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// The peer address, if the connection knows it.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.connection.remote_addr()
    }

    /// The policy the session was created with.
    pub fn policy(&self) -> &WebSocketPolicy {
        &self.policy
    }

    /// The negotiated subprotocol, empty if none was.
    pub fn subprotocol(&self) -> &str {
        &self.subprotocol
    }

    /// Builds and submits one frame, unless output is closed.
    ///
    /// When output is closed `build` is not run and `completion` is dropped unsettled.
    fn submit<B>(&self, completion: Completion, build: B) -> Result<()>
    where
        B: FnOnce() -> Result<Frame>,
    {
        if self.connection.is_output_closed() {
            #[cfg(feature = "logging")]
            log::debug!("output closed, dropping write");

            return Ok(());
        }

        let frame = build()?;
        let outgoing = self
            .outgoing()
            .ok_or(WebSocketError::OutgoingNotConfigured)?;

        let _guard = self.write_lock.lock();
        outgoing.output(frame, completion);

        Ok(())
    }
}

impl IncomingFrames for Session {
    fn incoming_frame(&self, frame: Frame) {
        if self.connection.is_input_closed() {
            return; // input is closed
        }
        self.handler.incoming_frame(frame);
    }

    fn incoming_error(&self, err: WebSocketError) {
        if self.connection.is_input_closed() {
            return; // input is closed
        }
        if !err.is_protocol_error() {
            #[cfg(feature = "logging")]
            log::warn!("dropping non-protocol inbound error: {}", err);
            return;
        }
        self.handler.incoming_error(err);
    }
}

/// Forwards frames to the configured pipeline, letting outer stages compose over a session.
///
/// Control frames carrying more than 125 bytes are not forwarded; their completion fails with
/// [`WebSocketError::ControlFrameTooLarge`].
impl OutgoingFrames for Session {
    fn output(&self, frame: Frame, completion: Completion) {
        #[cfg(feature = "logging")]
        log::debug!("output({:?}, fin={})", frame.opcode(), frame.fin());

        if frame.is_control() {
            if let Err(err) = self.policy.assert_valid_control_payload(frame.payload().len()) {
                completion.failed(err);
                return;
            }
        }

        match self.outgoing() {
            Some(outgoing) => {
                let _guard = self.write_lock.lock();
                outgoing.output(frame, completion);
            }
            None => completion.failed(WebSocketError::OutgoingNotConfigured),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("subprotocol", &self.subprotocol)
            .field("role", &self.policy.role)
            .field("state", &self.connection.state())
            .field("outgoing", &self.outgoing.read().is_some())
            .finish()
    }
}
