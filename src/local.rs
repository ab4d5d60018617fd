//! An in-memory [`LogicalConnection`].
//!
//! [`LocalConnection`] keeps its state in an [`IoState`] and performs no I/O. It backs sessions
//! whose frames are written by an unrelated component (a [`FrameWriter`](crate::FrameWriter)
//! over a channel, a test harness), and serves as the connection test double.
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use crate::{
    close::{CloseCode, CloseInfo},
    connection::{LogicalConnection, SuspendToken},
    state::{CloseDirection, ConnectionState, IoState},
};

/// A connection living in memory.
///
/// - `close`/`close_with` record an outgoing close handshake step, closing output.
/// - `disconnect` closes both directions at once.
/// - `suspend` stops reading until the token is resumed. Suspensions nest: reading resumes when
///   every outstanding token has been resumed.
#[derive(Debug, Default)]
pub struct LocalConnection {
    io: IoState,
    remote: Option<SocketAddr>,
    suspended: Arc<AtomicUsize>,
    disconnected: AtomicBool,
}

impl LocalConnection {
    /// Creates a connection in the `Connecting` state, without remote address.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a connection reporting `remote` as its peer.
    pub fn with_remote_addr(remote: SocketAddr) -> Self {
        Self {
            remote: Some(remote),
            ..Self::default()
        }
    }

    /// Marks the connection open.
    pub fn on_opened(&self) -> ConnectionState {
        self.io.on_opened()
    }

    /// The first close handshake step observed, if any.
    pub fn close_info(&self) -> Option<CloseInfo> {
        self.io.close_info()
    }

    /// Returns `true` if the connection was torn down by [`LogicalConnection::disconnect`].
    pub fn was_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }

    pub fn io_state(&self) -> &IoState {
        &self.io
    }
}

impl LogicalConnection for LocalConnection {
    fn close_with(&self, code: CloseCode, reason: &str) {
        self.io
            .on_close_handshake(CloseDirection::Outgoing, &CloseInfo::new(code, reason));
    }

    fn disconnect(&self) {
        self.disconnected.store(true, Ordering::Release);
        self.io.on_disconnected();
    }

    fn is_open(&self) -> bool {
        self.io.is_open()
    }

    fn is_input_closed(&self) -> bool {
        self.io.is_input_closed()
    }

    fn is_output_closed(&self) -> bool {
        self.io.is_output_closed()
    }

    fn is_reading(&self) -> bool {
        !self.io.is_input_closed() && self.suspended.load(Ordering::Acquire) == 0
    }

    fn state(&self) -> ConnectionState {
        self.io.state()
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    fn suspend(&self) -> Box<dyn SuspendToken> {
        self.suspended.fetch_add(1, Ordering::AcqRel);
        let suspended = Arc::clone(&self.suspended);
        Box::new(move || {
            suspended.fetch_sub(1, Ordering::AcqRel);
        })
    }

    fn on_close_handshake(&self, direction: CloseDirection, close: &CloseInfo) {
        self.io.on_close_handshake(direction, close);
    }
}
