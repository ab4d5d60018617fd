//! Connection state and half-close tracking.
//!
//! The session never tracks state of its own: it asks its [`LogicalConnection`](crate::LogicalConnection).
//! [`IoState`] is the bookkeeping a connection implementation can embed to answer those questions,
//! following the close handshake of [RFC 6455 Section 7](https://datatracker.ietf.org/doc/html/rfc6455#section-7).
use parking_lot::Mutex;

use crate::close::CloseInfo;

/// The lifecycle state of a WebSocket connection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// The handshake is still in progress.
    Connecting,
    /// Both directions are open.
    Open,
    /// One side of the close handshake happened; one direction is closed.
    Closing,
    /// Both directions are closed.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Open => write!(f, "OPEN"),
            Self::Closing => write!(f, "CLOSING"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Which way a CLOSE frame travelled during the close handshake.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CloseDirection {
    /// The peer sent the CLOSE frame: no more input will follow.
    Incoming,
    /// This endpoint sent the CLOSE frame: no more output may follow.
    Outgoing,
}

#[derive(Debug)]
struct Inner {
    state: ConnectionState,
    input_closed: bool,
    output_closed: bool,
    close_info: Option<CloseInfo>,
    clean_close: bool,
}

/// Thread-safe tracker of a connection's state and half-closed directions.
///
/// - `on_opened` moves `Connecting` to `Open`.
/// - `on_close_handshake(Incoming, ..)` closes input, `on_close_handshake(Outgoing, ..)` closes output.
///   The first one moves the state to `Closing`, the second to `Closed`.
/// - `on_disconnected` closes both directions at once, without a clean close.
///
/// The first observed [`CloseInfo`] is retained for inspection after close.
#[derive(Debug)]
pub struct IoState {
    inner: Mutex<Inner>,
}

impl Default for IoState {
    fn default() -> Self {
        Self::new()
    }
}

impl IoState {
    /// Creates a tracker in the `Connecting` state.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: ConnectionState::Connecting,
                input_closed: false,
                output_closed: false,
                close_info: None,
                clean_close: false,
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() != ConnectionState::Closed
    }

    pub fn is_input_closed(&self) -> bool {
        self.inner.lock().input_closed
    }

    pub fn is_output_closed(&self) -> bool {
        self.inner.lock().output_closed
    }

    /// The CLOSE observed first, if any.
    pub fn close_info(&self) -> Option<CloseInfo> {
        self.inner.lock().close_info.clone()
    }

    /// Returns `true` once both CLOSE frames were exchanged.
    pub fn was_clean_close(&self) -> bool {
        self.inner.lock().clean_close
    }

    /// The handshake completed, the connection is usable. Returns the new state.
    pub fn on_opened(&self) -> ConnectionState {
        let mut inner = self.inner.lock();
        if inner.state == ConnectionState::Connecting {
            inner.state = ConnectionState::Open;
        }
        inner.state
    }

    /// Records one step of the close handshake. Returns the new state.
    pub fn on_close_handshake(&self, direction: CloseDirection, close: &CloseInfo) -> ConnectionState {
        let mut inner = self.inner.lock();
        if inner.state == ConnectionState::Closed {
            return inner.state;
        }

        if inner.close_info.is_none() {
            inner.close_info = Some(close.clone());
        }

        match direction {
            CloseDirection::Incoming => inner.input_closed = true,
            CloseDirection::Outgoing => inner.output_closed = true,
        }

        if inner.input_closed && inner.output_closed {
            inner.clean_close = true;
            inner.state = ConnectionState::Closed;
        } else {
            inner.state = ConnectionState::Closing;
        }

        #[cfg(feature = "logging")]
        log::debug!(
            "close handshake {:?} code={} -> {}",
            direction,
            close.code(),
            inner.state
        );

        inner.state
    }

    /// The connection went away without completing the close handshake.
    pub fn on_disconnected(&self) -> ConnectionState {
        let mut inner = self.inner.lock();
        inner.input_closed = true;
        inner.output_closed = true;
        inner.state = ConnectionState::Closed;
        inner.state
    }
}
