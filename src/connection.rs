//! The capability a [`Session`](crate::Session) consumes from the connection below it.
use std::net::SocketAddr;

use crate::{
    close::{CloseCode, CloseInfo},
    state::{CloseDirection, ConnectionState},
};

/// A connection as seen by a session.
///
/// This is the physical connection in plain WebSocket use, or a channel of a multiplexed
/// connection. Either way the implementation owns the authoritative state: every query must
/// reflect the live state at call time, since the session consults them before each outbound
/// write and each inbound delivery.
pub trait LogicalConnection: Send + Sync {
    /// Starts the close handshake with [`CloseCode::Normal`].
    fn close(&self) {
        self.close_with(CloseCode::Normal, "");
    }

    /// Starts the close handshake with the given status code and reason.
    fn close_with(&self, code: CloseCode, reason: &str);

    /// Tears the connection down without a close handshake.
    fn disconnect(&self);

    /// Returns `true` until the connection reaches [`ConnectionState::Closed`].
    fn is_open(&self) -> bool;

    /// Returns `true` once no more frames will be read.
    fn is_input_closed(&self) -> bool;

    /// Returns `true` once no more frames may be written.
    fn is_output_closed(&self) -> bool;

    /// Returns `true` while inbound frames are being read, `false` while suspended.
    fn is_reading(&self) -> bool;

    fn state(&self) -> ConnectionState;

    fn remote_addr(&self) -> Option<SocketAddr>;

    /// Stops reading until the returned token is resumed.
    fn suspend(&self) -> Box<dyn SuspendToken>;

    /// Records one step of the close handshake.
    fn on_close_handshake(&self, direction: CloseDirection, close: &CloseInfo);
}

/// Handle returned by [`LogicalConnection::suspend`].
///
/// Resuming consumes the token, so a suspension can be lifted only once.
pub trait SuspendToken: Send {
    /// Re-enables reading on the connection.
    fn resume(self: Box<Self>);
}

/// A token resuming by running a closure.
impl<F> SuspendToken for F
where
    F: FnOnce() + Send,
{
    fn resume(self: Box<Self>) {
        (*self)()
    }
}
