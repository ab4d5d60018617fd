//! # wsession
//! The session layer of a WebSocket (RFC 6455) endpoint: the component sitting between a
//! logical connection and the application handler of one WebSocket connection.
//!
//! A [`Session`] translates application calls (`write_text`, `write_binary`, `ping`, `close`)
//! into single, FIN-terminated frames submitted to an outgoing pipeline, and forwards inbound
//! frames and protocol errors to the application handler. It honours half-closed connections:
//! nothing is written once output is closed and nothing is delivered once input is closed.
//!
//! The session stays agnostic of what lies on either side of it. Everything it talks to is a
//! small capability trait:
//!
//! - [`LogicalConnection`]: connection state, close/disconnect, remote address and read suspension.
//! - [`OutgoingFrames`]: the extension chain or physical writer accepting frames.
//! - [`IncomingFrames`]: the receiver of decoded frames and protocol errors, implemented by the
//!   application [`Handler`].
//!
//! # Features
//! The crate provides several optional features that can be enabled in your `Cargo.toml`:
//!
//! - `logging`: Enables debug logging of session lifecycle and frame submission using the `log` crate.
//!   Useful for debugging WebSocket connections.
//!
//! - `json`: Enables serialization of JSON data through [`Session::send_json`].
//!
//! ## Usage Example
//! ```toml
//! [dependencies]
//! wsession = { version = "0.1", features = ["logging"] }
//! ```
//!
//! # Example
//! ```rust
//! use std::sync::{Arc, Weak};
//! use wsession::{
//!     frame::Frame, Handler, IncomingFrames, LocalConnection, Session, SessionSlot,
//!     WebSocketError, WebSocketPolicy,
//! };
//!
//! #[derive(Default)]
//! struct Echo {
//!     session: SessionSlot,
//! }
//!
//! impl IncomingFrames for Echo {
//!     fn incoming_frame(&self, frame: Frame) {
//!         if let Some(session) = self.session.get() {
//!             let _ = session.write_binary((), |_, _| {}, frame.into_payload());
//!         }
//!     }
//!
//!     fn incoming_error(&self, _err: WebSocketError) {}
//! }
//!
//! impl Handler for Echo {
//!     fn attach(&self, session: Weak<Session>) {
//!         self.session.attach(session);
//!     }
//! }
//!
//! let connection = Arc::new(LocalConnection::new());
//! let session = Session::new(Echo::default(), connection, WebSocketPolicy::new_server_policy(), "chat");
//! session.on_connect().unwrap();
//! assert!(session.is_open());
//! ```
//!
//! # Writing frames
//! Every write takes a caller context and a completion callback. The context is handed back untouched once
//! the pipeline confirms or fails the write. The session never invokes the callback itself: the
//! pipeline does, exactly once. Use [`FrameWriter`] to turn any `futures::Sink<Frame>` into a
//! serialized pipeline.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod close;
pub mod connection;
pub mod frame;
pub mod local;
pub mod pipeline;
pub mod policy;
pub mod session;
pub mod state;
pub mod writer;

use thiserror::Error;

// Re-exports
pub use close::{CloseCode, CloseInfo};
pub use connection::{LogicalConnection, SuspendToken};
pub use frame::{Frame, OpCode};
pub use local::LocalConnection;
pub use pipeline::{Completion, IncomingFrames, OutgoingFrames, WriteFuture};
pub use policy::{PolicyEnforcer, Role, WebSocketPolicy};
pub use session::{Handler, Session, SessionSlot};
pub use state::{CloseDirection, ConnectionState, IoState};
pub use writer::FrameWriter;

/// A result type for WebSocket operations, using `WebSocketError` as the error type.
pub type Result<T> = std::result::Result<T, WebSocketError>;

/// Represents errors that can occur during WebSocket session operations.
///
/// The variants fall in three groups:
///
/// - Protocol errors (e.g., invalid frames, oversized payloads). These are values delivered to the
///   application handler through [`IncomingFrames::incoming_error`], never raised.
/// - Local rejections of an outbound call (e.g., an out of range slice, an oversized ping). These
///   are returned synchronously and the write callback is not involved.
/// - Downstream failures (closed connection, I/O errors) reported through the write callback.
#[derive(Error, Debug)]
pub enum WebSocketError {
    /// Occurs when receiving a WebSocket fragment that violates the protocol specification,
    /// such as receiving a new fragment before completing the previous one.
    #[error("Invalid fragment")]
    InvalidFragment,

    /// Indicates that a text frame or close frame reason contains invalid UTF-8 data.
    /// According to RFC 6455, all text payloads must be valid UTF-8.
    #[error("Invalid UTF-8")]
    InvalidUTF8,

    /// Occurs when receiving a continuation frame without a preceding initial frame.
    #[error("Invalid continuation frame")]
    InvalidContinuationFrame,

    /// Indicates that a received close frame has an invalid format, such as
    /// containing a payload of 1 byte (close frames must be either empty or ≥2 bytes).
    #[error("Invalid close frame")]
    InvalidCloseFrame,

    /// Occurs when a close frame contains a status code that is not valid according to
    /// RFC 6455 (e.g., using reserved codes or codes in invalid ranges).
    #[error("Invalid close code")]
    InvalidCloseCode,

    /// Indicates that reserved bits in the WebSocket frame header are set when they
    /// should be 0 according to the protocol specification.
    #[error("Reserved bits are not zero")]
    ReservedBitsNotZero,

    /// Occurs when a control frame (ping, pong, or close) has the FIN bit
    /// not set. RFC 6455 requires that control frames must not be fragmented.
    #[error("Control frame must not be fragmented")]
    ControlFrameFragmented,

    /// A control frame payload exceeds the 125 bytes allowed by RFC 6455.
    #[error("Control frame payload too large ({0} bytes)")]
    ControlFrameTooLarge(usize),

    /// Occurs when a frame's payload length exceeds the maximum configured size.
    #[error("Frame too large")]
    FrameTooLarge,

    /// A complete text or binary message exceeds the policy limit.
    #[error("Message too large ({size} bytes, limit {limit})")]
    MessageTooLarge { size: usize, limit: usize },

    /// Indicates receipt of a frame with an invalid opcode value.
    #[error("Invalid opcode (byte={0})")]
    InvalidOpCode(u8),

    /// The `offset`/`len` pair of a binary write does not fit in the supplied buffer.
    #[error("Invalid range: offset {offset} + len {len} exceeds buffer of {size} bytes")]
    InvalidRange {
        offset: usize,
        len: usize,
        size: usize,
    },

    /// An outbound call was made before any outgoing pipeline was configured.
    #[error("No outgoing pipeline configured")]
    OutgoingNotConfigured,

    /// [`Session::on_connect`] was called more than once.
    #[error("Session already connected")]
    AlreadyConnected,

    /// Returned when a write can no longer complete because the connection is closed.
    /// Once a connection is closed, no further communication is possible.
    #[error("Connection is closed")]
    ConnectionClosed,

    /// Wraps standard I/O errors that may occur during WebSocket communication,
    /// such as connection resets or network timeouts.
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// Occurs when serialization of JSON data fails.
    /// Only available when the `json` feature is enabled.
    #[cfg(feature = "json")]
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl WebSocketError {
    /// Returns the close code a connection should send after observing this error.
    pub fn close_code(&self) -> CloseCode {
        match self {
            Self::InvalidFragment
            | Self::InvalidContinuationFrame
            | Self::InvalidCloseFrame
            | Self::InvalidCloseCode
            | Self::ReservedBitsNotZero
            | Self::ControlFrameFragmented
            | Self::ControlFrameTooLarge(_)
            | Self::InvalidOpCode(_) => CloseCode::Protocol,
            Self::InvalidUTF8 => CloseCode::Invalid,
            Self::FrameTooLarge | Self::MessageTooLarge { .. } => CloseCode::Size,
            _ => CloseCode::Error,
        }
    }

    /// Returns `true` for errors describing a peer violating the protocol or the policy.
    pub fn is_protocol_error(&self) -> bool {
        !matches!(self.close_code(), CloseCode::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_code_mapping() {
        assert_eq!(
            WebSocketError::InvalidFragment.close_code(),
            CloseCode::Protocol
        );
        assert_eq!(
            WebSocketError::ControlFrameTooLarge(126).close_code(),
            CloseCode::Protocol
        );
        assert_eq!(WebSocketError::InvalidUTF8.close_code(), CloseCode::Invalid);
        assert_eq!(
            WebSocketError::MessageTooLarge { size: 2, limit: 1 }.close_code(),
            CloseCode::Size
        );
        assert_eq!(
            WebSocketError::ConnectionClosed.close_code(),
            CloseCode::Error
        );
    }

    #[test]
    fn test_is_protocol_error() {
        assert!(WebSocketError::InvalidOpCode(0x3).is_protocol_error());
        assert!(WebSocketError::FrameTooLarge.is_protocol_error());
        assert!(!WebSocketError::OutgoingNotConfigured.is_protocol_error());
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert!(!WebSocketError::from(io).is_protocol_error());
    }

    #[test]
    fn test_error_display() {
        let err = WebSocketError::InvalidRange {
            offset: 4,
            len: 8,
            size: 10,
        };
        assert_eq!(
            err.to_string(),
            "Invalid range: offset 4 + len 8 exceeds buffer of 10 bytes"
        );
    }
}
