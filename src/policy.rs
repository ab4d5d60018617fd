//! Session policy: the immutable limits a session is created with, and an inbound decorator
//! enforcing them.
use std::time::Duration;

use crate::{
    frame::{Frame, OpCode},
    pipeline::IncomingFrames,
    Result, WebSocketError,
};

/// The maximum payload of a control frame (CLOSE, PING, PONG), as required by RFC 6455.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// The default maximum size of a text or binary message, set to 1 MiB.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// The role the WebSocket endpoint is taking.
///
/// When a server role is taken the frames will not be masked, unlike
/// the client role, in which frames are masked.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Server => write!(f, "server"),
            Self::Client => write!(f, "client"),
        }
    }
}

/// Limits and behavior flags bounding one WebSocket session.
///
/// The policy is set when the session is created and is read-only afterwards. Enforcement
/// happens in the inbound pipeline (see [`PolicyEnforcer`]) and, for control frames, on the
/// session's outbound path.
///
/// # Example
/// ```rust
/// use std::time::Duration;
/// use wsession::WebSocketPolicy;
///
/// let policy = WebSocketPolicy::new_server_policy()
///     .with_max_text_message_size(64 * 1024)
///     .with_idle_timeout(Duration::from_secs(30))
///     .with_utf8();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSocketPolicy {
    /// Which side of the connection this session plays.
    pub role: Role,

    /// Maximum size of a text message, in bytes.
    ///
    /// Default: 1 MiB (1,048,576 bytes) as defined in [`MAX_MESSAGE_SIZE`]
    pub max_text_message_size: usize,

    /// Maximum size of a binary message, in bytes.
    ///
    /// Default: 1 MiB (1,048,576 bytes) as defined in [`MAX_MESSAGE_SIZE`]
    pub max_binary_message_size: usize,

    /// Time without traffic after which the connection may be closed. The session does not
    /// act on it; connections read it.
    ///
    /// Default: `None`
    pub idle_timeout: Option<Duration>,

    /// Flag to determine whether incoming text frames should be validated for UTF-8 encoding.
    ///
    /// Default: `false`
    pub check_utf8: bool,
}

impl Default for WebSocketPolicy {
    fn default() -> Self {
        Self::new_server_policy()
    }
}

impl WebSocketPolicy {
    /// Returns the default policy of a server endpoint.
    pub fn new_server_policy() -> Self {
        Self::new(Role::Server)
    }

    /// Returns the default policy of a client endpoint.
    pub fn new_client_policy() -> Self {
        Self::new(Role::Client)
    }

    fn new(role: Role) -> Self {
        Self {
            role,
            max_text_message_size: MAX_MESSAGE_SIZE,
            max_binary_message_size: MAX_MESSAGE_SIZE,
            idle_timeout: None,
            check_utf8: false,
        }
    }

    /// Sets the maximum allowed size of text messages.
    pub fn with_max_text_message_size(self, size: usize) -> Self {
        Self {
            max_text_message_size: size,
            ..self
        }
    }

    /// Sets the maximum allowed size of binary messages.
    pub fn with_max_binary_message_size(self, size: usize) -> Self {
        Self {
            max_binary_message_size: size,
            ..self
        }
    }

    /// Sets the idle timeout connections should apply.
    pub fn with_idle_timeout(self, timeout: Duration) -> Self {
        Self {
            idle_timeout: Some(timeout),
            ..self
        }
    }

    /// Enables UTF-8 validation for incoming text frames.
    pub fn with_utf8(self) -> Self {
        Self {
            check_utf8: true,
            ..self
        }
    }

    /// Checks that a control frame payload fits in [`MAX_CONTROL_PAYLOAD`] bytes.
    pub fn assert_valid_control_payload(&self, len: usize) -> Result<()> {
        if len > MAX_CONTROL_PAYLOAD {
            return Err(WebSocketError::ControlFrameTooLarge(len));
        }
        Ok(())
    }

    /// Checks a text message size against `max_text_message_size`.
    pub fn assert_valid_text_message_size(&self, size: usize) -> Result<()> {
        Self::check_size(size, self.max_text_message_size)
    }

    /// Checks a binary message size against `max_binary_message_size`.
    pub fn assert_valid_binary_message_size(&self, size: usize) -> Result<()> {
        Self::check_size(size, self.max_binary_message_size)
    }

    fn check_size(size: usize, limit: usize) -> Result<()> {
        if size > limit {
            return Err(WebSocketError::MessageTooLarge { size, limit });
        }
        Ok(())
    }

    /// Validates a single frame against this policy.
    ///
    /// - Control frames must be final and carry at most 125 bytes.
    /// - Text and binary frames must fit their message size limit.
    /// - Text frames must be valid UTF-8 when `check_utf8` is set.
    ///
    /// Continuation frames are only checked against the larger of both message limits, since
    /// reassembly, and therefore the message type, is known only upstream.
    pub fn assert_valid_frame(&self, frame: &Frame) -> Result<()> {
        let len = frame.payload().len();
        match frame.opcode() {
            OpCode::Close | OpCode::Ping | OpCode::Pong => {
                if !frame.fin() {
                    return Err(WebSocketError::ControlFrameFragmented);
                }
                self.assert_valid_control_payload(len)
            }
            OpCode::Text => {
                self.assert_valid_text_message_size(len)?;
                if self.check_utf8 && frame.fin() && !frame.is_utf8() {
                    return Err(WebSocketError::InvalidUTF8);
                }
                Ok(())
            }
            OpCode::Binary => self.assert_valid_binary_message_size(len),
            OpCode::Continuation => Self::check_size(
                len,
                self.max_text_message_size
                    .max(self.max_binary_message_size),
            ),
        }
    }
}

/// An [`IncomingFrames`] decorator validating frames against a [`WebSocketPolicy`].
///
/// Valid frames are forwarded unchanged. A frame violating the policy is not delivered; the
/// violation is forwarded as [`IncomingFrames::incoming_error`] instead. Errors coming from
/// upstream pass through untouched.
///
/// Placed in front of a [`Session`](crate::Session), it plays the role of the policy layer of the
/// inbound pipeline.
pub struct PolicyEnforcer<I> {
    policy: WebSocketPolicy,
    next: I,
}

impl<I: IncomingFrames> PolicyEnforcer<I> {
    pub fn new(policy: WebSocketPolicy, next: I) -> Self {
        Self { policy, next }
    }

    pub fn policy(&self) -> &WebSocketPolicy {
        &self.policy
    }

    pub fn get_ref(&self) -> &I {
        &self.next
    }
}

impl<I: IncomingFrames> IncomingFrames for PolicyEnforcer<I> {
    fn incoming_frame(&self, frame: Frame) {
        match self.policy.assert_valid_frame(&frame) {
            Ok(()) => self.next.incoming_frame(frame),
            Err(err) => {
                #[cfg(feature = "logging")]
                log::debug!("policy rejected {:?} frame: {}", frame.opcode(), err);
                self.next.incoming_error(err);
            }
        }
    }

    fn incoming_error(&self, err: WebSocketError) {
        self.next.incoming_error(err);
    }
}
