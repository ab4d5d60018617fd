//! # Close
//!
//! Status codes and reasons carried by CLOSE frames, as defined in
//! [RFC 6455 Section 7.4](https://datatracker.ietf.org/doc/html/rfc6455#section-7.4).
//!
//! [`CloseCode`] maps the numeric status codes to named variants, and [`CloseInfo`] pairs a code
//! with its optional UTF-8 reason so that close handshake steps can be reported to a
//! [`LogicalConnection`](crate::LogicalConnection).
use bytes::Bytes;

use crate::{
    frame::{Frame, OpCode},
    policy::MAX_CONTROL_PAYLOAD,
    Result, WebSocketError,
};

/// Status code used to indicate why an endpoint is closing the WebSocket connection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// 1000: the purpose for which the connection was established has been fulfilled.
    Normal,
    /// 1001: an endpoint is going away, such as a server going down.
    Away,
    /// 1002: an endpoint is terminating the connection due to a protocol error.
    Protocol,
    /// 1003: an endpoint received a type of data it cannot accept.
    Unsupported,
    /// 1005: no status code was present. Never sent on the wire.
    Status,
    /// 1006: the connection was closed abnormally. Never sent on the wire.
    Abnormal,
    /// 1007: a message contained data inconsistent with its type (e.g. non UTF-8 text).
    Invalid,
    /// 1008: a message violated the endpoint's policy.
    Policy,
    /// 1009: a message was too big to process.
    Size,
    /// 1010: the client expected the server to negotiate an extension.
    Extension,
    /// 1011: the server encountered an unexpected condition.
    Error,
    /// 1012: the service is restarting.
    Restart,
    /// 1013: the service is overloaded, try again later.
    Again,
    /// 1015: the TLS handshake failed. Never sent on the wire.
    Tls,
    /// 1016-2999: reserved for future revisions of the protocol.
    Reserved(u16),
    /// 3000-3999: registered with IANA by libraries and frameworks.
    Iana(u16),
    /// 4000-4999: private use by applications.
    Library(u16),
    /// Any code outside the ranges above.
    Bad(u16),
}

impl CloseCode {
    /// Returns `true` if this code may be sent in, or accepted from, a CLOSE frame.
    pub fn is_allowed(self) -> bool {
        !matches!(
            self,
            Self::Status | Self::Abnormal | Self::Tls | Self::Reserved(_) | Self::Bad(_)
        )
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        match code {
            1000 => Self::Normal,
            1001 => Self::Away,
            1002 => Self::Protocol,
            1003 => Self::Unsupported,
            1005 => Self::Status,
            1006 => Self::Abnormal,
            1007 => Self::Invalid,
            1008 => Self::Policy,
            1009 => Self::Size,
            1010 => Self::Extension,
            1011 => Self::Error,
            1012 => Self::Restart,
            1013 => Self::Again,
            1015 => Self::Tls,
            1016..=2999 => Self::Reserved(code),
            3000..=3999 => Self::Iana(code),
            4000..=4999 => Self::Library(code),
            _ => Self::Bad(code),
        }
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> u16 {
        match code {
            CloseCode::Normal => 1000,
            CloseCode::Away => 1001,
            CloseCode::Protocol => 1002,
            CloseCode::Unsupported => 1003,
            CloseCode::Status => 1005,
            CloseCode::Abnormal => 1006,
            CloseCode::Invalid => 1007,
            CloseCode::Policy => 1008,
            CloseCode::Size => 1009,
            CloseCode::Extension => 1010,
            CloseCode::Error => 1011,
            CloseCode::Restart => 1012,
            CloseCode::Again => 1013,
            CloseCode::Tls => 1015,
            CloseCode::Reserved(code)
            | CloseCode::Iana(code)
            | CloseCode::Library(code)
            | CloseCode::Bad(code) => code,
        }
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", u16::from(*self))
    }
}

/// Cuts `reason` on a character boundary so that a status code and the reason fit in one
/// control frame.
pub(crate) fn truncate_reason(reason: &str) -> &str {
    let max = MAX_CONTROL_PAYLOAD - 2;
    if reason.len() <= max {
        return reason;
    }
    let mut end = max;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}

/// A close handshake step: the status code and reason of one CLOSE frame.
///
/// A CLOSE frame without payload carries no status code; it is represented with
/// [`CloseCode::Status`] and an empty reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    code: CloseCode,
    reason: String,
}

impl CloseInfo {
    /// Creates a close info from a code and a reason.
    ///
    /// The reason is truncated, on a character boundary, so that code and reason
    /// fit in a single control frame.
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        let mut reason = reason.into();
        let len = truncate_reason(&reason).len();
        reason.truncate(len);

        Self { code, reason }
    }

    /// Parses the payload of a received CLOSE frame.
    ///
    /// # Errors
    /// - [`WebSocketError::InvalidCloseFrame`] if the frame is not a CLOSE frame or its payload is 1 byte long.
    /// - [`WebSocketError::InvalidCloseCode`] if the status code may not appear on the wire.
    /// - [`WebSocketError::InvalidUTF8`] if the reason is not valid UTF-8.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        if frame.opcode() != OpCode::Close {
            return Err(WebSocketError::InvalidCloseFrame);
        }

        let payload = frame.payload();
        match payload.len() {
            0 => Ok(Self {
                code: CloseCode::Status,
                reason: String::new(),
            }),
            1 => Err(WebSocketError::InvalidCloseFrame),
            _ => {
                let code = CloseCode::from(u16::from_be_bytes([payload[0], payload[1]]));
                if !code.is_allowed() {
                    return Err(WebSocketError::InvalidCloseCode);
                }
                let reason =
                    std::str::from_utf8(&payload[2..]).map_err(|_| WebSocketError::InvalidUTF8)?;
                Ok(Self {
                    code,
                    reason: reason.to_owned(),
                })
            }
        }
    }

    /// Builds the CLOSE frame announcing this code and reason.
    ///
    /// Codes that must not appear on the wire produce an empty CLOSE frame.
    pub fn to_frame(&self) -> Frame {
        if !self.code.is_allowed() {
            return Frame::new(true, OpCode::Close, Bytes::new());
        }

        Frame::close(self.code, &self.reason)
    }

    /// Returns the status code.
    pub fn code(&self) -> CloseCode {
        self.code
    }

    /// Returns the reason, possibly empty.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl Default for CloseInfo {
    fn default() -> Self {
        Self::new(CloseCode::Normal, "")
    }
}
