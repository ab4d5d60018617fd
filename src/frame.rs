//! # Frame
//!
//! The `frame` module implements the WebSocket frame value exchanged between the session, the
//! outgoing pipeline and the application handler, following
//! [RFC 6455 Section 5.2](https://datatracker.ietf.org/doc/html/rfc6455#section-5.2).
//!
//! A [`Frame`] carries the protocol-level metadata the session layer cares about (opcode and
//! FIN flag) along with its payload. Wire concerns such as masking, reserved bits and header
//! serialization belong to the codec below the pipeline and are not represented here.
//!
//! Frames come in two categories:
//!
//! - **Data Frames**: Carry application payload with:
//!   - `OpCode::Text`: UTF-8 text data
//!   - `OpCode::Binary`: Raw binary data
//!   - `OpCode::Continuation`: Continuation of a fragmented message
//! - **Control Frames**: Manage the connection with:
//!   - `OpCode::Close`: Initiates connection closure with optional status code and reason
//!   - `OpCode::Ping`: Checks connection liveness, requires a Pong response
//!   - `OpCode::Pong`: Responds to Ping frames
//!
//! ## Frame Construction
//!
//! Frames are immutable once built. The factory helpers produce complete (FIN set) frames:
//!
//! ```rust
//! use wsession::frame::{Frame, OpCode};
//! use wsession::close::CloseCode;
//!
//! let text = Frame::text("Hello, WebSocket!");
//! let binary = Frame::binary_range(&[0xCA, 0xFE, 0xBA, 0xBE], 1, 2).unwrap();
//! let ping = Frame::ping("Ping payload").unwrap();
//! let close = Frame::close(CloseCode::Normal, "Normal closure");
//!
//! assert!(text.fin());
//! assert_eq!(binary.payload().as_ref(), &[0xFE, 0xBA]);
//! assert_eq!(ping.opcode(), OpCode::Ping);
//! assert!(close.opcode().is_control());
//! ```
use bytes::Bytes;

use crate::{
    close::{truncate_reason, CloseCode},
    policy::MAX_CONTROL_PAYLOAD,
    Result, WebSocketError,
};

/// WebSocket operation code (OpCode) that determines the semantic meaning and handling of a frame.
///
/// Each variant represents a distinct frame type in the WebSocket protocol:
///
/// # Data Frame OpCodes
/// - `Continuation`: Continues a fragmented message started by another data frame
/// - `Text`: Contains UTF-8 encoded text data
/// - `Binary`: Contains raw binary data
///
/// # Control Frame OpCodes
/// - `Close`: Initiates or confirms connection closure
/// - `Ping`: Tests connection liveness, requiring a `Pong` response
/// - `Pong`: Responds to a `Ping` frame
///
/// The numeric values for each OpCode are defined in [RFC 6455, Section 11.8](https://datatracker.ietf.org/doc/html/rfc6455#section-11.8).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    /// Returns `true` if the `OpCode` represents a control frame (`Close`, `Ping`, or `Pong`).
    ///
    /// Control frames are used to manage the connection state and have special constraints:
    /// - Cannot be fragmented (the FIN bit must be set)
    /// - Payload must not exceed 125 bytes
    pub fn is_control(&self) -> bool {
        matches!(*self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }

    /// Returns `true` for `Text`, `Binary` and `Continuation`.
    pub fn is_data(&self) -> bool {
        !self.is_control()
    }
}

impl TryFrom<u8> for OpCode {
    type Error = WebSocketError;

    /// Attempts to convert a byte value into an `OpCode`.
    ///
    /// Invalid opcodes (0x3-0x7 and 0xB-0xF) will result in a `WebSocketError::InvalidOpCode` error.
    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            _ => Err(WebSocketError::InvalidOpCode(value)),
        }
    }
}

impl From<OpCode> for u8 {
    fn from(val: OpCode) -> Self {
        match val {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }
}

/// One WebSocket frame: opcode, FIN flag and payload.
///
/// `Frame` is immutable after construction. The payload is stored as [`Bytes`], so cloning a
/// frame, or handing it through several pipeline stages, never copies the payload.
///
/// # Creating Frames
///
/// Prefer the factory helpers, which all produce a final (FIN set) frame:
/// ```rust
/// use wsession::frame::Frame;
/// use wsession::close::CloseCode;
///
/// let text_frame = Frame::text("Hello");
/// let binary_frame = Frame::binary(vec![1, 2, 3]);
/// let ping_frame = Frame::ping(vec![]).unwrap();
/// let close_frame = Frame::close(CloseCode::Normal, "Goodbye");
/// ```
///
/// [`Frame::new`] is available for fragments, where FIN must be chosen explicitly, and for
/// frames decoded off the wire. It performs no validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    fin: bool,
    opcode: OpCode,
    payload: Bytes,
}

impl Frame {
    /// Creates a new WebSocket `Frame`.
    ///
    /// # Parameters
    /// - `fin`: Indicates if this frame is the final fragment in a message.
    /// - `opcode`: The operation code of the frame, defining its type (e.g., Text, Binary, Close).
    /// - `payload`: The frame payload data.
    pub fn new(fin: bool, opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin,
            opcode,
            payload: payload.into(),
        }
    }

    /// Creates a final text frame with the given payload.
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Text, payload)
    }

    /// Creates a final binary frame with the given payload.
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Binary, payload)
    }

    /// Creates a final binary frame from `len` bytes of `buf` starting at `offset`.
    ///
    /// The selected bytes are copied into the frame.
    ///
    /// # Errors
    /// Returns [`WebSocketError::InvalidRange`] if the range does not fit in `buf`.
    pub fn binary_range(buf: &[u8], offset: usize, len: usize) -> Result<Self> {
        let range = offset
            .checked_add(len)
            .filter(|end| *end <= buf.len())
            .map(|end| offset..end)
            .ok_or(WebSocketError::InvalidRange {
                offset,
                len,
                size: buf.len(),
            })?;

        Ok(Self::binary(Bytes::copy_from_slice(&buf[range])))
    }

    /// Creates a continuation frame, the FIN flag marking the last fragment.
    pub fn continuation(fin: bool, payload: impl Into<Bytes>) -> Self {
        Self::new(fin, OpCode::Continuation, payload)
    }

    /// Creates a ping frame. Used to check connection liveness.
    ///
    /// # Errors
    /// Returns [`WebSocketError::ControlFrameTooLarge`] if `payload` exceeds
    /// [`MAX_CONTROL_PAYLOAD`] bytes.
    pub fn ping(payload: impl Into<Bytes>) -> Result<Self> {
        Self::control(OpCode::Ping, payload.into())
    }

    /// Creates a pong frame. Used to respond to ping messages.
    ///
    /// # Errors
    /// Returns [`WebSocketError::ControlFrameTooLarge`] if `payload` exceeds
    /// [`MAX_CONTROL_PAYLOAD`] bytes.
    pub fn pong(payload: impl Into<Bytes>) -> Result<Self> {
        Self::control(OpCode::Pong, payload.into())
    }

    /// Creates a close frame with a close code and reason.
    ///
    /// The reason is truncated on a character boundary so the payload fits in
    /// [`MAX_CONTROL_PAYLOAD`] bytes.
    pub fn close(code: CloseCode, reason: &str) -> Self {
        let reason = truncate_reason(reason).as_bytes();
        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&u16::from(code).to_be_bytes());
        payload.extend_from_slice(reason);

        Self::new(true, OpCode::Close, payload)
    }

    /// Creates a close frame with a raw payload.
    ///
    /// This method does not validate if `payload` is a valid close frame payload, only its size.
    ///
    /// # Errors
    /// Returns [`WebSocketError::ControlFrameTooLarge`] if `payload` exceeds
    /// [`MAX_CONTROL_PAYLOAD`] bytes.
    pub fn close_raw<T: AsRef<[u8]>>(payload: T) -> Result<Self> {
        Self::control(OpCode::Close, Bytes::copy_from_slice(payload.as_ref()))
    }

    fn control(opcode: OpCode, payload: Bytes) -> Result<Self> {
        if payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(WebSocketError::ControlFrameTooLarge(payload.len()));
        }
        Ok(Self::new(true, opcode, payload))
    }

    /// Indicates if this is the final frame in a message.
    #[inline]
    pub fn fin(&self) -> bool {
        self.fin
    }

    /// The opcode of the frame, defining its type.
    #[inline]
    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    /// The payload of the frame.
    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consumes the frame, returning its payload.
    #[inline]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Returns `true` if the frame is a control frame.
    #[inline]
    pub fn is_control(&self) -> bool {
        self.opcode.is_control()
    }

    /// Checks if the frame payload is valid UTF-8.
    #[inline]
    pub fn is_utf8(&self) -> bool {
        std::str::from_utf8(&self.payload).is_ok()
    }

    /// Returns the payload as a string slice.
    ///
    /// # Errors
    /// Returns [`WebSocketError::InvalidUTF8`] if the payload is not valid UTF-8.
    pub fn to_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.payload).map_err(|_| WebSocketError::InvalidUTF8)
    }
}

/// Converts a `Frame` into a tuple of `(OpCode, Bytes)`.
impl From<Frame> for (OpCode, Bytes) {
    fn from(val: Frame) -> Self {
        (val.opcode, val.payload)
    }
}

/// Converts a tuple of `(OpCode, Bytes)` into a final `Frame`.
impl From<(OpCode, Bytes)> for Frame {
    fn from((opcode, payload): (OpCode, Bytes)) -> Self {
        Self::new(true, opcode, payload)
    }
}
