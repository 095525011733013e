//! WebSocket message types and connection state.

use bytes::Bytes;

/// A data message exchanged over a WebSocket connection.
///
/// Control frames (ping, pong, close) are handled by the connection and never
/// surface here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebSocketMessage {
    /// A UTF-8 text frame.
    Text(String),
    /// A binary frame.
    Binary(Bytes),
}

impl WebSocketMessage {
    /// The text payload, if this is a text message.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    /// The payload as raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(data) => data,
        }
    }
}

impl From<String> for WebSocketMessage {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for WebSocketMessage {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Bytes> for WebSocketMessage {
    fn from(data: Bytes) -> Self {
        Self::Binary(data)
    }
}

/// Lifecycle of a WebSocket connection.
///
/// `Closed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not opened yet.
    #[default]
    Unopened,
    /// Handshake completed; messages can flow.
    Open,
    /// Closed by either side.
    Closed,
}

/// Standard WebSocket close codes as defined in RFC 6455.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CloseCode {
    /// Normal closure; the connection successfully completed.
    #[default]
    Normal,
    /// Endpoint is going away (e.g., server shutting down).
    Away,
    /// Protocol error occurred.
    Protocol,
    /// Received data type that cannot be accepted.
    Unsupported,
    /// No status code was provided.
    NoStatus,
    /// Connection was closed abnormally (no close frame received).
    Abnormal,
    /// Received data that was not consistent with the message type.
    Invalid,
    /// Policy violation.
    Policy,
    /// Message too big to process.
    TooBig,
    /// Unexpected condition prevented the request from being fulfilled.
    Error,
    /// Application-specific close code, in range 4000-4999.
    Custom(u16),
}

impl CloseCode {
    /// Convert to the numeric close code.
    pub fn as_u16(&self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::Away => 1001,
            Self::Protocol => 1002,
            Self::Unsupported => 1003,
            Self::NoStatus => 1005,
            Self::Abnormal => 1006,
            Self::Invalid => 1007,
            Self::Policy => 1008,
            Self::TooBig => 1009,
            Self::Error => 1011,
            Self::Custom(code) => *code,
        }
    }

    /// Create from a numeric close code.
    pub fn from_u16(code: u16) -> Self {
        match code {
            1000 => Self::Normal,
            1001 => Self::Away,
            1002 => Self::Protocol,
            1003 => Self::Unsupported,
            1005 => Self::NoStatus,
            1006 => Self::Abnormal,
            1007 => Self::Invalid,
            1008 => Self::Policy,
            1009 => Self::TooBig,
            1011 => Self::Error,
            code => Self::Custom(code),
        }
    }
}

/// Reason for closing a WebSocket connection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CloseReason {
    /// The close status code.
    pub code: CloseCode,
    /// Optional human-readable reason string.
    pub reason: Option<String>,
}

impl CloseReason {
    /// Create a close reason with just a code.
    pub fn new(code: CloseCode) -> Self {
        Self { code, reason: None }
    }

    /// Create a close reason with a code and message.
    pub fn with_reason(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: Some(reason.into()),
        }
    }

    /// Create a normal close reason.
    pub fn normal() -> Self {
        Self::new(CloseCode::Normal)
    }
}
