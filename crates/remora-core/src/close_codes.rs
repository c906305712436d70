//! Transport close-reason vocabulary.

use std::fmt;

/// Numeric close reasons the server attaches to a WebSocket Close frame.
///
/// These live in the 4000 range, above the standard WebSocket close codes.
/// They describe why the server terminated the session and are surfaced to
/// the caller inside typed connection errors; the client never retries on
/// its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum CloseCode {
    /// Unspecified server-side reason.
    UnknownReason = 4000,
    /// An inbound frame could not be decoded.
    MessageDecodeError = 4002,
    /// A required payload field was missing.
    MissingDataField = 4003,
    /// A payload field had the wrong type.
    InvalidDataFieldType = 4004,
    /// A payload field had an invalid value.
    InvalidDataFieldValue = 4005,
    /// The frame's opcode was not recognized.
    UnknownOpCode = 4006,
    /// A frame arrived before the session was identified.
    NotIdentified = 4007,
    /// A second Identify arrived on an identified session.
    AlreadyIdentified = 4008,
    /// The Identify auth response was missing or wrong.
    AuthenticationFailed = 4009,
    /// The requested RPC version is not supported.
    UnsupportedRpcVersion = 4010,
    /// The server invalidated the session.
    SessionInvalidated = 4011,
    /// The client used a feature the server does not support.
    UnsupportedFeature = 4012,
}

impl CloseCode {
    /// Map a raw close code to its variant, if it is one of ours.
    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            4000 => Some(Self::UnknownReason),
            4002 => Some(Self::MessageDecodeError),
            4003 => Some(Self::MissingDataField),
            4004 => Some(Self::InvalidDataFieldType),
            4005 => Some(Self::InvalidDataFieldValue),
            4006 => Some(Self::UnknownOpCode),
            4007 => Some(Self::NotIdentified),
            4008 => Some(Self::AlreadyIdentified),
            4009 => Some(Self::AuthenticationFailed),
            4010 => Some(Self::UnsupportedRpcVersion),
            4011 => Some(Self::SessionInvalidated),
            4012 => Some(Self::UnsupportedFeature),
            _ => None,
        }
    }

    /// The raw numeric code.
    #[must_use]
    pub fn as_code(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UnknownReason => "unknown reason",
            Self::MessageDecodeError => "message decode error",
            Self::MissingDataField => "missing data field",
            Self::InvalidDataFieldType => "invalid data field type",
            Self::InvalidDataFieldValue => "invalid data field value",
            Self::UnknownOpCode => "unknown opcode",
            Self::NotIdentified => "not identified",
            Self::AlreadyIdentified => "already identified",
            Self::AuthenticationFailed => "authentication failed",
            Self::UnsupportedRpcVersion => "unsupported rpc version",
            Self::SessionInvalidated => "session invalidated",
            Self::UnsupportedFeature => "unsupported feature",
        };
        write!(f, "{name} ({})", self.as_code())
    }
}
