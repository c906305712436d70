//! Client error taxonomy.
//!
//! Two families: [`HandshakeError`] covers everything that can go wrong
//! before a session reaches `Identified`; [`ClientError`] covers per-call
//! failures on a live session. Neither is ever fatal to the process.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

use remora_core::{CloseCode, FrameError};

use crate::auth::AuthError;

/// Failure to establish an identified session.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The transport could not be opened.
    #[error("transport connect failed: {0}")]
    Connect(#[from] tungstenite::Error),

    /// Transport open + handshake exceeded the connect timeout.
    #[error("connect timed out after {timeout_ms}ms")]
    ConnectTimeout {
        /// The configured timeout.
        timeout_ms: u64,
    },

    /// The server demands authentication but no password was configured.
    #[error("server requires authentication but no password was supplied")]
    AuthenticationRequired,

    /// The server's challenge was malformed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A handshake frame failed to decode. Fatal before `Identified`.
    #[error(transparent)]
    Malformed(#[from] FrameError),

    /// The server sent something other than the expected handshake frame.
    #[error("unexpected frame during handshake: op {op}")]
    UnexpectedFrame {
        /// The offending opcode.
        op: u8,
    },

    /// The server closed the connection during the handshake.
    #[error("server rejected the connection: {}", reason_text(.code, .reason))]
    Rejected {
        /// Protocol close code, when the raw code mapped to one.
        code: Option<CloseCode>,
        /// Close reason text from the server.
        reason: String,
    },

    /// The transport ended without a Close frame during the handshake.
    #[error("transport closed during handshake")]
    TransportClosed,
}

fn reason_text(code: &Option<CloseCode>, reason: &str) -> String {
    match code {
        Some(code) if reason.is_empty() => code.to_string(),
        Some(code) => format!("{code}: {reason}"),
        None if reason.is_empty() => "no reason given".to_owned(),
        None => reason.to_owned(),
    }
}

/// Failure of a single call on a live session.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The per-call deadline elapsed before a matching result arrived.
    /// The session stays open; only this call is affected.
    #[error("call {request_type} timed out after {timeout_ms}ms")]
    Timeout {
        /// Operation name of the timed-out call.
        request_type: String,
        /// The deadline that elapsed.
        timeout_ms: u64,
    },

    /// The session was torn down while the call was pending, or the call
    /// was issued after teardown.
    #[error("session closed before the call resolved")]
    SessionClosed,

    /// The session has not completed its handshake yet.
    #[error("session is not identified")]
    NotIdentified,

    /// The server executed the request and reported failure
    /// (`requestStatus.result == false`). Delivered only to this caller.
    #[error("request failed with code {code}{}", comment_text(.comment))]
    Request {
        /// Server-defined status code.
        code: u16,
        /// Optional server explanation.
        comment: Option<String>,
    },

    /// The outbound queue is full. Backpressure: fail fast rather than
    /// deadlock the caller against a stalled write path.
    #[error("outbound queue is full")]
    Backpressure,

    /// The outbound frame failed to serialize.
    #[error(transparent)]
    Encode(#[from] FrameError),
}

fn comment_text(comment: &Option<String>) -> String {
    comment
        .as_deref()
        .map(|c| format!(": {c}"))
        .unwrap_or_default()
}

impl ClientError {
    /// Synthesize the typed error for an `ok=false` result status.
    #[must_use]
    pub fn from_status(status: &remora_core::RequestStatus) -> Self {
        Self::Request {
            code: status.code,
            comment: status.comment.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
