//! Challenge/response authentication.
//!
//! The server never sees the password. It issues a base64 `challenge` and
//! `salt` in Hello; the client derives a one-time auth string:
//!
//! 1. `secret = base64(sha256(password || salt))`
//! 2. `auth   = base64(sha256(secret || challenge))`
//!
//! Concatenation is over the base64 *text* of salt/challenge, not the
//! decoded bytes. This matches the published scheme bit-for-bit.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// A malformed authentication challenge.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Challenge or salt was empty.
    #[error("authentication {field} must not be empty")]
    Empty {
        /// Which field was empty.
        field: &'static str,
    },

    /// Challenge or salt was not valid base64.
    #[error("authentication {field} is not valid base64: {source}")]
    NotBase64 {
        /// Which field failed to decode.
        field: &'static str,
        /// Underlying decode error.
        #[source]
        source: base64::DecodeError,
    },
}

/// Compute the auth response string for an Identify frame.
///
/// Pure and deterministic: identical inputs always yield identical output.
/// No shared state, no I/O, safe to call from any thread.
pub fn compute_auth_response(
    password: &str,
    challenge: &str,
    salt: &str,
) -> Result<String, AuthError> {
    validate_base64("challenge", challenge)?;
    validate_base64("salt", salt)?;

    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    let secret = STANDARD.encode(hasher.finalize());

    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(challenge.as_bytes());
    Ok(STANDARD.encode(hasher.finalize()))
}

fn validate_base64(field: &'static str, value: &str) -> Result<(), AuthError> {
    if value.is_empty() {
        return Err(AuthError::Empty { field });
    }
    let _ = STANDARD
        .decode(value)
        .map_err(|source| AuthError::NotBase64 { field, source })?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
