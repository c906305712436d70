//! Wire-level error types.

use thiserror::Error;

/// Failure to encode or decode a protocol frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The frame text was not a valid `{"op": <int>, "d": <object>}` envelope.
    #[error("malformed frame envelope: {source}")]
    Envelope {
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The envelope decoded but its payload did not match the opcode's shape.
    #[error("undecodable payload for op {op}: {source}")]
    Payload {
        /// Opcode the payload was decoded for.
        op: u8,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// An outbound frame failed to serialize.
    #[error("frame encode failed: {source}")]
    Encode {
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json_err() -> serde_json::Error {
        serde_json::from_str::<serde_json::Value>("{not json").unwrap_err()
    }

    #[test]
    fn envelope_display_mentions_envelope() {
        let err = FrameError::Envelope { source: json_err() };
        assert!(err.to_string().contains("malformed frame envelope"));
    }

    #[test]
    fn payload_display_carries_op() {
        let err = FrameError::Payload {
            op: 7,
            source: json_err(),
        };
        assert!(err.to_string().contains("op 7"));
    }

    #[test]
    fn frame_error_is_std_error() {
        let err = FrameError::Encode { source: json_err() };
        let _: &dyn std::error::Error = &err;
    }
}
