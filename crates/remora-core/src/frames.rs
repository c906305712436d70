//! The wire envelope and the closed opcode space.
//!
//! Every frame on the socket is a JSON object `{"op": <int>, "d": <object>}`.
//! Inbound text is decoded once into the opcode plus the raw payload bytes,
//! then the payload is decoded exactly once into the opcode-specific type;
//! there is no generic `Value` payload passed around after routing.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::errors::FrameError;
use crate::events::EventEnvelope;
use crate::handshake::{HelloInfo, IdentifiedInfo, IdentifyInfo, ReidentifyInfo};
use crate::requests::{BatchRequest, BatchResult, CallRequest, CallResult};

/// Integer discriminator selecting how a frame's payload is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Server greeting, first frame on the wire.
    Hello = 0,
    /// Client identification (and optional authentication).
    Identify = 1,
    /// Server handshake acknowledgement.
    Identified = 2,
    /// Client subscription re-negotiation.
    Reidentify = 3,
    /// Server-pushed event.
    Event = 5,
    /// Client request.
    Request = 6,
    /// Server response to a request.
    RequestResponse = 7,
    /// Client request batch.
    RequestBatch = 8,
    /// Server response to a request batch.
    RequestBatchResponse = 9,
}

impl OpCode {
    /// Map a raw opcode to its variant.
    #[must_use]
    pub fn from_u8(op: u8) -> Option<Self> {
        match op {
            0 => Some(Self::Hello),
            1 => Some(Self::Identify),
            2 => Some(Self::Identified),
            3 => Some(Self::Reidentify),
            5 => Some(Self::Event),
            6 => Some(Self::Request),
            7 => Some(Self::RequestResponse),
            8 => Some(Self::RequestBatch),
            9 => Some(Self::RequestBatchResponse),
            _ => None,
        }
    }
}

/// Raw envelope: opcode plus undecoded payload bytes.
#[derive(Deserialize)]
struct RawEnvelope {
    op: u8,
    #[serde(default)]
    d: Option<Box<RawValue>>,
}

/// Outbound envelope, serialized fresh per send.
#[derive(Serialize)]
struct Envelope<'a, T> {
    op: u8,
    d: &'a T,
}

/// Every frame the server can send, decoded.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerFrame {
    /// op 0: greeting with optional auth challenge.
    Hello(HelloInfo),
    /// op 2: handshake complete.
    Identified(IdentifiedInfo),
    /// op 5: unsolicited event.
    Event(EventEnvelope),
    /// op 7: answer to a single request.
    RequestResponse(CallResult),
    /// op 9: answer to a request batch.
    RequestBatchResponse(BatchResult),
    /// Any opcode this client does not interpret (including client-to-server
    /// opcodes echoed back). Routing treats these as non-fatal anomalies.
    Unknown {
        /// The unrecognized opcode.
        op: u8,
    },
}

impl ServerFrame {
    /// The opcode this frame arrived under.
    #[must_use]
    pub fn op(&self) -> u8 {
        match self {
            Self::Hello(_) => OpCode::Hello as u8,
            Self::Identified(_) => OpCode::Identified as u8,
            Self::Event(_) => OpCode::Event as u8,
            Self::RequestResponse(_) => OpCode::RequestResponse as u8,
            Self::RequestBatchResponse(_) => OpCode::RequestBatchResponse as u8,
            Self::Unknown { op } => *op,
        }
    }

    /// Decode one text frame.
    ///
    /// The envelope is parsed once; the payload is then parsed once into the
    /// concrete type for the opcode. An unrecognized opcode is not an error.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let raw: RawEnvelope =
            serde_json::from_str(text).map_err(|source| FrameError::Envelope { source })?;
        let payload = raw.d.as_ref().map_or("{}", |d| d.get());

        match OpCode::from_u8(raw.op) {
            Some(OpCode::Hello) => Ok(Self::Hello(
                serde_json::from_str(payload)
                    .map_err(|source| FrameError::Payload { op: raw.op, source })?,
            )),
            Some(OpCode::Identified) => Ok(Self::Identified(
                serde_json::from_str(payload)
                    .map_err(|source| FrameError::Payload { op: raw.op, source })?,
            )),
            Some(OpCode::Event) => Ok(Self::Event(
                serde_json::from_str(payload)
                    .map_err(|source| FrameError::Payload { op: raw.op, source })?,
            )),
            Some(OpCode::RequestResponse) => Ok(Self::RequestResponse(
                serde_json::from_str(payload)
                    .map_err(|source| FrameError::Payload { op: raw.op, source })?,
            )),
            Some(OpCode::RequestBatchResponse) => Ok(Self::RequestBatchResponse(
                serde_json::from_str(payload)
                    .map_err(|source| FrameError::Payload { op: raw.op, source })?,
            )),
            _ => Ok(Self::Unknown { op: raw.op }),
        }
    }
}

/// Every frame this client can send.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientFrame {
    /// op 1: identification.
    Identify(IdentifyInfo),
    /// op 3: subscription re-negotiation.
    Reidentify(ReidentifyInfo),
    /// op 6: single request.
    Request(CallRequest),
    /// op 8: request batch.
    RequestBatch(BatchRequest),
}

impl ClientFrame {
    /// The opcode this frame is sent under.
    #[must_use]
    pub fn opcode(&self) -> OpCode {
        match self {
            Self::Identify(_) => OpCode::Identify,
            Self::Reidentify(_) => OpCode::Reidentify,
            Self::Request(_) => OpCode::Request,
            Self::RequestBatch(_) => OpCode::RequestBatch,
        }
    }

    /// Serialize into the `{"op", "d"}` wire text.
    pub fn encode(&self) -> Result<String, FrameError> {
        let op = self.opcode() as u8;
        let encoded = match self {
            Self::Identify(d) => serde_json::to_string(&Envelope { op, d }),
            Self::Reidentify(d) => serde_json::to_string(&Envelope { op, d }),
            Self::Request(d) => serde_json::to_string(&Envelope { op, d }),
            Self::RequestBatch(d) => serde_json::to_string(&Envelope { op, d }),
        };
        encoded.map_err(|source| FrameError::Encode { source })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriptions::EventSubscriptions;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn opcode_roundtrip() {
        for op in [0u8, 1, 2, 3, 5, 6, 7, 8, 9] {
            let code = OpCode::from_u8(op).unwrap();
            assert_eq!(code as u8, op);
        }
        assert_eq!(OpCode::from_u8(4), None);
        assert_eq!(OpCode::from_u8(42), None);
    }

    #[test]
    fn decode_hello_with_challenge() {
        let frame = ServerFrame::decode(
            r#"{"op":0,"d":{"authentication":{"challenge":"Y2g=","salt":"c2E="}}}"#,
        )
        .unwrap();
        assert_matches!(frame, ServerFrame::Hello(hello) => {
            assert!(hello.requires_auth());
        });
    }

    #[test]
    fn decode_identified() {
        let frame =
            ServerFrame::decode(r#"{"op":2,"d":{"negotiatedRpcVersion":1}}"#).unwrap();
        assert_matches!(frame, ServerFrame::Identified(info) => {
            assert_eq!(info.negotiated_rpc_version, 1);
        });
    }

    #[test]
    fn decode_event() {
        let frame = ServerFrame::decode(
            r#"{"op":5,"d":{"eventType":"StreamStarted","eventData":{"live":true}}}"#,
        )
        .unwrap();
        assert_matches!(frame, ServerFrame::Event(event) => {
            assert_eq!(event.event_type, "StreamStarted");
        });
    }

    #[test]
    fn decode_request_response() {
        let frame = ServerFrame::decode(
            r#"{"op":7,"d":{"requestId":"r1","requestStatus":{"result":true,"code":100}}}"#,
        )
        .unwrap();
        assert_matches!(frame, ServerFrame::RequestResponse(result) => {
            assert!(result.is_ok());
        });
    }

    #[test]
    fn decode_batch_response() {
        let frame = ServerFrame::decode(
            r#"{"op":9,"d":{"requestId":"b1","results":[]}}"#,
        )
        .unwrap();
        assert_matches!(frame, ServerFrame::RequestBatchResponse(batch) => {
            assert!(batch.results.is_empty());
        });
    }

    #[test]
    fn decode_unknown_opcode_is_not_an_error() {
        let frame = ServerFrame::decode(r#"{"op":42,"d":{}}"#).unwrap();
        assert_matches!(frame, ServerFrame::Unknown { op: 42 });
    }

    #[test]
    fn decode_unknown_opcode_without_payload() {
        let frame = ServerFrame::decode(r#"{"op":42}"#).unwrap();
        assert_matches!(frame, ServerFrame::Unknown { op: 42 });
    }

    #[test]
    fn decode_malformed_envelope() {
        let err = ServerFrame::decode("not json at all").unwrap_err();
        assert_matches!(err, FrameError::Envelope { .. });
    }

    #[test]
    fn decode_payload_mismatch() {
        // op 2 payload must carry negotiatedRpcVersion
        let err = ServerFrame::decode(r#"{"op":2,"d":{"wrong":true}}"#).unwrap_err();
        assert_matches!(err, FrameError::Payload { op: 2, .. });
    }

    #[test]
    fn encode_identify() {
        let frame = ClientFrame::Identify(IdentifyInfo {
            rpc_version: 1,
            authentication: None,
            event_subscriptions: EventSubscriptions::ALL,
        });
        let text = frame.encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["op"], 1);
        assert_eq!(value["d"]["rpcVersion"], 1);
        assert!(value["d"].get("authentication").is_none());
    }

    #[test]
    fn encode_request() {
        let frame = ClientFrame::Request(CallRequest {
            request_type: "GetVersion".into(),
            request_id: "r1".into(),
            request_data: Some(json!({"k": "v"})),
        });
        let text = frame.encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["op"], 6);
        assert_eq!(value["d"]["requestId"], "r1");
        assert_eq!(value["d"]["requestData"]["k"], "v");
    }

    #[test]
    fn encode_batch() {
        let frame = ClientFrame::RequestBatch(BatchRequest {
            request_id: "b1".into(),
            halt_on_failure: true,
            requests: vec![CallRequest::new("A", None)],
        });
        let text = frame.encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["op"], 8);
        assert_eq!(value["d"]["haltOnFailure"], true);
    }

    #[test]
    fn opcode_per_variant() {
        let identify = ClientFrame::Identify(IdentifyInfo {
            rpc_version: 1,
            authentication: None,
            event_subscriptions: EventSubscriptions::NONE,
        });
        assert_eq!(identify.opcode(), OpCode::Identify);

        let reidentify = ClientFrame::Reidentify(ReidentifyInfo {
            event_subscriptions: EventSubscriptions::NONE,
        });
        assert_eq!(reidentify.opcode(), OpCode::Reidentify);
    }
}
