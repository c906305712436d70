//! Server-pushed event payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An unsolicited event, received under op 5.
///
/// Events carry no correlation ID and may arrive at any point after the
/// session is identified.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Name of the event.
    pub event_type: String,
    /// Category bit of the subscription mask this event was delivered under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_intent: Option<u32>,
    /// Event payload, opaque to the protocol layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_data: Option<Value>,
}
