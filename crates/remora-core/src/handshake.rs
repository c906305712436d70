//! Handshake payloads: Hello, Identify, Identified, Reidentify.

use serde::{Deserialize, Serialize};

use crate::subscriptions::EventSubscriptions;

/// Authentication challenge issued by the server inside Hello.
///
/// Both fields are base64-encoded byte strings. The derived auth response
/// is computed over the base64 text itself, not the decoded bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthChallenge {
    /// Server-generated challenge, base64-encoded.
    pub challenge: String,
    /// Server-generated salt, base64-encoded.
    pub salt: String,
}

/// Server identity, received once per connection before authentication.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloInfo {
    /// Server software version, if advertised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
    /// Highest RPC version the server supports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_version: Option<u32>,
    /// Present when the server requires authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AuthChallenge>,
}

impl HelloInfo {
    /// Whether this Hello demands an authenticated Identify.
    #[must_use]
    pub fn requires_auth(&self) -> bool {
        self.authentication.is_some()
    }
}

/// Client identification, sent once per connection in response to Hello.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyInfo {
    /// RPC version the client requests.
    pub rpc_version: u32,
    /// Computed auth response, present only when Hello carried a challenge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
    /// Bitmask of event categories the client wants pushed.
    pub event_subscriptions: EventSubscriptions,
}

/// Server acknowledgement completing the handshake.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifiedInfo {
    /// RPC version both sides will speak.
    pub negotiated_rpc_version: u32,
}

/// Re-negotiation of event subscriptions on an identified session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReidentifyInfo {
    /// Replacement event-subscription bitmask.
    pub event_subscriptions: EventSubscriptions,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
