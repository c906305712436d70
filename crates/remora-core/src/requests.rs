//! Request / result payloads, single and batched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::RequestId;

/// A single logical call, sent under op 6 (or nested inside a batch).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    /// Name of the operation the server should perform.
    pub request_type: String,
    /// Correlation ID echoed back in the matching result.
    pub request_id: RequestId,
    /// Operation parameters, opaque to the protocol layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_data: Option<Value>,
}

impl CallRequest {
    /// Construct a request with a fresh correlation ID.
    #[must_use]
    pub fn new(request_type: impl Into<String>, request_data: Option<Value>) -> Self {
        Self {
            request_type: request_type.into(),
            request_id: RequestId::new(),
            request_data,
        }
    }
}

/// Outcome status inside a [`CallResult`].
///
/// `result == false` is a protocol-level application failure, distinct
/// from any transport failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStatus {
    /// Whether the server executed the request successfully.
    pub result: bool,
    /// Numeric status code defined by the server.
    pub code: u16,
    /// Optional human-readable failure explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl RequestStatus {
    /// A successful status (code 100).
    #[must_use]
    pub fn ok() -> Self {
        Self {
            result: true,
            code: 100,
            comment: None,
        }
    }
}

/// The server's answer to a single call, received under op 7.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResult {
    /// Echo of the request's operation name, if the server provides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_type: Option<String>,
    /// Correlation ID matching the originating request.
    pub request_id: RequestId,
    /// Execution status.
    pub request_status: RequestStatus,
    /// Operation output, opaque to the protocol layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_data: Option<Value>,
}

impl CallResult {
    /// Whether the server reported success.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.request_status.result
    }
}

/// An ordered sequence of calls sharing one correlation ID, sent under op 8.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    /// Correlation ID shared by the whole batch.
    pub request_id: RequestId,
    /// Whether the server stops processing on the first failed request.
    pub halt_on_failure: bool,
    /// Requests in submission order.
    pub requests: Vec<CallRequest>,
}

/// The ordered results of a batch, received under op 9.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    /// Correlation ID matching the originating batch.
    pub request_id: RequestId,
    /// Results in the order the requests were submitted.
    pub results: Vec<CallResult>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
