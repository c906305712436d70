//! # remora-core
//!
//! Wire vocabulary for the remora control protocol.
//!
//! This crate defines the types that cross the WebSocket boundary and the
//! shared building blocks the client crate is assembled from:
//!
//! - **Frames**: the `{"op": <int>, "d": <object>}` envelope, decoded once
//!   into the closed [`ServerFrame`] / [`ClientFrame`] variants
//! - **Handshake payloads**: `HelloInfo`, `IdentifyInfo`, `IdentifiedInfo`
//! - **Requests**: `CallRequest` / `CallResult` and their batch forms
//! - **Events**: the unsolicited `EventEnvelope`
//! - **Subscriptions**: the `EventSubscriptions` bitmask
//! - **Close codes**: the protocol's 4000-range close reason vocabulary
//! - **IDs**: `RequestId` newtype (UUID v7, time-ordered)

#![deny(unsafe_code)]

pub mod close_codes;
pub mod errors;
pub mod events;
pub mod frames;
pub mod handshake;
pub mod ids;
pub mod logging;
pub mod requests;
pub mod subscriptions;

pub use close_codes::CloseCode;
pub use errors::FrameError;
pub use events::EventEnvelope;
pub use frames::{ClientFrame, OpCode, ServerFrame};
pub use handshake::{AuthChallenge, HelloInfo, IdentifiedInfo, IdentifyInfo, ReidentifyInfo};
pub use ids::RequestId;
pub use requests::{BatchRequest, BatchResult, CallRequest, CallResult, RequestStatus};
pub use subscriptions::EventSubscriptions;
