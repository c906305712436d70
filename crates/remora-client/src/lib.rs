//! # remora-client
//!
//! Async client for the remora control protocol: one WebSocket connection
//! multiplexing correlated request/response calls, ordered batches, and
//! server-pushed events.
//!
//! ```no_run
//! use remora_client::{Client, ConnectOptions};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::connect(
//!     ConnectOptions::new("ws://127.0.0.1:4455").with_password("hunter2"),
//! )
//! .await?;
//!
//! let version = client.call("GetVersion", None).await?;
//! println!("{:?}", version.response_data);
//!
//! client.close().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod auth;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod pending;
pub mod session;
pub mod stats;

pub use auth::{AuthError, compute_auth_response};
pub use client::Client;
pub use config::ConnectOptions;
pub use dispatch::{
    ConnectionStatus, EventDispatcher, EventHandler, StatusHandler, SubscriptionToken,
};
pub use errors::{ClientError, HandshakeError};
pub use session::SessionState;
pub use stats::StatsSnapshot;

pub use remora_core::{
    BatchRequest, BatchResult, CallRequest, CallResult, CloseCode, EventEnvelope,
    EventSubscriptions, RequestId, RequestStatus,
};
