//! Connection configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use remora_core::EventSubscriptions;

/// Default connect timeout (ms).
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Default per-call timeout (ms).
const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

/// Default outbound queue capacity (frames).
const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// Everything needed to open and identify a session.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectOptions {
    /// WebSocket URL, e.g. `ws://127.0.0.1:4455`.
    pub url: String,
    /// Password for servers that issue an auth challenge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// RPC version to request in Identify.
    pub rpc_version: u32,
    /// Event categories to subscribe to.
    pub event_subscriptions: EventSubscriptions,
    /// How long to wait for transport open + handshake.
    pub connect_timeout_ms: u64,
    /// Deadline applied to calls that don't specify their own.
    pub call_timeout_ms: u64,
    /// Bound on the outbound frame queue. A full queue fails the
    /// enqueuing call fast instead of blocking it.
    pub outbound_queue_capacity: usize,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:4455".to_owned(),
            password: None,
            rpc_version: 1,
            event_subscriptions: EventSubscriptions::ALL,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            outbound_queue_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

impl ConnectOptions {
    /// Options for the given URL with everything else defaulted.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set the password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the event-subscription bitmask.
    #[must_use]
    pub fn with_subscriptions(mut self, subscriptions: EventSubscriptions) -> Self {
        self.event_subscriptions = subscriptions;
        self
    }

    /// Set the default per-call timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Connect timeout as a [`Duration`].
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Default per-call timeout as a [`Duration`].
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = ConnectOptions::default();
        assert_eq!(opts.url, "ws://127.0.0.1:4455");
        assert!(opts.password.is_none());
        assert_eq!(opts.rpc_version, 1);
        assert_eq!(opts.event_subscriptions, EventSubscriptions::ALL);
        assert_eq!(opts.connect_timeout(), Duration::from_secs(10));
        assert_eq!(opts.call_timeout(), Duration::from_secs(30));
        assert_eq!(opts.outbound_queue_capacity, 64);
    }

    #[test]
    fn builder_chain() {
        let opts = ConnectOptions::new("ws://example:4455")
            .with_password("pw")
            .with_subscriptions(EventSubscriptions::NONE)
            .with_call_timeout(Duration::from_millis(250));
        assert_eq!(opts.url, "ws://example:4455");
        assert_eq!(opts.password.as_deref(), Some("pw"));
        assert_eq!(opts.event_subscriptions, EventSubscriptions::NONE);
        assert_eq!(opts.call_timeout_ms, 250);
    }

    #[test]
    fn serde_fills_missing_fields_with_defaults() {
        let opts: ConnectOptions =
            serde_json::from_str(r#"{"url":"ws://host:1"}"#).unwrap();
        assert_eq!(opts.url, "ws://host:1");
        assert_eq!(opts.call_timeout_ms, 30_000);
    }

    #[test]
    fn serde_omits_absent_password() {
        let json = serde_json::to_value(ConnectOptions::default()).unwrap();
        assert!(json.get("password").is_none());
    }
}
