//! Per-connection counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Running counters for one connection.
///
/// Cheap relaxed atomics; read via [`ConnectionStats::snapshot`].
#[derive(Debug, Default)]
pub struct ConnectionStats {
    frames_received: AtomicU64,
    frames_sent: AtomicU64,
    events_dispatched: AtomicU64,
    protocol_anomalies: AtomicU64,
    orphan_results: AtomicU64,
}

/// Point-in-time copy of [`ConnectionStats`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Frames decoded off the transport.
    pub frames_received: u64,
    /// Frames written to the transport.
    pub frames_sent: u64,
    /// Events fanned out to subscribers.
    pub events_dispatched: u64,
    /// Unknown opcodes and undecodable payloads after identify.
    pub protocol_anomalies: u64,
    /// Results whose correlation id matched no pending call.
    pub orphan_results: u64,
}

impl ConnectionStats {
    /// Fresh zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn frame_received(&self) {
        let _ = self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_sent(&self) {
        let _ = self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn event_dispatched(&self) {
        let _ = self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn protocol_anomaly(&self) {
        let _ = self.protocol_anomalies.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn orphan_result(&self) {
        let _ = self.orphan_results.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            protocol_anomalies: self.protocol_anomalies.load(Ordering::Relaxed),
            orphan_results: self.orphan_results.load(Ordering::Relaxed),
        }
    }
}
