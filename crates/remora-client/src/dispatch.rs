//! Event fan-out.
//!
//! Publish/subscribe registry decoupled from the transport. Handlers are
//! invoked fire-and-forget on their own tasks: no ordering guarantees
//! relative to each other or to the read loop that published the event,
//! and a handler that blocks or panics stalls nothing but itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use remora_core::{CloseCode, EventEnvelope};

/// Session lifecycle signals, published on the reserved status channel.
#[derive(Clone, Debug)]
pub enum ConnectionStatus {
    /// The transport opened and the handshake completed.
    Identified {
        /// RPC version both sides negotiated.
        negotiated_rpc_version: u32,
    },
    /// The read loop terminated abnormally.
    ConnectionError {
        /// What went wrong, for logging/display.
        message: String,
    },
    /// The session reached its terminal state.
    Closed {
        /// Protocol close code, when the server supplied one.
        code: Option<CloseCode>,
    },
}

/// Handler for server-pushed events.
pub type EventHandler = Arc<dyn Fn(EventEnvelope) + Send + Sync>;

/// Handler for connection-status signals.
pub type StatusHandler = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Channel {
    Typed(String),
    Wildcard,
    Status,
}

/// Opaque handle identifying one subscription.
///
/// Unsubscription is by token, never by handler identity; two closures
/// are not reliably comparable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionToken {
    channel: Channel,
    seq: u64,
}

struct DispatchInner {
    by_type: HashMap<String, Vec<(u64, EventHandler)>>,
    wildcard: Vec<(u64, EventHandler)>,
    status: Vec<(u64, StatusHandler)>,
}

/// Publish/subscribe registry mapping event-type names to handler lists.
pub struct EventDispatcher {
    inner: Mutex<DispatchInner>,
    next_seq: AtomicU64,
}

impl EventDispatcher {
    /// Create an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(DispatchInner {
                by_type: HashMap::new(),
                wildcard: Vec::new(),
                status: Vec::new(),
            }),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Subscribe to one event type.
    pub fn on(
        &self,
        event_type: impl Into<String>,
        handler: EventHandler,
    ) -> SubscriptionToken {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let event_type = event_type.into();
        let mut inner = self.inner.lock();
        inner
            .by_type
            .entry(event_type.clone())
            .or_default()
            .push((seq, handler));
        SubscriptionToken {
            channel: Channel::Typed(event_type),
            seq,
        }
    }

    /// Subscribe to every event, regardless of type.
    pub fn on_any(&self, handler: EventHandler) -> SubscriptionToken {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.inner.lock().wildcard.push((seq, handler));
        SubscriptionToken {
            channel: Channel::Wildcard,
            seq,
        }
    }

    /// Subscribe to connection lifecycle signals.
    pub fn on_status(&self, handler: StatusHandler) -> SubscriptionToken {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.inner.lock().status.push((seq, handler));
        SubscriptionToken {
            channel: Channel::Status,
            seq,
        }
    }

    /// Remove exactly the subscription the token was issued for.
    ///
    /// Returns `false` if the token was already unsubscribed.
    pub fn unsubscribe(&self, token: &SubscriptionToken) -> bool {
        let mut inner = self.inner.lock();
        match &token.channel {
            Channel::Typed(event_type) => {
                let Some(handlers) = inner.by_type.get_mut(event_type) else {
                    return false;
                };
                let before = handlers.len();
                handlers.retain(|(seq, _)| *seq != token.seq);
                let removed = handlers.len() < before;
                if handlers.is_empty() {
                    let _ = inner.by_type.remove(event_type);
                }
                removed
            }
            Channel::Wildcard => {
                let before = inner.wildcard.len();
                inner.wildcard.retain(|(seq, _)| *seq != token.seq);
                inner.wildcard.len() < before
            }
            Channel::Status => {
                let before = inner.status.len();
                inner.status.retain(|(seq, _)| *seq != token.seq);
                inner.status.len() < before
            }
        }
    }

    /// Fan an event out to its typed subscribers and every wildcard
    /// subscriber, one spawned task per handler invocation.
    ///
    /// Outside a tokio runtime (teardown from a plain thread) handlers
    /// run inline instead.
    pub fn publish(&self, event: &EventEnvelope) {
        let handlers: Vec<EventHandler> = {
            let inner = self.inner.lock();
            inner
                .by_type
                .get(&event.event_type)
                .into_iter()
                .flatten()
                .chain(inner.wildcard.iter())
                .map(|(_, h)| Arc::clone(h))
                .collect()
        };
        for handler in handlers {
            let event = event.clone();
            match tokio::runtime::Handle::try_current() {
                Ok(rt) => {
                    let _ = rt.spawn(async move { handler(event) });
                }
                Err(_) => handler(event),
            }
        }
    }

    /// Fan a status signal out to the reserved channel.
    ///
    /// Outside a tokio runtime (teardown from a plain thread) handlers
    /// run inline instead.
    pub fn publish_status(&self, status: &ConnectionStatus) {
        let handlers: Vec<StatusHandler> = {
            let inner = self.inner.lock();
            inner.status.iter().map(|(_, h)| Arc::clone(h)).collect()
        };
        for handler in handlers {
            let status = status.clone();
            match tokio::runtime::Handle::try_current() {
                Ok(rt) => {
                    let _ = rt.spawn(async move { handler(status) });
                }
                Err(_) => handler(status),
            }
        }
    }

    /// Total registered handlers across all channels.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        let inner = self.inner.lock();
        inner.by_type.values().map(Vec::len).sum::<usize>()
            + inner.wildcard.len()
            + inner.status.len()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
