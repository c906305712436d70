//! The public client handle.
//!
//! [`Client`] is the one type callers hold: connect, issue calls and
//! batches, subscribe to events, renegotiate subscriptions, close. It is
//! cheap to share (`Arc` internals) and every method takes `&self`, so
//! concurrent calls from many tasks interleave freely over the single
//! multiplexed connection.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::instrument;

use remora_core::{
    BatchRequest, BatchResult, CallRequest, CallResult, ClientFrame, EventSubscriptions,
    HelloInfo, ReidentifyInfo, RequestId,
};

use crate::config::ConnectOptions;
use crate::dispatch::{
    ConnectionStatus, EventDispatcher, EventHandler, StatusHandler, SubscriptionToken,
};
use crate::errors::{ClientError, HandshakeError};
use crate::pending::{CallKind, CallOutcome, PendingGuard};
use crate::session::{SessionShared, SessionState, establish};
use crate::stats::StatsSnapshot;

/// How long `close` waits for the session loops to finish.
const LOOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle to one identified session.
///
/// Dropping the handle tears the session down; [`Client::close`] does the
/// same but also waits for the loops to drain.
pub struct Client {
    shared: Arc<SessionShared>,
    options: ConnectOptions,
    loops: Mutex<(Option<JoinHandle<()>>, Option<JoinHandle<()>>)>,
}

impl Client {
    /// Open the transport, complete the handshake, and return an
    /// identified client.
    ///
    /// The whole sequence is bounded by `options.connect_timeout_ms`.
    #[instrument(skip_all, fields(url = %options.url))]
    pub async fn connect(options: ConnectOptions) -> Result<Self, HandshakeError> {
        let dispatcher = Arc::new(EventDispatcher::new());
        Self::connect_with_dispatcher(options, dispatcher).await
    }

    /// Like [`Client::connect`], but with a caller-provided dispatcher so
    /// subscriptions can be registered before the first event arrives.
    pub async fn connect_with_dispatcher(
        options: ConnectOptions,
        dispatcher: Arc<EventDispatcher>,
    ) -> Result<Self, HandshakeError> {
        let session = establish(&options, dispatcher).await?;
        Ok(Self {
            shared: session.shared,
            options,
            loops: Mutex::new((Some(session.read_handle), Some(session.write_handle))),
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Calls
    // ─────────────────────────────────────────────────────────────────────

    /// Issue a single call with the configured default timeout.
    pub async fn call(
        &self,
        request_type: impl Into<String>,
        request_data: Option<Value>,
    ) -> Result<CallResult, ClientError> {
        self.call_with_timeout(request_type, request_data, self.options.call_timeout())
            .await
    }

    /// Issue a single call with an explicit per-call deadline.
    pub async fn call_with_timeout(
        &self,
        request_type: impl Into<String>,
        request_data: Option<Value>,
        timeout: Duration,
    ) -> Result<CallResult, ClientError> {
        self.send(CallRequest::new(request_type, request_data), timeout)
            .await
    }

    /// Issue a fully-formed request (caller controls the correlation id).
    pub async fn send(
        &self,
        request: CallRequest,
        timeout: Duration,
    ) -> Result<CallResult, ClientError> {
        let id = request.request_id.clone();
        let request_type = request.request_type.clone();
        let frame = ClientFrame::Request(request);

        counter!("remora_calls_total").increment(1);
        let started = Instant::now();
        let outcome = self
            .dispatch_call(id, CallKind::Single, &frame, &request_type, timeout)
            .await?;
        histogram!("remora_call_duration_seconds").record(started.elapsed().as_secs_f64());

        match outcome {
            CallOutcome::Single(result) => Ok(result),
            // The pending table rejects a batch outcome for a Single entry.
            CallOutcome::Batch(_) => unreachable!("kind-checked at resolution"),
        }
    }

    /// Issue an ordered batch with the configured default timeout.
    ///
    /// The results arrive together, in submission order. With
    /// `halt_on_failure` the server stops at the first failed request and
    /// the result list is correspondingly shorter.
    pub async fn call_batch(
        &self,
        requests: Vec<CallRequest>,
        halt_on_failure: bool,
    ) -> Result<BatchResult, ClientError> {
        self.call_batch_with_timeout(requests, halt_on_failure, self.options.call_timeout())
            .await
    }

    /// Issue an ordered batch with an explicit deadline for the whole batch.
    pub async fn call_batch_with_timeout(
        &self,
        requests: Vec<CallRequest>,
        halt_on_failure: bool,
        timeout: Duration,
    ) -> Result<BatchResult, ClientError> {
        let batch = BatchRequest {
            request_id: RequestId::new(),
            halt_on_failure,
            requests,
        };
        let id = batch.request_id.clone();
        let frame = ClientFrame::RequestBatch(batch);

        counter!("remora_batches_total").increment(1);
        let outcome = self
            .dispatch_call(id, CallKind::Batch, &frame, "RequestBatch", timeout)
            .await?;
        match outcome {
            CallOutcome::Batch(batch) => Ok(batch),
            CallOutcome::Single(_) => unreachable!("kind-checked at resolution"),
        }
    }

    /// Register the call, enqueue its frame, and await exactly one outcome.
    ///
    /// The deadline and session-cancel paths both go through
    /// `PendingTable::take`: only the path that actually removes the entry
    /// may synthesize an error, so a real result racing the deadline is
    /// honored instead of dropped.
    async fn dispatch_call(
        &self,
        id: RequestId,
        kind: CallKind,
        frame: &ClientFrame,
        request_type: &str,
        timeout: Duration,
    ) -> Result<CallOutcome, ClientError> {
        match self.state() {
            SessionState::Identified => {}
            SessionState::Closed => return Err(ClientError::SessionClosed),
            _ => return Err(ClientError::NotIdentified),
        }

        let reply = self.shared.pending.register(id.clone(), kind)?;
        let guard = PendingGuard::new(&self.shared.pending, id.clone());
        self.shared.enqueue(frame)?;

        let outcome = self
            .shared
            .await_outcome(&id, request_type, timeout, reply)
            .await;
        drop(guard);
        outcome
    }

    // ─────────────────────────────────────────────────────────────────────
    // Subscriptions and events
    // ─────────────────────────────────────────────────────────────────────

    /// Subscribe to one event type.
    pub fn on(&self, event_type: impl Into<String>, handler: EventHandler) -> SubscriptionToken {
        self.shared.dispatcher.on(event_type, handler)
    }

    /// Subscribe to every event.
    pub fn on_any(&self, handler: EventHandler) -> SubscriptionToken {
        self.shared.dispatcher.on_any(handler)
    }

    /// Subscribe to connection lifecycle signals.
    pub fn on_status(&self, handler: StatusHandler) -> SubscriptionToken {
        self.shared.dispatcher.on_status(handler)
    }

    /// Remove one subscription. Returns `false` if already removed.
    pub fn unsubscribe(&self, token: &SubscriptionToken) -> bool {
        self.shared.dispatcher.unsubscribe(token)
    }

    /// Replace the session's event-subscription bitmask in place.
    ///
    /// Fire-and-forget: the server acknowledges with a fresh Identified,
    /// observable on the status channel. The session stays identified and
    /// pending calls are unaffected.
    pub fn reidentify(&self, subscriptions: EventSubscriptions) -> Result<(), ClientError> {
        match self.state() {
            SessionState::Identified => {}
            SessionState::Closed => return Err(ClientError::SessionClosed),
            _ => return Err(ClientError::NotIdentified),
        }
        counter!("remora_reidentifies_total").increment(1);
        self.shared.enqueue(&ClientFrame::Reidentify(ReidentifyInfo {
            event_subscriptions: subscriptions,
        }))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Introspection and shutdown
    // ─────────────────────────────────────────────────────────────────────

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// The server identity captured from Hello during the handshake.
    #[must_use]
    pub fn server_info(&self) -> &HelloInfo {
        &self.shared.server_info
    }

    /// RPC version both sides agreed on.
    #[must_use]
    pub fn negotiated_rpc_version(&self) -> u32 {
        self.shared.negotiated_rpc_version
    }

    /// Snapshot of this connection's counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Tear the session down and wait (bounded) for its loops to finish.
    ///
    /// Every pending call resolves with `SessionClosed`; the write loop
    /// sends a Close frame on its way out. Idempotent with Drop.
    pub async fn close(&self) {
        self.shared
            .teardown(ConnectionStatus::Closed { code: None });
        let (read, write) = {
            let mut loops = self.loops.lock();
            (loops.0.take(), loops.1.take())
        };
        for handle in [read, write].into_iter().flatten() {
            let _ = tokio::time::timeout(LOOP_JOIN_TIMEOUT, handle).await;
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shared
            .teardown(ConnectionStatus::Closed { code: None });
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.options.url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
