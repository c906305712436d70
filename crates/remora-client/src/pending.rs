//! In-flight call table.
//!
//! The single source of truth for "is this id still awaiting resolution".
//! All mutation is serialized through one mutex, and removal-under-lock
//! hands the reply channel to exactly one resolver, so a response racing
//! a timeout can never both deliver. The loser of the race sees the entry
//! already gone and backs off.

use std::collections::HashMap;

use metrics::gauge;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use remora_core::{BatchResult, CallResult, RequestId};

use crate::errors::ClientError;

/// Whether a pending entry awaits a single result or a whole batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    /// One `CallResult` under op 7.
    Single,
    /// One ordered `BatchResult` under op 9.
    Batch,
}

/// A resolved call outcome.
#[derive(Debug)]
pub enum CallOutcome {
    /// Result of a single call.
    Single(CallResult),
    /// Ordered results of a batch.
    Batch(BatchResult),
}

impl CallOutcome {
    fn kind(&self) -> CallKind {
        match self {
            Self::Single(_) => CallKind::Single,
            Self::Batch(_) => CallKind::Batch,
        }
    }
}

/// What happened when the router tried to deliver a result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the waiting caller.
    Delivered,
    /// No pending entry for the id; an orphan result.
    Orphan,
    /// An entry exists but expects the other call kind; the frame is
    /// discarded and the entry left to its own deadline.
    KindMismatch,
}

type ReplyTx = oneshot::Sender<Result<CallOutcome, ClientError>>;

/// Reply receiver handed to the caller at registration.
pub type ReplyRx = oneshot::Receiver<Result<CallOutcome, ClientError>>;

struct PendingCall {
    kind: CallKind,
    reply: ReplyTx,
}

struct TableInner {
    entries: HashMap<RequestId, PendingCall>,
    closed: bool,
}

/// Arena of in-flight calls, keyed by correlation id.
///
/// Exposes only `register` / `resolve` / `take` / `cancel_all`; the map
/// itself never leaks.
pub struct PendingTable {
    inner: Mutex<TableInner>,
}

impl PendingTable {
    /// Create an empty, open table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TableInner {
                entries: HashMap::new(),
                closed: false,
            }),
        }
    }

    /// Register an in-flight call and return the receiver its outcome
    /// will arrive on.
    ///
    /// Fails with `SessionClosed` after [`Self::cancel_all`], so late
    /// registrations cannot hang forever.
    pub fn register(&self, id: RequestId, kind: CallKind) -> Result<ReplyRx, ClientError> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(ClientError::SessionClosed);
        }
        debug_assert!(
            !inner.entries.contains_key(&id),
            "correlation ids are unique per session"
        );
        let _ = inner.entries.insert(id, PendingCall { kind, reply: tx });
        gauge!("remora_pending_calls").set(inner.entries.len() as f64);
        Ok(rx)
    }

    /// Deliver an outcome (success or synthesized application failure) to
    /// the matching waiter, removing its entry.
    ///
    /// `kind` is the call kind implied by the frame's opcode. An entry
    /// expecting the other kind is left untouched regardless of whether the
    /// outcome is a success or a failure; the frame is reported as a
    /// mismatch instead.
    ///
    /// The send happens outside the lock; a dropped receiver (caller gave
    /// up) is not an error.
    pub fn resolve(
        &self,
        id: &RequestId,
        kind: CallKind,
        outcome: Result<CallOutcome, ClientError>,
    ) -> Delivery {
        debug_assert!(
            !matches!(&outcome, Ok(out) if out.kind() != kind),
            "outcome kind must match the frame's kind"
        );
        let entry = {
            let mut inner = self.inner.lock();
            if let Some(call) = inner.entries.get(id) {
                if call.kind != kind {
                    return Delivery::KindMismatch;
                }
            }
            let entry = inner.entries.remove(id);
            gauge!("remora_pending_calls").set(inner.entries.len() as f64);
            entry
        };
        match entry {
            Some(call) => {
                let _ = call.reply.send(outcome);
                Delivery::Delivered
            }
            None => Delivery::Orphan,
        }
    }

    /// Remove an entry without resolving it.
    ///
    /// Used by the timeout/cancellation paths and the caller's drop guard.
    /// Returns `false` if the entry was already gone, meaning some other
    /// path won the race and its resolution is (or was) in flight.
    pub fn take(&self, id: &RequestId) -> bool {
        let mut inner = self.inner.lock();
        let removed = inner.entries.remove(id).is_some();
        if removed {
            gauge!("remora_pending_calls").set(inner.entries.len() as f64);
        }
        removed
    }

    /// Resolve every pending call with `SessionClosed`, empty the table,
    /// and refuse further registrations. Idempotent.
    pub fn cancel_all(&self) {
        let drained: Vec<PendingCall> = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            let drained = inner.entries.drain().map(|(_, call)| call).collect();
            gauge!("remora_pending_calls").set(0.0);
            drained
        };
        for call in drained {
            let _ = call.reply.send(Err(ClientError::SessionClosed));
        }
    }

    /// Number of calls currently in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether no calls are in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes the caller's own entry when its future is dropped mid-wait,
/// so abandoned calls never leak across the session.
pub struct PendingGuard<'a> {
    table: &'a PendingTable,
    id: RequestId,
}

impl<'a> PendingGuard<'a> {
    /// Guard `id` in `table`.
    #[must_use]
    pub fn new(table: &'a PendingTable, id: RequestId) -> Self {
        Self { table, id }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        // No-op if a resolution path already removed the entry.
        let _ = self.table.take(&self.id);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
