//! Session lifecycle: transport open, handshake, read/write loops, routing.
//!
//! One connection runs exactly two loops: a read loop that decodes and
//! routes every inbound frame, and a write loop that drains the bounded
//! outbound queue in order. They share the pending-call table only through
//! its own lock, and the transport halves are never touched by anyone else.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use metrics::{counter, histogram};
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use remora_core::{
    ClientFrame, CloseCode, HelloInfo, IdentifyInfo, RequestId, ServerFrame,
};

use crate::auth::compute_auth_response;
use crate::config::ConnectOptions;
use crate::dispatch::{ConnectionStatus, EventDispatcher};
use crate::errors::{ClientError, HandshakeError};
use crate::pending::{CallKind, CallOutcome, Delivery, PendingTable, ReplyRx};
use crate::stats::ConnectionStats;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Where a session is in its life.
///
/// Transitions are one-directional and driven only by frames actually
/// received from the transport; `Closed` is terminal and reachable from
/// any state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No transport yet.
    Disconnected,
    /// Transport open, waiting for the server's Hello.
    AwaitingHello,
    /// Identify sent, waiting for Identified.
    AwaitingIdentified,
    /// Handshake complete; calls accepted, events dispatched.
    Identified,
    /// Torn down. Terminal.
    Closed,
}

/// State shared between the loops and the public client handle.
pub(crate) struct SessionShared {
    pub(crate) pending: PendingTable,
    pub(crate) dispatcher: Arc<EventDispatcher>,
    pub(crate) stats: ConnectionStats,
    pub(crate) cancel: CancellationToken,
    pub(crate) server_info: HelloInfo,
    pub(crate) negotiated_rpc_version: u32,
    outbound_tx: mpsc::Sender<String>,
    state_tx: watch::Sender<SessionState>,
    closed: AtomicBool,
    connected_at: Instant,
}

impl SessionShared {
    /// Current session state.
    pub(crate) fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Encode a frame and push it onto the outbound queue.
    ///
    /// Never blocks: a full queue is backpressure and fails the call fast.
    pub(crate) fn enqueue(&self, frame: &ClientFrame) -> Result<(), ClientError> {
        let text = frame.encode()?;
        self.outbound_tx.try_send(text).map_err(|err| match err {
            TrySendError::Full(_) => ClientError::Backpressure,
            TrySendError::Closed(_) => ClientError::SessionClosed,
        })
    }

    /// Await exactly one outcome for a registered call.
    ///
    /// The deadline and session-cancel paths both go through
    /// [`PendingTable::take`]: only the path that actually removes the
    /// entry may synthesize an error, so a real result racing the deadline
    /// is honored instead of dropped.
    pub(crate) async fn await_outcome(
        &self,
        id: &RequestId,
        request_type: &str,
        timeout: Duration,
        mut reply: ReplyRx,
    ) -> Result<CallOutcome, ClientError> {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        tokio::select! {
            outcome = &mut reply => match outcome {
                Ok(outcome) => outcome,
                Err(_) => Err(ClientError::SessionClosed),
            },
            () = &mut deadline => {
                if self.pending.take(id) {
                    counter!("remora_call_timeouts_total").increment(1);
                    debug!(request_id = %id, request_type, "call timed out");
                    Err(ClientError::Timeout {
                        request_type: request_type.to_owned(),
                        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    })
                } else {
                    // Lost the race to a real resolution; it is in flight.
                    match reply.await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(ClientError::SessionClosed),
                    }
                }
            },
            () = self.cancel.cancelled() => {
                if self.pending.take(id) {
                    Err(ClientError::SessionClosed)
                } else {
                    match reply.await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(ClientError::SessionClosed),
                    }
                }
            },
        }
    }

    /// Tear the session down: cancel the session scope, resolve every
    /// pending call with `SessionClosed`, publish the final status.
    ///
    /// Idempotent; the second and later calls are no-ops.
    pub(crate) fn teardown(&self, status: ConnectionStatus) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        let _ = self.state_tx.send(SessionState::Closed);
        self.pending.cancel_all();
        self.dispatcher.publish_status(&status);
        counter!("remora_disconnections_total").increment(1);
        histogram!("remora_connection_duration_seconds")
            .record(self.connected_at.elapsed().as_secs_f64());
        info!("session closed");
    }
}

/// A connected, identified session with its loops running.
pub(crate) struct EstablishedSession {
    pub(crate) shared: Arc<SessionShared>,
    pub(crate) read_handle: JoinHandle<()>,
    pub(crate) write_handle: JoinHandle<()>,
}

/// Open the transport, drive Hello → Identify → Identified, then spawn
/// the read and write loops. The whole sequence is bounded by the
/// configured connect timeout.
pub(crate) async fn establish(
    options: &ConnectOptions,
    dispatcher: Arc<EventDispatcher>,
) -> Result<EstablishedSession, HandshakeError> {
    match tokio::time::timeout(options.connect_timeout(), establish_inner(options, dispatcher))
        .await
    {
        Ok(result) => result,
        Err(_) => Err(HandshakeError::ConnectTimeout {
            timeout_ms: options.connect_timeout_ms,
        }),
    }
}

#[instrument(skip_all, fields(url = %options.url))]
async fn establish_inner(
    options: &ConnectOptions,
    dispatcher: Arc<EventDispatcher>,
) -> Result<EstablishedSession, HandshakeError> {
    // The receiver half is dropped; state is read back through the
    // sender's own `borrow`.
    let (state_tx, _state_rx) = watch::channel(SessionState::Disconnected);

    let (mut ws, _response) = connect_async(options.url.as_str()).await?;
    counter!("remora_connections_total").increment(1);
    let _ = state_tx.send(SessionState::AwaitingHello);
    debug!("transport open, awaiting hello");

    let hello = match next_handshake_frame(&mut ws).await? {
        ServerFrame::Hello(hello) => hello,
        other => return Err(HandshakeError::UnexpectedFrame { op: other.op() }),
    };

    let authentication = match &hello.authentication {
        Some(challenge) => {
            let password = options
                .password
                .as_deref()
                .ok_or(HandshakeError::AuthenticationRequired)?;
            Some(compute_auth_response(
                password,
                &challenge.challenge,
                &challenge.salt,
            )?)
        }
        None => None,
    };

    // Identify goes out before the state advances past AwaitingHello.
    let identify = ClientFrame::Identify(IdentifyInfo {
        rpc_version: options.rpc_version,
        authentication,
        event_subscriptions: options.event_subscriptions,
    });
    ws.send(Message::Text(identify.encode()?.into())).await?;
    let _ = state_tx.send(SessionState::AwaitingIdentified);

    let identified = match next_handshake_frame(&mut ws).await? {
        ServerFrame::Identified(info) => info,
        other => return Err(HandshakeError::UnexpectedFrame { op: other.op() }),
    };
    let _ = state_tx.send(SessionState::Identified);
    info!(
        negotiated_rpc_version = identified.negotiated_rpc_version,
        "session identified"
    );

    let (ws_tx, ws_rx) = ws.split();
    let (outbound_tx, outbound_rx) = mpsc::channel(options.outbound_queue_capacity);

    let shared = Arc::new(SessionShared {
        pending: PendingTable::new(),
        dispatcher,
        stats: ConnectionStats::new(),
        cancel: CancellationToken::new(),
        server_info: hello,
        negotiated_rpc_version: identified.negotiated_rpc_version,
        outbound_tx,
        state_tx,
        closed: AtomicBool::new(false),
        connected_at: Instant::now(),
    });

    shared.dispatcher.publish_status(&ConnectionStatus::Identified {
        negotiated_rpc_version: identified.negotiated_rpc_version,
    });

    let read_handle = tokio::spawn(read_loop(ws_rx, Arc::clone(&shared)));
    let write_handle = tokio::spawn(write_loop(ws_tx, outbound_rx, Arc::clone(&shared)));

    Ok(EstablishedSession {
        shared,
        read_handle,
        write_handle,
    })
}

/// Next decoded frame during the handshake.
///
/// Any decode failure here is fatal: the session never reached
/// `Identified`, so there is nothing to salvage.
async fn next_handshake_frame(ws: &mut WsStream) -> Result<ServerFrame, HandshakeError> {
    loop {
        match ws.next().await {
            None => return Err(HandshakeError::TransportClosed),
            Some(Err(err)) => return Err(HandshakeError::Connect(err)),
            Some(Ok(Message::Text(text))) => return Ok(ServerFrame::decode(text.as_str())?),
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = frame
                    .map(|f| {
                        (
                            CloseCode::from_code(u16::from(f.code)),
                            f.reason.to_string(),
                        )
                    })
                    .unwrap_or((None, String::new()));
                return Err(HandshakeError::Rejected { code, reason });
            }
            // Ping/pong and binary frames are not part of the handshake.
            Some(Ok(_)) => {}
        }
    }
}

/// Decode and route inbound frames until the transport or the session ends.
#[instrument(skip_all)]
async fn read_loop(mut ws_rx: SplitStream<WsStream>, shared: Arc<SessionShared>) {
    let status = loop {
        tokio::select! {
            () = shared.cancel.cancelled() => {
                break ConnectionStatus::Closed { code: None };
            }
            frame = ws_rx.next() => match frame {
                None => {
                    break ConnectionStatus::ConnectionError {
                        message: "transport ended unexpectedly".to_owned(),
                    };
                }
                Some(Err(err)) => {
                    warn!(error = %err, "transport read failed");
                    break ConnectionStatus::ConnectionError {
                        message: err.to_string(),
                    };
                }
                Some(Ok(Message::Text(text))) => route(&shared, text.as_str()),
                Some(Ok(Message::Close(frame))) => {
                    let code = frame
                        .as_ref()
                        .and_then(|f| CloseCode::from_code(u16::from(f.code)));
                    info!(?code, "server closed the connection");
                    break ConnectionStatus::Closed { code };
                }
                // Ping/pong are answered by the transport layer; binary
                // frames are not part of this protocol.
                Some(Ok(_)) => {}
            }
        }
    };
    shared.teardown(status);
}

/// Drain the outbound queue to the transport, in enqueue order.
async fn write_loop(
    mut ws_tx: SplitSink<WsStream, Message>,
    mut outbound_rx: mpsc::Receiver<String>,
    shared: Arc<SessionShared>,
) {
    loop {
        tokio::select! {
            () = shared.cancel.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            frame = outbound_rx.recv() => match frame {
                Some(text) => {
                    if let Err(err) = ws_tx.send(Message::Text(text.into())).await {
                        warn!(error = %err, "transport write failed");
                        shared.teardown(ConnectionStatus::ConnectionError {
                            message: err.to_string(),
                        });
                        break;
                    }
                    shared.stats.frame_sent();
                    counter!("remora_frames_sent_total").increment(1);
                }
                None => break,
            }
        }
    }
}

/// Route one decoded inbound frame on an identified session.
///
/// Only handshake frames move the state machine; everything else goes to
/// the dispatcher or the pending table. Anomalies are logged and counted,
/// never fatal. The read loop keeps going unless the transport itself died.
fn route(shared: &Arc<SessionShared>, text: &str) {
    shared.stats.frame_received();
    counter!("remora_frames_received_total").increment(1);

    let frame = match ServerFrame::decode(text) {
        Ok(frame) => frame,
        Err(err) => {
            shared.stats.protocol_anomaly();
            counter!("remora_protocol_anomalies_total").increment(1);
            warn!(error = %err, "dropping undecodable frame");
            return;
        }
    };

    match frame {
        ServerFrame::Event(event) => {
            shared.stats.event_dispatched();
            shared.dispatcher.publish(&event);
        }
        ServerFrame::RequestResponse(result) => {
            let id = result.request_id.clone();
            let outcome = if result.is_ok() {
                Ok(CallOutcome::Single(result))
            } else {
                Err(ClientError::from_status(&result.request_status))
            };
            deliver(shared, &id, CallKind::Single, outcome);
        }
        ServerFrame::RequestBatchResponse(batch) => {
            let id = batch.request_id.clone();
            deliver(shared, &id, CallKind::Batch, Ok(CallOutcome::Batch(batch)));
        }
        ServerFrame::Identified(info) => {
            // Acknowledgement of a Reidentify; the session stays identified.
            debug!(
                negotiated_rpc_version = info.negotiated_rpc_version,
                "re-identified"
            );
            shared.dispatcher.publish_status(&ConnectionStatus::Identified {
                negotiated_rpc_version: info.negotiated_rpc_version,
            });
        }
        ServerFrame::Hello(_) => {
            shared.stats.protocol_anomaly();
            counter!("remora_protocol_anomalies_total").increment(1);
            warn!("unexpected Hello on an identified session");
        }
        ServerFrame::Unknown { op } => {
            shared.stats.protocol_anomaly();
            counter!("remora_protocol_anomalies_total").increment(1);
            warn!(op, "ignoring unknown opcode");
        }
    }
}

fn deliver(
    shared: &Arc<SessionShared>,
    id: &RequestId,
    kind: CallKind,
    outcome: Result<CallOutcome, ClientError>,
) {
    match shared.pending.resolve(id, kind, outcome) {
        Delivery::Delivered => {}
        Delivery::Orphan => {
            shared.stats.orphan_result();
            counter!("remora_orphan_results_total").increment(1);
            warn!(request_id = %id, "orphan result with no pending call");
        }
        Delivery::KindMismatch => {
            shared.stats.protocol_anomaly();
            counter!("remora_protocol_anomalies_total").increment(1);
            warn!(request_id = %id, "result kind does not match the pending call");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn make_shared() -> (Arc<SessionShared>, mpsc::Receiver<String>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(4);
        let (state_tx, _state_rx) = watch::channel(SessionState::Identified);
        let shared = Arc::new(SessionShared {
            pending: PendingTable::new(),
            dispatcher: Arc::new(EventDispatcher::new()),
            stats: ConnectionStats::new(),
            cancel: CancellationToken::new(),
            server_info: HelloInfo::default(),
            negotiated_rpc_version: 1,
            outbound_tx,
            state_tx,
            closed: AtomicBool::new(false),
            connected_at: Instant::now(),
        });
        (shared, outbound_rx)
    }

    #[tokio::test]
    async fn unknown_opcode_is_counted_not_fatal() {
        let (shared, _rx) = make_shared();
        route(&shared, r#"{"op":42,"d":{}}"#);
        assert_eq!(shared.stats.snapshot().protocol_anomalies, 1);
        assert_eq!(shared.state(), SessionState::Identified);
    }

    #[tokio::test]
    async fn undecodable_frame_is_counted_not_fatal() {
        let (shared, _rx) = make_shared();
        route(&shared, "%%% not json %%%");
        assert_eq!(shared.stats.snapshot().protocol_anomalies, 1);
        assert_eq!(shared.state(), SessionState::Identified);
    }

    #[tokio::test]
    async fn orphan_result_is_counted_not_delivered() {
        let (shared, _rx) = make_shared();
        route(
            &shared,
            r#"{"op":7,"d":{"requestId":"ghost","requestStatus":{"result":true,"code":100}}}"#,
        );
        assert_eq!(shared.stats.snapshot().orphan_results, 1);
        assert!(shared.pending.is_empty());
    }

    #[tokio::test]
    async fn matching_result_is_delivered() {
        let (shared, _rx) = make_shared();
        let reply = shared
            .pending
            .register("r1".into(), CallKind::Single)
            .unwrap();
        route(
            &shared,
            r#"{"op":7,"d":{"requestId":"r1","requestStatus":{"result":true,"code":100}}}"#,
        );
        let outcome = reply.await.unwrap().unwrap();
        assert!(matches!(outcome, CallOutcome::Single(result) if result.is_ok()));
        assert!(shared.pending.is_empty());
    }

    #[tokio::test]
    async fn failed_single_result_does_not_consume_a_batch_entry() {
        let (shared, _rx) = make_shared();
        let _reply = shared
            .pending
            .register("b1".into(), CallKind::Batch)
            .unwrap();
        route(
            &shared,
            r#"{"op":7,"d":{"requestId":"b1","requestStatus":{"result":false,"code":500}}}"#,
        );
        assert_eq!(shared.pending.len(), 1, "batch entry must stay pending");
        assert_eq!(shared.stats.snapshot().protocol_anomalies, 1);
    }

    #[tokio::test]
    async fn failed_status_is_delivered_as_typed_error() {
        let (shared, _rx) = make_shared();
        let reply = shared
            .pending
            .register("r1".into(), CallKind::Single)
            .unwrap();
        route(
            &shared,
            r#"{"op":7,"d":{"requestId":"r1","requestStatus":{"result":false,"code":204,"comment":"nope"}}}"#,
        );
        let err = reply.await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::Request { code: 204, .. }));
    }

    #[tokio::test]
    async fn event_frame_reaches_subscribers() {
        let (shared, _rx) = make_shared();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _token = shared.dispatcher.on_any(Arc::new(move |event| {
            let _ = tx.send(event.event_type);
        }));
        route(&shared, r#"{"op":5,"d":{"eventType":"StreamStarted"}}"#);
        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(got.as_deref(), Some("StreamStarted"));
        assert_eq!(shared.stats.snapshot().events_dispatched, 1);
    }

    #[tokio::test]
    async fn teardown_is_idempotent_and_cancels_pending() {
        let (shared, _rx) = make_shared();
        let reply = shared
            .pending
            .register("r1".into(), CallKind::Single)
            .unwrap();

        shared.teardown(ConnectionStatus::Closed { code: None });
        shared.teardown(ConnectionStatus::Closed { code: None });

        assert_eq!(shared.state(), SessionState::Closed);
        assert!(shared.cancel.is_cancelled());
        let err = reply.await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::SessionClosed));
    }

    #[tokio::test]
    async fn enqueue_full_queue_is_backpressure() {
        let (shared, _rx) = make_shared();
        let frame = ClientFrame::Request(remora_core::CallRequest::new("Fill", None));
        // Capacity is 4 in make_shared.
        for _ in 0..4 {
            shared.enqueue(&frame).unwrap();
        }
        let err = shared.enqueue(&frame).unwrap_err();
        assert!(matches!(err, ClientError::Backpressure));
    }

    #[tokio::test]
    async fn enqueue_after_consumer_gone_is_session_closed() {
        let (shared, rx) = make_shared();
        drop(rx);
        let frame = ClientFrame::Request(remora_core::CallRequest::new("Late", None));
        let err = shared.enqueue(&frame).unwrap_err();
        assert!(matches!(err, ClientError::SessionClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fires_at_exactly_the_configured_timeout() {
        let (shared, _rx) = make_shared();
        let id: RequestId = "slow".into();
        let reply = shared
            .pending
            .register(id.clone(), CallKind::Single)
            .unwrap();

        let started = tokio::time::Instant::now();
        let err = shared
            .await_outcome(&id, "SlowCall", Duration::from_millis(50), reply)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ClientError::Timeout { timeout_ms: 50, ref request_type } if request_type == "SlowCall"
        ));
        // Paused clock: the deadline advances time to the tick, no further.
        assert_eq!(started.elapsed(), Duration::from_millis(50));
        assert!(shared.pending.is_empty(), "timed-out entry must be removed");
    }

    #[tokio::test(start_paused = true)]
    async fn resolution_inside_the_deadline_wins() {
        let (shared, _rx) = make_shared();
        let id: RequestId = "fast".into();
        let reply = shared
            .pending
            .register(id.clone(), CallKind::Single)
            .unwrap();

        let waiter = {
            let shared = Arc::clone(&shared);
            let id = id.clone();
            tokio::spawn(async move {
                shared
                    .await_outcome(&id, "FastCall", Duration::from_millis(50), reply)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        route(
            &shared,
            r#"{"op":7,"d":{"requestId":"fast","requestStatus":{"result":true,"code":100}}}"#,
        );

        let outcome = waiter.await.unwrap().unwrap();
        assert!(matches!(outcome, CallOutcome::Single(result) if result.is_ok()));
        assert!(shared.pending.is_empty());
    }

    #[tokio::test]
    async fn frames_are_enqueued_in_order() {
        let (shared, mut rx) = make_shared();
        for name in ["A", "B", "C"] {
            let frame = ClientFrame::Request(remora_core::CallRequest::new(name, None));
            shared.enqueue(&frame).unwrap();
        }
        for expected in ["A", "B", "C"] {
            let text = rx.recv().await.unwrap();
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(value["d"]["requestType"], expected);
        }
    }
}
