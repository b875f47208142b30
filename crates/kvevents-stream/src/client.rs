//! `StreamingClient`: one endpoint, one connection, one worker task.
//!
//! ```text
//!            start()
//! Disconnected ──► Connecting ──► Connected ◄──────────────┐
//!                                     │ poll/read failure   │ connect ok
//!                                     ▼                     │ (+ replay from last+1)
//!                               ReconnectWait ──► Connecting┘
//!                                     │ connect failed: wait again
//!   any state ── stop() ──► Stopped
//! ```
//!
//! The worker owns the connection. Per-client state (phase and last-seen
//! sequence) sits behind a `parking_lot::RwLock` that is never held across
//! an await.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use kvevents_core::decoder::decode_batch;
use kvevents_core::error::{LifecycleError, TransportError};
use kvevents_core::frame::Frame;
use kvevents_core::handler::EventHandler;
use kvevents_core::metrics::{ClientMetrics, MetricsSnapshot};
use kvevents_core::sequence::{SequenceObservation, SequenceTracker};
use kvevents_core::transport::{EventConnection, EventTransport};
use kvevents_core::types::Endpoint;

use crate::config::ClientSettings;
use crate::error::ClientError;

// ─── State ───────────────────────────────────────────────────────────────────

/// Where a client is in its connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPhase {
    Disconnected,
    Connecting,
    Connected,
    ReconnectWait,
    Stopped,
}

impl std::fmt::Display for ClientPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::ReconnectWait => "reconnect-wait",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
struct ClientState {
    phase: ClientPhase,
    sequence: SequenceTracker,
}

type Connection = Box<dyn EventConnection>;

enum Lifecycle {
    Idle,
    Running(JoinHandle<Option<Connection>>),
    Stopped,
}

/// Everything the worker task needs, shared with the client handle.
struct Inner {
    endpoint: Endpoint,
    settings: ClientSettings,
    transport: Arc<dyn EventTransport>,
    handler: Arc<dyn EventHandler>,
    state: RwLock<ClientState>,
    metrics: ClientMetrics,
}

// ─── StreamingClient ─────────────────────────────────────────────────────────

/// Consumes the event stream of a single endpoint.
///
/// `start()` connects once and launches the worker; `stop()` cancels it,
/// waits for it to exit and closes the connection. Decode and handler
/// failures are counted and logged, never fatal.
pub struct StreamingClient {
    inner: Arc<Inner>,
    cancel: CancellationToken,
    lifecycle: Mutex<Lifecycle>,
}

impl StreamingClient {
    pub fn new(
        endpoint: Endpoint,
        settings: ClientSettings,
        transport: Arc<dyn EventTransport>,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                endpoint,
                settings,
                transport,
                handler,
                state: RwLock::new(ClientState {
                    phase: ClientPhase::Disconnected,
                    sequence: SequenceTracker::new(),
                }),
                metrics: ClientMetrics::new(),
            }),
            cancel: CancellationToken::new(),
            lifecycle: Mutex::new(Lifecycle::Idle),
        }
    }

    /// Tie this client's cancellation to `parent`: cancelling the parent
    /// stops the worker at its next wait point.
    pub fn with_cancellation(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    /// Connect once and launch the consume loop.
    ///
    /// Fails without launching anything if that first connect fails. The
    /// loop itself retries forever.
    pub async fn start(&self) -> Result<(), ClientError> {
        let mut lifecycle = self.lifecycle.lock().await;
        match *lifecycle {
            Lifecycle::Idle => {}
            Lifecycle::Running(_) => return Err(LifecycleError::AlreadyStarted.into()),
            Lifecycle::Stopped => return Err(LifecycleError::Stopped.into()),
        }

        self.inner.set_phase(ClientPhase::Connecting);
        let conn = match self.inner.connect().await {
            Ok(conn) => conn,
            Err(e) => {
                self.inner.set_phase(ClientPhase::Disconnected);
                return Err(e.into());
            }
        };
        self.inner.set_phase(ClientPhase::Connected);
        info!(endpoint = %self.inner.endpoint.name, "streaming client started");

        let inner = Arc::clone(&self.inner);
        let cancel = self.cancel.clone();
        *lifecycle = Lifecycle::Running(tokio::spawn(inner.run(conn, cancel)));
        Ok(())
    }

    /// Cancel the worker, wait for it and release the connection.
    /// Safe to call any number of times.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let previous = std::mem::replace(&mut *lifecycle, Lifecycle::Stopped);
        self.cancel.cancel();

        match previous {
            Lifecycle::Stopped => return,
            Lifecycle::Idle => {}
            Lifecycle::Running(worker) => match worker.await {
                Ok(Some(conn)) => conn.close().await,
                Ok(None) => {}
                Err(e) => warn!(endpoint = %self.inner.endpoint.name, error = %e, "worker task failed"),
            },
        }

        self.inner.set_phase(ClientPhase::Stopped);
        info!(endpoint = %self.inner.endpoint.name, "streaming client stopped");
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    pub fn name(&self) -> &str {
        &self.inner.endpoint.name
    }

    pub fn phase(&self) -> ClientPhase {
        self.inner.state.read().phase
    }

    pub fn is_connected(&self) -> bool {
        self.phase() == ClientPhase::Connected
    }

    /// Last sequence number seen, `None` before the first message.
    pub fn last_sequence(&self) -> Option<u64> {
        self.inner.state.read().sequence.last()
    }

    /// Returns a snapshot of this client's counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }
}

// ─── Worker ──────────────────────────────────────────────────────────────────

enum Poll {
    Cancelled,
    Idle,
    Message(Vec<Bytes>),
    Broken(TransportError),
}

impl Inner {
    fn set_phase(&self, phase: ClientPhase) {
        self.state.write().phase = phase;
    }

    /// One connect attempt, bounded by the connect timeout.
    async fn connect(&self) -> Result<Connection, TransportError> {
        let limit = self.settings.connect_timeout();
        let result = match tokio::time::timeout(limit, self.transport.connect(&self.endpoint)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                op: "connect",
                ms: self.settings.connect_timeout_ms,
            }),
        };
        match &result {
            Ok(_) => self.metrics.connected(),
            Err(_) => self.metrics.connect_failure(),
        }
        result
    }

    /// The consume loop. Returns the live connection, if any, so the caller
    /// can close it exactly once.
    async fn run(self: Arc<Self>, conn: Connection, cancel: CancellationToken) -> Option<Connection> {
        let name = self.endpoint.name.as_str();
        let mut conn = Some(conn);

        while !cancel.is_cancelled() {
            let Some(live) = conn.as_mut() else {
                conn = self.reconnect(&cancel).await;
                continue;
            };

            let poll_timeout = self.settings.poll_timeout();
            let poll = tokio::select! {
                _ = cancel.cancelled() => Poll::Cancelled,
                res = tokio::time::timeout(poll_timeout, live.recv()) => match res {
                    Err(_) => Poll::Idle,
                    Ok(Ok(parts)) => Poll::Message(parts),
                    Ok(Err(e)) => Poll::Broken(e),
                },
            };

            match poll {
                Poll::Cancelled => break,
                Poll::Idle => {}
                Poll::Message(parts) => self.process(parts, &cancel).await,
                Poll::Broken(e) => {
                    warn!(endpoint = name, error = %e, "connection lost");
                    self.set_phase(ClientPhase::Disconnected);
                    if let Some(broken) = conn.take() {
                        broken.close().await;
                    }
                }
            }
        }

        debug!(endpoint = name, "consume loop exited");
        self.set_phase(ClientPhase::Stopped);
        conn
    }

    /// Wait the fixed reconnect delay, then try once. On success, request
    /// replay from the message after the last one seen.
    async fn reconnect(&self, cancel: &CancellationToken) -> Option<Connection> {
        let name = self.endpoint.name.as_str();
        self.set_phase(ClientPhase::ReconnectWait);
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(self.settings.reconnect_delay()) => {}
        }

        self.set_phase(ClientPhase::Connecting);
        let attempt = tokio::select! {
            _ = cancel.cancelled() => return None,
            res = self.connect() => res,
        };

        let mut conn = match attempt {
            Ok(conn) => conn,
            Err(e) => {
                warn!(
                    endpoint = name,
                    error = %e,
                    retry_in_ms = self.settings.reconnect_delay_ms,
                    "reconnect failed"
                );
                self.set_phase(ClientPhase::Disconnected);
                return None;
            }
        };
        self.set_phase(ClientPhase::Connected);
        info!(endpoint = name, "reconnected");

        let from_seq = self.state.read().sequence.replay_from();
        if let Some(from_seq) = from_seq {
            self.replay(conn.as_mut(), from_seq, cancel).await;
        }
        Some(conn)
    }

    /// Send one replay request and wait for its acknowledgement. Failures are
    /// logged and counted; the next reconnect will ask again.
    async fn replay(&self, conn: &mut dyn EventConnection, from_seq: u64, cancel: &CancellationToken) {
        let name = self.endpoint.name.as_str();
        self.metrics.replay_request();

        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            res = tokio::time::timeout(self.settings.replay_timeout(), conn.request_replay(from_seq)) => res,
        };

        match result {
            Ok(Ok(ack)) => {
                info!(endpoint = name, from_seq, resp_len = ack.len(), "replay requested");
            }
            Ok(Err(e)) => {
                self.metrics.replay_failure();
                warn!(endpoint = name, from_seq, error = %e, "replay request failed");
            }
            Err(_) => {
                self.metrics.replay_failure();
                warn!(
                    endpoint = name,
                    from_seq,
                    timeout_ms = self.settings.replay_timeout_ms,
                    "replay response timed out"
                );
            }
        }
    }

    /// Handle one received message: frame check, sequence bookkeeping,
    /// decode, then per-event dispatch. Dispatch stops early once `cancel`
    /// fires; the remaining events are neither delivered nor counted.
    async fn process(&self, parts: Vec<Bytes>, cancel: &CancellationToken) {
        let name = self.endpoint.name.as_str();
        self.metrics.message_received();

        let frame = match Frame::parse(parts) {
            Ok(frame) => frame,
            Err(e) => {
                self.metrics.malformed_message();
                warn!(endpoint = name, error = %e, "dropping malformed message");
                return;
            }
        };
        let seq = frame.sequence;

        // Recorded before decoding: a batch that fails to decode still counts
        // as delivered.
        let observation = self.state.write().sequence.observe(seq);
        match observation {
            SequenceObservation::Gap { last, missed } => {
                self.metrics.gap(missed);
                warn!(endpoint = name, last, seq, missed, "sequence gap detected");
            }
            SequenceObservation::OutOfOrder { last } => {
                self.metrics.out_of_order();
                warn!(endpoint = name, last, seq, "out-of-order sequence");
            }
            SequenceObservation::First | SequenceObservation::InOrder => {}
        }

        let mut batch = match decode_batch(&frame.payload) {
            Ok(batch) => batch,
            Err(e) => {
                self.metrics.decode_failure();
                warn!(endpoint = name, seq, error = %e, "dropping undecodable batch");
                return;
            }
        };
        self.metrics.batch_decoded();
        batch.stamp_source(name);
        debug!(endpoint = name, seq, events = batch.len(), "batch decoded");

        let total = batch.len();
        for (i, event) in batch.into_iter().enumerate() {
            if cancel.is_cancelled() {
                debug!(endpoint = name, seq, skipped = total - i, "stopping mid-batch");
                break;
            }
            let kind = event.kind();
            match self.handler.handle(event).await {
                Ok(()) => self.metrics.event_dispatched(),
                Err(e) => {
                    self.metrics.handler_failure();
                    warn!(endpoint = name, seq, kind, error = %e, "event handler failed");
                }
            }
        }
    }
}
