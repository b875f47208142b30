//! Deterministic test doubles for the transport and handler seams.
//!
//! Enabled with the `test-utils` feature. A [`ScriptedTransport`] hands out
//! connections that replay a fixed list of [`Step`]s and then go quiet, and
//! records every connect attempt, replay request and close so tests can
//! assert on the client's state machine without opening sockets.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{HandlerError, TransportError};
use crate::handler::EventHandler;
use crate::transport::{EventConnection, EventTransport};
use crate::types::{Endpoint, KvEvent};

// ─── Scripted transport ──────────────────────────────────────────────────────

/// One thing a scripted connection does when polled.
#[derive(Debug, Clone)]
pub enum Step {
    /// Deliver these frames.
    Message(Vec<Bytes>),
    /// Fail the poll, which breaks the connection.
    Fail,
}

impl Step {
    /// A well-formed `[topic, sequence, payload]` message.
    pub fn message(seq: u64, payload: impl Into<Bytes>) -> Self {
        Self::Message(vec![
            Bytes::from_static(b"kv-events"),
            Bytes::copy_from_slice(&seq.to_be_bytes()),
            payload.into(),
        ])
    }

    /// Arbitrary frames, for malformed-message cases.
    pub fn frames(parts: Vec<Bytes>) -> Self {
        Self::Message(parts)
    }
}

#[derive(Default)]
struct Script {
    /// `None` entries refuse the connect attempt.
    connections: VecDeque<Option<Vec<Step>>>,
    refuse_when_empty: bool,
    fail_replays: bool,
    hang_replays: bool,
    connect_attempts: Vec<Instant>,
    replay_requests: Vec<u64>,
    closed: usize,
}

/// A transport driven by a queue of scripted connections.
///
/// When the queue is empty, connects succeed with an idle connection unless
/// the transport was built with [`ScriptedTransport::refusing`].
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose connects fail once the queue is exhausted.
    pub fn refusing() -> Self {
        let transport = Self::default();
        transport.script.lock().refuse_when_empty = true;
        transport
    }

    /// Queue a connection that plays `steps` in order, then idles.
    pub fn push_connection(&self, steps: Vec<Step>) -> &Self {
        self.script.lock().connections.push_back(Some(steps));
        self
    }

    /// Queue one refused connect attempt.
    pub fn push_connect_failure(&self) -> &Self {
        self.script.lock().connections.push_back(None);
        self
    }

    /// Make every replay request fail immediately.
    pub fn fail_replays(&self, fail: bool) -> &Self {
        self.script.lock().fail_replays = fail;
        self
    }

    /// Make every replay request wait forever for its acknowledgement.
    pub fn hang_replays(&self, hang: bool) -> &Self {
        self.script.lock().hang_replays = hang;
        self
    }

    pub fn connect_attempts(&self) -> Vec<Instant> {
        self.script.lock().connect_attempts.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.script.lock().connect_attempts.len()
    }

    /// `from_seq` of every replay request, in order.
    pub fn replay_requests(&self) -> Vec<u64> {
        self.script.lock().replay_requests.clone()
    }

    /// Number of connections closed through [`EventConnection::close`].
    pub fn closed_count(&self) -> usize {
        self.script.lock().closed
    }
}

#[async_trait]
impl EventTransport for ScriptedTransport {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn EventConnection>, TransportError> {
        let mut script = self.script.lock();
        script.connect_attempts.push(Instant::now());

        let next = match script.connections.pop_front() {
            Some(next) => next,
            None if script.refuse_when_empty => None,
            None => Some(Vec::new()),
        };

        match next {
            Some(steps) => Ok(Box::new(ScriptedConnection {
                steps: steps.into(),
                script: Arc::clone(&self.script),
            })),
            None => Err(TransportError::Connect {
                url: format!("scripted://{}:{}", endpoint.address, endpoint.port),
                reason: "connection refused".into(),
            }),
        }
    }
}

struct ScriptedConnection {
    steps: VecDeque<Step>,
    script: Arc<Mutex<Script>>,
}

#[async_trait]
impl EventConnection for ScriptedConnection {
    async fn recv(&mut self) -> Result<Vec<Bytes>, TransportError> {
        match self.steps.pop_front() {
            Some(Step::Message(parts)) => Ok(parts),
            Some(Step::Fail) => Err(TransportError::Socket("scripted failure".into())),
            None => std::future::pending().await,
        }
    }

    async fn request_replay(&mut self, from_seq: u64) -> Result<Bytes, TransportError> {
        let hang = {
            let mut script = self.script.lock();
            script.replay_requests.push(from_seq);
            if script.fail_replays {
                return Err(TransportError::Timeout {
                    op: "replay",
                    ms: 0,
                });
            }
            script.hang_replays
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(Bytes::from_static(b"ok"))
    }

    async fn close(self: Box<Self>) {
        self.script.lock().closed += 1;
    }
}

// ─── Recording handler ───────────────────────────────────────────────────────

/// Collects every event it is handed. Can be told to reject events carrying
/// specific block hashes.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    events: Arc<Mutex<Vec<KvEvent>>>,
    reject: Arc<Mutex<HashSet<u64>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any event whose hashes include `hash`.
    pub fn reject_hash(&self, hash: u64) -> &Self {
        self.reject.lock().insert(hash);
        self
    }

    pub fn events(&self) -> Vec<KvEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: KvEvent) -> Result<(), HandlerError> {
        let rejected = {
            let reject = self.reject.lock();
            event.block_hashes().iter().any(|h| reject.contains(h))
        };
        if rejected {
            return Err(HandlerError::Indexer {
                kind: event.kind(),
                reason: "rejected by test handler".into(),
            });
        }
        self.events.lock().push(event);
        Ok(())
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Poll `condition` every few milliseconds until it holds or `within` elapses.
pub async fn wait_until<F>(within: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
