//! Error types for the event ingestion pipeline.

use thiserror::Error;

/// Errors raised by a transport while connecting, polling or exchanging
/// replay frames. Always non-fatal: they drive the reconnect state.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket creation, connect or subscribe failed.
    #[error("connect to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    /// Send or receive failed on an established connection.
    #[error("socket error: {0}")]
    Socket(String),

    /// A bounded operation did not finish in time.
    #[error("{op} timed out after {ms}ms")]
    Timeout { op: &'static str, ms: u64 },

    /// The peer or the local side closed the connection.
    #[error("connection closed")]
    Closed,
}

impl TransportError {
    /// Returns `true` if the operation may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Timeout { .. } | Self::Closed)
    }
}

/// A received message does not have the `[topic, sequence, payload]` shape.
/// The message is dropped; no state changes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedMessageError {
    #[error("expected {expected} frames, got {actual}")]
    FrameCount { expected: usize, actual: usize },

    #[error("sequence frame must be 8 bytes, got {actual}")]
    SequenceLength { actual: usize },
}

/// Errors that can occur while decoding one payload into an [`EventBatch`].
///
/// Decoding is all-or-nothing: any of these fails the whole batch.
///
/// [`EventBatch`]: crate::types::EventBatch
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("msgpack decode failed: {0}")]
    Msgpack(#[from] rmp_serde::decode::Error),

    #[error("expected {expected}-element batch, got {actual}")]
    Arity { expected: usize, actual: usize },

    #[error("batch carries no events")]
    EmptyEvents,

    #[error("unknown event type '{tag}' at index {index}")]
    UnknownEventType { index: usize, tag: String },

    #[error("event at index {index} is missing {field}")]
    MissingField { index: usize, field: &'static str },

    #[error("event at index {index}: {reason}")]
    TokenLayout { index: usize, reason: String },
}

impl DecodeError {
    /// Returns `true` if the batch was rejected for an unrecognised type tag.
    pub fn is_unknown_event_type(&self) -> bool {
        matches!(self, Self::UnknownEventType { .. })
    }
}

/// Errors from [`encode_batch`](crate::decoder::encode_batch).
#[derive(Debug, Error)]
#[error("msgpack encode failed: {0}")]
pub struct EncodeError(#[from] pub rmp_serde::encode::Error);

/// An operation was attempted in the wrong lifecycle phase.
/// Returned synchronously, never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("already stopped")]
    Stopped,

    #[error("already started")]
    AlreadyStarted,
}

/// Errors from delivering one event downstream.
/// Logged per event; never aborts the batch or the consume loop.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("processing exceeded {ms}ms deadline")]
    DeadlineExceeded { ms: u64 },

    #[error("indexer unavailable: {0}")]
    IndexerUnavailable(String),

    #[error("indexer rejected {kind}: {reason}")]
    Indexer { kind: &'static str, reason: String },
}

impl HandlerError {
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::Lifecycle(_))
    }
}
