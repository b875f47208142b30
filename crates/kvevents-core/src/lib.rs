//! kvevents-core: foundation types and traits for KV-cache event ingestion.
//!
//! # Overview
//!
//! Inference workers (vLLM, Mooncake) publish KV-cache block lifecycle events
//! as three-frame messages `[topic, sequence, payload]`. This crate defines:
//!
//! - [`KvEvent`] / [`EventBatch`]: the typed domain events
//! - [`decoder`]: the fail-fast msgpack batch decoder (and its encoder)
//! - [`frame`]: splitting a raw multipart message into a [`Frame`]
//! - [`sequence`]: per-endpoint sequence bookkeeping and gap detection
//! - [`EventTransport`] / [`EventConnection`]: the transport seam
//! - [`EventHandler`]: where decoded events are delivered
//! - [`ClientMetrics`]: typed counters behind every log line that matters
//!
//! ```text
//! EventTransport ─connect→ EventConnection ─recv→ Frame
//!                                                   │
//!                            SequenceTracker ←──────┤
//!                                                   ▼
//!                                        decoder::decode_batch
//!                                                   │
//!                                                   ▼
//!                                          EventHandler::handle
//! ```

pub mod decoder;
pub mod error;
pub mod frame;
pub mod handler;
pub mod metrics;
pub mod sequence;
pub mod transport;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use decoder::{decode_batch, encode_batch};
pub use error::{
    DecodeError, EncodeError, HandlerError, LifecycleError, MalformedMessageError, TransportError,
};
pub use frame::Frame;
pub use handler::EventHandler;
pub use metrics::{ClientMetrics, MetricsSnapshot};
pub use sequence::{SequenceObservation, SequenceTracker};
pub use transport::{EventConnection, EventTransport};
pub use types::{BlockRemoved, BlockStored, Endpoint, EventBatch, KvEvent, ServiceKind};
