//! # kvevents-stream
//!
//! Per-endpoint streaming client for KV-cache events.
//!
//! Each [`StreamingClient`] owns one connection to one endpoint and runs a
//! single Tokio task that polls it, tracks sequence numbers, decodes batches
//! and hands events to an [`EventHandler`](kvevents_core::EventHandler).
//!
//! ## Architecture
//! ```text
//! EventTransport::connect ──► EventConnection (owned by the worker)
//!       │ recv (bounded by poll timeout)
//!       ▼
//! Frame::parse ──► SequenceTracker::observe ──► decode_batch
//!                                                   │
//!                                                   ▼
//!                                   EventHandler::handle (one event at a time)
//! ```
//!
//! Reconnects use a fixed delay with unbounded retries. The only automatic
//! replay trigger is a successful reconnect; mid-stream gaps are counted and
//! logged but never replayed.

pub mod client;
pub mod config;
pub mod error;

pub use client::{ClientPhase, StreamingClient};
pub use config::ClientSettings;
pub use error::ClientError;
