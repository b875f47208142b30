//! kvevents-zmq: ZeroMQ transport for KV-cache event streams.
//!
//! # Features
//! - SUB socket subscribed to every topic on the publisher port
//! - DEALER socket on the replay port, connected on first replay request
//! - IPv6 endpoints (bracketed `tcp://[addr]:port` URLs)
//! - `EventPublisher`: a PUB socket emitting `[topic, seq, payload]` for local testing

pub mod publisher;
pub mod transport;

pub use publisher::EventPublisher;
pub use transport::{endpoint_url, ZmqConnection, ZmqTransport};
