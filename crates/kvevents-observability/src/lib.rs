//! # kvevents-observability
//!
//! Logging initialisation for kvevents processes.
//!
//! Every crate in the workspace logs through `tracing`. Binaries call
//! [`init_tracing`] once at startup; libraries never install a subscriber.
//!
//! Per-component levels use crate names, so
//! `components: { kvevents-stream: debug }` turns on per-message logs of the
//! streaming clients without flooding the rest of the output.

pub mod tracing_setup;

pub use tracing_setup::{init_tracing, LogConfig};
