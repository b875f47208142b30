//! kvevents-fleet: supervises one streaming client per configured endpoint.
//!
//! # Overview
//!
//! - [`FleetManager`] checks the indexer, starts every client concurrently
//!   (partial success allowed) and stops them all exactly once.
//! - [`Registry`] maps endpoint names to clients; concurrent subscribes for
//!   the same name produce one client.
//! - [`IndexerEventHandler`] gates events on the fleet's stop flag, bounds
//!   each one with a processing deadline and forwards it to the indexer.
//! - [`FleetConfig`] is the YAML/JSON configuration surface.

pub mod config;
pub mod error;
pub mod handler;
pub mod indexer;
pub mod manager;
pub mod registry;

pub use config::{load_file, FleetConfig};
pub use error::{ConfigError, FleetError};
pub use handler::{IndexerEventHandler, StopGate};
pub use indexer::{
    token_ids_to_bytes, IndexerError, MemoryIndexer, SyncBlockRemoved, SyncBlockStored,
    SyncIndexProvider, SyncIndexer,
};
pub use manager::{FleetManager, StartReport};
pub use registry::Registry;
