//! `kvevents run`: supervise the configured fleet until Ctrl-C.
//!
//! No real index is wired in here; [`LoggingIndexer`] logs every converted
//! event so the stream can be watched end to end.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use kvevents_fleet::{
    FleetManager, IndexerError, SyncBlockRemoved, SyncBlockStored, SyncIndexProvider, SyncIndexer,
};
use kvevents_observability::init_tracing;
use kvevents_zmq::ZmqTransport;

use crate::app_config::AppConfig;

pub async fn run(config_path: &Path) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    init_tracing(&config.log).map_err(|e| anyhow!("init tracing: {e}"))?;

    let endpoints = config.fleet.endpoints.len();
    let fleet = FleetManager::new(config.fleet, Arc::new(ZmqTransport::new()), Arc::new(LoggingIndexer))
        .context("build fleet")?;

    let report = fleet.start().await.context("start fleet")?;
    for (name, err) in &report.failed {
        warn!(endpoint = %name, error = %err, "endpoint not started");
    }
    if endpoints > 0 && report.succeeded.is_empty() {
        fleet.stop().await;
        bail!("no endpoint could be started");
    }
    info!(running = report.succeeded.len(), "waiting for Ctrl-C");

    tokio::signal::ctrl_c().await.context("wait for Ctrl-C")?;

    info!("shutting down");
    fleet.stop().await;
    for (name, snapshot) in fleet.metrics() {
        info!(
            endpoint = %name,
            metrics = %serde_json::to_string(&snapshot)?,
            "final counters"
        );
    }
    Ok(())
}

/// Logs every event it receives. Always reachable.
pub struct LoggingIndexer;

#[async_trait]
impl SyncIndexer for LoggingIndexer {
    async fn process_block_stored(&self, event: SyncBlockStored) -> Result<(), IndexerError> {
        info!(
            source = %event.source_pod,
            model = %event.model_name,
            lora_id = ?event.lora_id,
            blocks = event.block_hashes.len(),
            parent = ?event.parent_block_hash,
            "block stored"
        );
        Ok(())
    }

    async fn process_block_removed(&self, event: SyncBlockRemoved) -> Result<(), IndexerError> {
        info!(
            source = %event.source_pod,
            model = %event.model_name,
            blocks = event.block_hashes.len(),
            "block removed"
        );
        Ok(())
    }
}

#[async_trait]
impl SyncIndexProvider for LoggingIndexer {
    async fn sync_indexer(&self) -> Result<Arc<dyn SyncIndexer>, IndexerError> {
        Ok(Arc::new(LoggingIndexer))
    }
}
