//! `FleetManager`: one streaming client per configured endpoint.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use kvevents_core::error::LifecycleError;
use kvevents_core::metrics::MetricsSnapshot;
use kvevents_core::transport::EventTransport;
use kvevents_core::types::Endpoint;
use kvevents_stream::StreamingClient;

use crate::config::FleetConfig;
use crate::error::FleetError;
use crate::handler::{IndexerEventHandler, StopGate};
use crate::indexer::SyncIndexProvider;
use crate::registry::Registry;

/// Outcome of [`FleetManager::start`].
#[derive(Debug, Default)]
pub struct StartReport {
    /// Endpoints with a running client.
    pub succeeded: Vec<String>,
    /// Endpoints whose client could not be started, with the reason.
    pub failed: Vec<(String, FleetError)>,
}

impl StartReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Supervises the streaming clients of a fixed set of endpoints.
///
/// # Usage
/// ```no_run
/// # async fn example() -> Result<(), kvevents_fleet::FleetError> {
/// use std::sync::Arc;
/// use kvevents_core::Endpoint;
/// use kvevents_fleet::{FleetConfig, FleetManager, MemoryIndexer};
/// use kvevents_zmq::ZmqTransport;
///
/// let config = FleetConfig::new(vec![Endpoint::new("vllm-0", "10.0.0.7", 5557)]);
/// let fleet = FleetManager::new(config, Arc::new(ZmqTransport::new()), Arc::new(MemoryIndexer::new()))?;
/// let report = fleet.start().await?;
/// println!("{} running, {} failed", report.succeeded.len(), report.failed.len());
/// fleet.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct FleetManager {
    config: FleetConfig,
    transport: Arc<dyn EventTransport>,
    provider: Arc<dyn SyncIndexProvider>,
    registry: Registry,
    gate: Arc<StopGate>,
}

impl FleetManager {
    /// Validate `config` and build an idle manager. Nothing connects until
    /// [`start`](Self::start).
    pub fn new(
        config: FleetConfig,
        transport: Arc<dyn EventTransport>,
        provider: Arc<dyn SyncIndexProvider>,
    ) -> Result<Self, FleetError> {
        config.validate()?;
        Ok(Self {
            config,
            transport,
            provider,
            registry: Registry::new(),
            gate: Arc::new(StopGate::new()),
        })
    }

    /// Check the indexer, then subscribe to every endpoint concurrently.
    ///
    /// An unreachable indexer fails the whole call before any client is
    /// created. Individual endpoint failures are collected in the report.
    pub async fn start(&self) -> Result<StartReport, FleetError> {
        if self.gate.is_stopped() {
            return Err(LifecycleError::Stopped.into());
        }

        let ms = self.config.indexer_timeout_ms;
        match tokio::time::timeout(self.config.indexer_timeout(), self.provider.sync_indexer()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                error!(error = %e, "indexer unavailable, fleet not started");
                return Err(FleetError::IndexerUnavailable(e));
            }
            Err(_) => {
                error!(timeout_ms = ms, "indexer timed out, fleet not started");
                return Err(FleetError::IndexerTimeout { ms });
            }
        }

        let attempts = self.config.endpoints.iter().map(|ep| async move {
            let result = self.subscribe_to_service(ep.clone()).await;
            (ep.name.clone(), result)
        });

        let mut report = StartReport::default();
        for (name, result) in join_all(attempts).await {
            match result {
                Ok(()) => report.succeeded.push(name),
                Err(e) => {
                    warn!(endpoint = %name, error = %e, "endpoint failed to start");
                    report.failed.push((name, e));
                }
            }
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "fleet started"
        );
        Ok(report)
    }

    /// Start a client for `endpoint` unless one is already registered.
    pub async fn subscribe_to_service(&self, endpoint: Endpoint) -> Result<(), FleetError> {
        if self.gate.is_stopped() {
            return Err(LifecycleError::Stopped.into());
        }
        if self.registry.contains(&endpoint.name) {
            debug!(endpoint = %endpoint.name, "already subscribed");
            return Ok(());
        }

        let guard = self.registry.guard(&endpoint.name);
        let _held = guard.lock().await;
        if self.registry.contains(&endpoint.name) {
            debug!(endpoint = %endpoint.name, "already subscribed");
            return Ok(());
        }

        let name = endpoint.name.clone();
        let handler = IndexerEventHandler::new(
            endpoint.clone(),
            Arc::clone(&self.provider),
            Arc::clone(&self.gate),
            self.config.handler_deadline(),
        );
        let client = StreamingClient::new(
            endpoint,
            self.config.client.clone(),
            Arc::clone(&self.transport),
            Arc::new(handler),
        )
        .with_cancellation(self.gate.token());

        client.start().await.map_err(|source| FleetError::Subscribe {
            endpoint: name.clone(),
            source,
        })?;

        let client = Arc::new(client);
        self.registry.insert(Arc::clone(&client));

        // stop() may have run while we were connecting and missed this client
        if self.gate.is_stopped() {
            client.stop().await;
            self.registry.remove(&name);
            return Err(LifecycleError::Stopped.into());
        }

        info!(endpoint = %name, "subscribed");
        Ok(())
    }

    /// Stop every client. Only the first call does anything; later calls
    /// return immediately.
    pub async fn stop(&self) {
        if !self.gate.stop() {
            return;
        }
        let clients = self.registry.clients();
        info!(clients = clients.len(), "stopping fleet");
        join_all(clients.iter().map(|client| client.stop())).await;
        info!("fleet stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.gate.is_stopped()
    }

    /// Names of registered endpoints, sorted.
    pub fn subscriptions(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn client(&self, name: &str) -> Option<Arc<StreamingClient>> {
        self.registry.get(name)
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    /// Counters of every registered client, keyed by endpoint name.
    pub fn metrics(&self) -> BTreeMap<String, MetricsSnapshot> {
        self.registry
            .clients()
            .into_iter()
            .map(|c| (c.name().to_string(), c.metrics()))
            .collect()
    }
}
