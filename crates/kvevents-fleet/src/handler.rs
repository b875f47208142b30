//! `IndexerEventHandler`: converts decoded events into indexer calls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use kvevents_core::error::{HandlerError, LifecycleError};
use kvevents_core::handler::EventHandler;
use kvevents_core::types::{BlockRemoved, BlockStored, Endpoint, KvEvent};

use crate::indexer::{token_ids_to_bytes, SyncBlockRemoved, SyncBlockStored, SyncIndexProvider};

/// One-shot stop flag plus the cancellation signal shared by a fleet and
/// every handler it creates.
#[derive(Debug, Default)]
pub struct StopGate {
    stopped: AtomicBool,
    cancel: CancellationToken,
}

impl StopGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Close the gate and cancel the token. Returns `true` only for the
    /// call that actually closed it.
    pub fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.cancel.cancel();
        true
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Delivers one endpoint's events to the indexer.
///
/// Every event is checked against the stop gate, then the indexer lookup and
/// the call itself run under a single processing deadline.
pub struct IndexerEventHandler {
    endpoint: Endpoint,
    provider: Arc<dyn SyncIndexProvider>,
    gate: Arc<StopGate>,
    deadline: Duration,
}

impl IndexerEventHandler {
    pub fn new(
        endpoint: Endpoint,
        provider: Arc<dyn SyncIndexProvider>,
        gate: Arc<StopGate>,
        deadline: Duration,
    ) -> Self {
        Self {
            endpoint,
            provider,
            gate,
            deadline,
        }
    }

    async fn dispatch(&self, event: KvEvent) -> Result<(), HandlerError> {
        let indexer = self
            .provider
            .sync_indexer()
            .await
            .map_err(|e| HandlerError::IndexerUnavailable(e.to_string()))?;

        match event {
            KvEvent::BlockStored(e) => {
                debug!(endpoint = %self.endpoint.name, blocks = e.block_hashes.len(), "block stored");
                indexer
                    .process_block_stored(self.stored(e))
                    .await
                    .map_err(|err| HandlerError::Indexer {
                        kind: "block_stored",
                        reason: err.to_string(),
                    })
            }
            KvEvent::BlockRemoved(e) => {
                debug!(endpoint = %self.endpoint.name, blocks = e.block_hashes.len(), "block removed");
                indexer
                    .process_block_removed(self.removed(e))
                    .await
                    .map_err(|err| HandlerError::Indexer {
                        kind: "block_removed",
                        reason: err.to_string(),
                    })
            }
        }
    }

    fn stored(&self, e: BlockStored) -> SyncBlockStored {
        SyncBlockStored {
            block_hashes: e.block_hashes,
            model_name: self.endpoint.model_name.clone(),
            lora_id: self.endpoint.lora_id.or(e.lora_id),
            source_pod: e.source,
            parent_block_hash: e.parent_block_hash,
            tokens: e.token_ids.iter().map(|ids| token_ids_to_bytes(ids)).collect(),
        }
    }

    fn removed(&self, e: BlockRemoved) -> SyncBlockRemoved {
        SyncBlockRemoved {
            block_hashes: e.block_hashes,
            model_name: self.endpoint.model_name.clone(),
            lora_id: self.endpoint.lora_id,
            source_pod: e.source,
        }
    }
}

#[async_trait]
impl EventHandler for IndexerEventHandler {
    async fn handle(&self, event: KvEvent) -> Result<(), HandlerError> {
        if self.gate.is_stopped() {
            return Err(LifecycleError::Stopped.into());
        }

        let ms = u64::try_from(self.deadline.as_millis()).unwrap_or(u64::MAX);
        tokio::select! {
            _ = self.gate.token().cancelled() => Err(LifecycleError::Stopped.into()),
            res = tokio::time::timeout(self.deadline, self.dispatch(event)) => match res {
                Ok(res) => res,
                Err(_) => Err(HandlerError::DeadlineExceeded { ms }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::{IndexerError, MemoryIndexer, SyncIndexer};

    fn endpoint() -> Endpoint {
        Endpoint::new("vllm-0", "10.0.0.7", 5557)
            .with_model("llama-3-8b")
            .with_lora_id(7)
    }

    fn stored_event() -> KvEvent {
        KvEvent::BlockStored(BlockStored {
            block_hashes: vec![11, 12],
            token_ids: vec![vec![1, 2], vec![3, 256]],
            parent_block_hash: Some(10),
            block_size: Some(2),
            lora_id: None,
            medium: None,
            timestamp: 0.0,
            source: "vllm-0".into(),
        })
    }

    fn handler(provider: Arc<dyn SyncIndexProvider>, gate: Arc<StopGate>) -> IndexerEventHandler {
        IndexerEventHandler::new(endpoint(), provider, gate, Duration::from_millis(50))
    }

    #[tokio::test]
    async fn converts_stored_event() {
        let indexer = MemoryIndexer::new();
        let h = handler(Arc::new(indexer.clone()), Arc::new(StopGate::new()));
        h.handle(stored_event()).await.unwrap();

        let stored = indexer.stored();
        assert_eq!(stored.len(), 1);
        let e = &stored[0];
        assert_eq!(e.block_hashes, vec![11, 12]);
        assert_eq!(e.model_name, "llama-3-8b");
        assert_eq!(e.lora_id, Some(7));
        assert_eq!(e.source_pod, "vllm-0");
        assert_eq!(e.parent_block_hash, Some(10));
        assert_eq!(e.tokens, vec![vec![0, 0, 0, 1, 0, 0, 0, 2], vec![0, 0, 0, 3, 0, 0, 1, 0]]);
    }

    #[tokio::test]
    async fn rejects_after_stop() {
        let indexer = MemoryIndexer::new();
        let gate = Arc::new(StopGate::new());
        let h = handler(Arc::new(indexer.clone()), Arc::clone(&gate));

        assert!(gate.stop());
        assert!(!gate.stop());
        let err = h.handle(stored_event()).await.unwrap_err();
        assert!(err.is_lifecycle());
        assert!(indexer.is_empty());
    }

    struct Slow;

    #[async_trait]
    impl SyncIndexer for Slow {
        async fn process_block_stored(&self, _: SyncBlockStored) -> Result<(), IndexerError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }

        async fn process_block_removed(&self, _: SyncBlockRemoved) -> Result<(), IndexerError> {
            Err(IndexerError::Rejected("unknown block".into()))
        }
    }

    #[async_trait]
    impl SyncIndexProvider for Slow {
        async fn sync_indexer(&self) -> Result<Arc<dyn SyncIndexer>, IndexerError> {
            Ok(Arc::new(Slow))
        }
    }

    #[tokio::test]
    async fn deadline_bounds_indexer_call() {
        let h = handler(Arc::new(Slow), Arc::new(StopGate::new()));
        let err = h.handle(stored_event()).await.unwrap_err();
        assert!(matches!(err, HandlerError::DeadlineExceeded { ms: 50 }));
    }

    #[tokio::test]
    async fn indexer_error_is_surfaced() {
        let h = handler(Arc::new(Slow), Arc::new(StopGate::new()));
        let removed = KvEvent::BlockRemoved(BlockRemoved {
            block_hashes: vec![1],
            medium: None,
            timestamp: 0.0,
            source: "vllm-0".into(),
        });
        let err = h.handle(removed).await.unwrap_err();
        assert!(matches!(err, HandlerError::Indexer { kind: "block_removed", .. }));
    }
}
