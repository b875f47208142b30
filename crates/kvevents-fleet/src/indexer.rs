//! Boundary to the downstream synchronized index.
//!
//! The index itself lives outside this workspace. The fleet only needs a
//! provider that hands out an indexer and the two operations below.
//! [`MemoryIndexer`] is an in-process implementation for tests and dry runs.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

/// Errors reported by an indexer or its provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexerError {
    #[error("indexer unavailable: {0}")]
    Unavailable(String),

    #[error("indexer rejected event: {0}")]
    Rejected(String),
}

/// Blocks written to a worker's KV cache, in the form the index stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncBlockStored {
    pub block_hashes: Vec<u64>,
    pub model_name: String,
    pub lora_id: Option<i64>,
    /// Endpoint that published the event.
    pub source_pod: String,
    pub parent_block_hash: Option<u64>,
    /// Token ids of each block, 4 bytes big-endian per token.
    pub tokens: Vec<Vec<u8>>,
}

/// Blocks evicted from a worker's KV cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncBlockRemoved {
    pub block_hashes: Vec<u64>,
    pub model_name: String,
    pub lora_id: Option<i64>,
    pub source_pod: String,
}

#[async_trait]
pub trait SyncIndexer: Send + Sync {
    async fn process_block_stored(&self, event: SyncBlockStored) -> Result<(), IndexerError>;
    async fn process_block_removed(&self, event: SyncBlockRemoved) -> Result<(), IndexerError>;
}

/// Hands out the current indexer. Called once at fleet start as a
/// reachability check and again for every event.
#[async_trait]
pub trait SyncIndexProvider: Send + Sync {
    async fn sync_indexer(&self) -> Result<Arc<dyn SyncIndexer>, IndexerError>;
}

/// Encode token ids as consecutive 4-byte big-endian words.
pub fn token_ids_to_bytes(ids: &[u32]) -> Vec<u8> {
    ids.iter().flat_map(|id| id.to_be_bytes()).collect()
}

// ─── MemoryIndexer ───────────────────────────────────────────────────────────

/// Records every event it receives. Acts as its own provider.
#[derive(Debug, Clone, Default)]
pub struct MemoryIndexer {
    stored: Arc<Mutex<Vec<SyncBlockStored>>>,
    removed: Arc<Mutex<Vec<SyncBlockRemoved>>>,
}

impl MemoryIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(&self) -> Vec<SyncBlockStored> {
        self.stored.lock().clone()
    }

    pub fn removed(&self) -> Vec<SyncBlockRemoved> {
        self.removed.lock().clone()
    }

    /// Total events received.
    pub fn len(&self) -> usize {
        self.stored.lock().len() + self.removed.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SyncIndexer for MemoryIndexer {
    async fn process_block_stored(&self, event: SyncBlockStored) -> Result<(), IndexerError> {
        self.stored.lock().push(event);
        Ok(())
    }

    async fn process_block_removed(&self, event: SyncBlockRemoved) -> Result<(), IndexerError> {
        self.removed.lock().push(event);
        Ok(())
    }
}

#[async_trait]
impl SyncIndexProvider for MemoryIndexer {
    async fn sync_indexer(&self) -> Result<Arc<dyn SyncIndexer>, IndexerError> {
        Ok(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_big_endian_words() {
        assert_eq!(
            token_ids_to_bytes(&[1, 0x0102_0304]),
            vec![0, 0, 0, 1, 1, 2, 3, 4]
        );
        assert!(token_ids_to_bytes(&[]).is_empty());
    }
}
