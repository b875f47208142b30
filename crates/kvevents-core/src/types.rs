//! Domain types: endpoints, KV-cache events and decoded batches.

use serde::{Deserialize, Serialize};

// ─── Endpoint ────────────────────────────────────────────────────────────────

/// The kind of inference service publishing events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    #[default]
    Vllm,
    Mooncake,
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vllm => write!(f, "vllm"),
            Self::Mooncake => write!(f, "mooncake"),
        }
    }
}

/// A remote worker publishing KV-cache events.
///
/// `name` is the unique key used by the fleet registry and is stamped onto
/// every event decoded from this endpoint. Endpoints are built once from
/// configuration and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Unique identifier, e.g. `"vllm-worker-0"`.
    pub name: String,
    /// Host name or IP address (IPv4 or IPv6).
    pub address: String,
    /// Publisher port of the event stream.
    pub port: u16,
    /// Port of the replay (request/response) channel. Defaults to `port + 1`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replay_port: Option<u16>,
    /// Service flavour.
    #[serde(default)]
    pub kind: ServiceKind,
    /// Model served by this worker.
    #[serde(default)]
    pub model_name: String,
    /// LoRA adapter id, if the worker serves one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lora_id: Option<i64>,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port,
            replay_port: None,
            kind: ServiceKind::default(),
            model_name: String::new(),
            lora_id: None,
        }
    }

    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn with_lora_id(mut self, lora_id: i64) -> Self {
        self.lora_id = Some(lora_id);
        self
    }

    pub fn with_kind(mut self, kind: ServiceKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_replay_port(mut self, port: u16) -> Self {
        self.replay_port = Some(port);
        self
    }

    /// Port of the replay channel.
    pub fn replay_port(&self) -> u16 {
        self.replay_port.unwrap_or_else(|| self.port.saturating_add(1))
    }
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// One or more blocks were written to the KV cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockStored {
    /// Content hashes of the stored blocks, in chain order.
    pub block_hashes: Vec<u64>,
    /// Token ids covered by each block (one inner list per hash).
    pub token_ids: Vec<Vec<u32>>,
    /// Hash of the block preceding the first stored block, if any.
    pub parent_block_hash: Option<u64>,
    /// Tokens per block, when the publisher sent it.
    pub block_size: Option<usize>,
    /// LoRA id the publisher attached to the event.
    pub lora_id: Option<i64>,
    /// Storage medium (e.g. `"GPU"`), when the publisher sent it.
    pub medium: Option<String>,
    /// Batch timestamp (seconds since the epoch).
    pub timestamp: f64,
    /// Name of the endpoint the event came from. Empty until stamped.
    pub source: String,
}

/// One or more blocks were evicted from the KV cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockRemoved {
    pub block_hashes: Vec<u64>,
    pub medium: Option<String>,
    pub timestamp: f64,
    pub source: String,
}

/// A decoded KV-cache lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KvEvent {
    BlockStored(BlockStored),
    BlockRemoved(BlockRemoved),
}

impl KvEvent {
    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BlockStored(_) => "block_stored",
            Self::BlockRemoved(_) => "block_removed",
        }
    }

    pub fn block_hashes(&self) -> &[u64] {
        match self {
            Self::BlockStored(e) => &e.block_hashes,
            Self::BlockRemoved(e) => &e.block_hashes,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            Self::BlockStored(e) => &e.source,
            Self::BlockRemoved(e) => &e.source,
        }
    }

    /// Record which endpoint published this event.
    pub fn set_source(&mut self, source: &str) {
        let slot = match self {
            Self::BlockStored(e) => &mut e.source,
            Self::BlockRemoved(e) => &mut e.source,
        };
        slot.clear();
        slot.push_str(source);
    }
}

// ─── EventBatch ──────────────────────────────────────────────────────────────

/// The events carried by one published message, in publication order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventBatch {
    /// Publisher timestamp of the batch (seconds since the epoch).
    pub timestamp: f64,
    pub events: Vec<KvEvent>,
}

impl EventBatch {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Stamp every event with the publishing endpoint's name.
    pub fn stamp_source(&mut self, source: &str) {
        for event in &mut self.events {
            event.set_source(source);
        }
    }
}

impl IntoIterator for EventBatch {
    type Item = KvEvent;
    type IntoIter = std::vec::IntoIter<KvEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
