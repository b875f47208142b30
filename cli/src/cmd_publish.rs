//! `kvevents publish`: emit synthetic batches on a PUB socket.
//!
//! Every fourth batch evicts the blocks stored by the previous one, so a
//! subscriber sees both event kinds.

use std::time::Duration;

use anyhow::{Context, Result};
use kvevents_core::{BlockRemoved, BlockStored, EventBatch, KvEvent};
use kvevents_zmq::EventPublisher;

const BLOCK_SIZE: usize = 4;
const BLOCKS_PER_BATCH: u64 = 2;

pub async fn run(bind: &str, count: u64, interval_ms: u64, topic: &str, start_seq: u64) -> Result<()> {
    let mut publisher = EventPublisher::bind(bind, topic)
        .await
        .with_context(|| format!("bind publisher on '{}'", bind))?
        .starting_at(start_seq);

    // Subscribers drop everything published before their connect completes.
    tokio::time::sleep(Duration::from_millis(200)).await;

    for i in 0..count {
        let batch = synthetic_batch(i);
        let seq = publisher.publish(&batch).await.context("publish batch")?;
        println!("seq={} events={} kind={}", seq, batch.len(), batch.events[0].kind());
        if i + 1 < count {
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
        }
    }

    publisher.close().await;
    Ok(())
}

/// Batch number `i` of the synthetic stream.
pub fn synthetic_batch(i: u64) -> EventBatch {
    let timestamp = now_secs();
    let event = if i % 4 == 3 {
        KvEvent::BlockRemoved(BlockRemoved {
            block_hashes: hashes(i - 1),
            medium: Some("GPU".into()),
            timestamp,
            source: String::new(),
        })
    } else {
        let hashes = hashes(i);
        let token_ids: Vec<Vec<u32>> = hashes
            .iter()
            .map(|h| (0..BLOCK_SIZE as u32).map(|t| (*h as u32).wrapping_mul(31).wrapping_add(t)).collect())
            .collect();
        KvEvent::BlockStored(BlockStored {
            parent_block_hash: i.checked_sub(1).map(|prev| hashes_start(prev) + BLOCKS_PER_BATCH - 1),
            block_hashes: hashes,
            token_ids,
            block_size: Some(BLOCK_SIZE),
            lora_id: None,
            medium: Some("GPU".into()),
            timestamp,
            source: String::new(),
        })
    };
    EventBatch {
        timestamp,
        events: vec![event],
    }
}

fn hashes_start(i: u64) -> u64 {
    0x1000 + i * BLOCKS_PER_BATCH
}

fn hashes(i: u64) -> Vec<u64> {
    let start = hashes_start(i);
    (start..start + BLOCKS_PER_BATCH).collect()
}

fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvevents_core::{decode_batch, encode_batch};

    #[test]
    fn stored_batches_chain_to_previous_block() {
        let (b0, b1) = (synthetic_batch(0), synthetic_batch(1));
        let KvEvent::BlockStored(first) = &b0.events[0] else {
            panic!("expected block_stored");
        };
        let KvEvent::BlockStored(second) = &b1.events[0] else {
            panic!("expected block_stored");
        };
        assert_eq!(first.parent_block_hash, None);
        assert_eq!(second.parent_block_hash, first.block_hashes.last().copied());
        assert_eq!(second.token_ids.len(), second.block_hashes.len());
    }

    #[test]
    fn every_fourth_batch_removes_previous_blocks() {
        let (stored, evicted) = (synthetic_batch(2), synthetic_batch(3));
        let KvEvent::BlockRemoved(removed) = &evicted.events[0] else {
            panic!("expected block_removed");
        };
        assert_eq!(removed.block_hashes, stored.events[0].block_hashes());
    }

    #[test]
    fn synthetic_batches_decode() {
        for i in 0..8 {
            let batch = synthetic_batch(i);
            let decoded = decode_batch(&encode_batch(&batch).unwrap()).unwrap();
            assert_eq!(decoded.events[0].block_hashes(), batch.events[0].block_hashes());
        }
    }
}
