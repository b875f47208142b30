//! MessagePack event batch decoder.
//!
//! A payload is a 3-element array `[timestamp, events, status]`. Each entry of
//! `events` is itself an array whose first element is the type tag:
//!
//! ```text
//! ["block_stored",  block_hashes, parent_hash|nil, token_ids, block_size?, lora_id?, medium?, ...]
//! ["block_removed", block_hashes, medium?, ...]
//! ```
//!
//! Decoding is all-or-nothing. A wrong arity, an empty `events` array, an
//! unknown tag or an inconsistent token layout rejects the whole batch; no
//! partial [`EventBatch`] is ever returned. Trailing positions inside an event
//! tuple are skipped so newer publishers can append fields.
//!
//! The decoder is pure: it never touches client state and never logs.

use std::fmt;

use serde::de::{self, Deserialize, Deserializer, IgnoredAny, SeqAccess, Visitor};
use serde::Serialize;

use crate::error::{DecodeError, EncodeError};
use crate::types::{BlockRemoved, BlockStored, EventBatch, KvEvent};

/// Number of top-level elements in a payload.
pub const BATCH_ARITY: usize = 3;

const STORED_TAGS: [&str; 2] = ["block_stored", "BlockStored"];
const REMOVED_TAGS: [&str; 2] = ["block_removed", "BlockRemoved"];

// ─── Public API ──────────────────────────────────────────────────────────────

/// Decode one payload into an ordered batch of events.
///
/// The batch timestamp is copied onto every event; `source` is left empty for
/// the caller to stamp.
pub fn decode_batch(payload: &[u8]) -> Result<EventBatch, DecodeError> {
    let raw: RawBatch = rmp_serde::from_slice(payload)?;

    let (timestamp, wire_events) = match raw {
        RawBatch {
            arity: BATCH_ARITY,
            timestamp: Some(ts),
            events: Some(events),
        } => (ts, events),
        RawBatch { arity, .. } => {
            return Err(DecodeError::Arity {
                expected: BATCH_ARITY,
                actual: arity,
            })
        }
    };

    if wire_events.is_empty() {
        return Err(DecodeError::EmptyEvents);
    }

    let events = wire_events
        .into_iter()
        .enumerate()
        .map(|(index, wire)| wire.into_event(index, timestamp))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(EventBatch { timestamp, events })
}

/// Encode a batch in the layout [`decode_batch`] accepts.
///
/// Token ids are written as per-block lists and `status` as nil. Used by the
/// synthetic publisher and by tests.
pub fn encode_batch(batch: &EventBatch) -> Result<Vec<u8>, EncodeError> {
    let events: Vec<EncodedEvent<'_>> = batch.events.iter().map(EncodedEvent::from).collect();
    Ok(rmp_serde::to_vec(&(batch.timestamp, events, Option::<u32>::None))?)
}

// ─── Wire representation ─────────────────────────────────────────────────────

/// Top-level array as read off the wire, before any validation.
struct RawBatch {
    arity: usize,
    timestamp: Option<f64>,
    events: Option<Vec<WireEvent>>,
}

impl<'de> Deserialize<'de> for RawBatch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(RawBatchVisitor)
    }
}

struct RawBatchVisitor;

impl<'de> Visitor<'de> for RawBatchVisitor {
    type Value = RawBatch;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a [timestamp, events, status] array")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<RawBatch, A::Error> {
        // With a known wrong length, skip element typing so the caller sees
        // an arity error rather than a type error from a shifted position.
        if let Some(len) = seq.size_hint() {
            if len != BATCH_ARITY {
                let arity = drain(&mut seq, 0)?;
                return Ok(RawBatch {
                    arity,
                    timestamp: None,
                    events: None,
                });
            }
        }

        let mut arity = 0;
        let timestamp = seq.next_element::<f64>()?;
        arity += usize::from(timestamp.is_some());
        let events = match timestamp {
            Some(_) => seq.next_element::<Vec<WireEvent>>()?,
            None => None,
        };
        arity += usize::from(events.is_some());
        if events.is_some() && seq.next_element::<IgnoredAny>()?.is_some() {
            arity += 1;
        }
        let arity = drain(&mut seq, arity)?;

        Ok(RawBatch {
            arity,
            timestamp,
            events,
        })
    }
}

/// Skip the remaining elements of `seq`, returning the total element count.
fn drain<'de, A: SeqAccess<'de>>(seq: &mut A, mut seen: usize) -> Result<usize, A::Error> {
    while seq.next_element::<IgnoredAny>()?.is_some() {
        seen += 1;
    }
    Ok(seen)
}

/// One entry of the `events` array, classified by tag but not yet validated.
enum WireEvent {
    Stored(WireStored),
    Removed {
        block_hashes: Vec<u64>,
        medium: Option<String>,
    },
    Unknown(String),
    Incomplete {
        field: &'static str,
    },
}

struct WireStored {
    block_hashes: Vec<u64>,
    parent_block_hash: Option<u64>,
    token_ids: TokenIds,
    block_size: Option<usize>,
    lora_id: Option<i64>,
    medium: Option<String>,
}

/// Token ids arrive either grouped per block or as one flat list.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum TokenIds {
    PerBlock(Vec<Vec<u32>>),
    Flat(Vec<u32>),
}

impl<'de> Deserialize<'de> for WireEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(WireEventVisitor)
    }
}

struct WireEventVisitor;

impl<'de> Visitor<'de> for WireEventVisitor {
    type Value = WireEvent;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an event tuple starting with a type tag")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<WireEvent, A::Error> {
        let Some(tag) = seq.next_element::<String>()? else {
            return Ok(WireEvent::Incomplete { field: "type tag" });
        };

        if STORED_TAGS.contains(&tag.as_str()) {
            let Some(block_hashes) = seq.next_element::<Vec<BlockHash>>()? else {
                return Ok(WireEvent::Incomplete {
                    field: "block_hashes",
                });
            };
            let Some(parent) = seq.next_element::<Option<BlockHash>>()? else {
                return Ok(WireEvent::Incomplete {
                    field: "parent_block_hash",
                });
            };
            let Some(token_ids) = seq.next_element::<TokenIds>()? else {
                return Ok(WireEvent::Incomplete { field: "token_ids" });
            };
            let block_size = seq.next_element::<Option<usize>>()?.flatten();
            let lora_id = seq.next_element::<Option<i64>>()?.flatten();
            let medium = seq.next_element::<Option<String>>()?.flatten();
            drain(&mut seq, 0)?;

            Ok(WireEvent::Stored(WireStored {
                block_hashes: block_hashes.into_iter().map(|h| h.0).collect(),
                parent_block_hash: parent.map(|h| h.0),
                token_ids,
                block_size,
                lora_id,
                medium,
            }))
        } else if REMOVED_TAGS.contains(&tag.as_str()) {
            let Some(block_hashes) = seq.next_element::<Vec<BlockHash>>()? else {
                return Ok(WireEvent::Incomplete {
                    field: "block_hashes",
                });
            };
            let medium = seq.next_element::<Option<String>>()?.flatten();
            drain(&mut seq, 0)?;

            Ok(WireEvent::Removed {
                block_hashes: block_hashes.into_iter().map(|h| h.0).collect(),
                medium,
            })
        } else {
            drain(&mut seq, 0)?;
            Ok(WireEvent::Unknown(tag))
        }
    }
}

/// A block hash encoded as either a signed or an unsigned integer.
///
/// Publishers hash with 64-bit arithmetic and may emit the value signed; the
/// two's complement bit pattern is kept so both encodings compare equal.
struct BlockHash(u64);

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HashVisitor;

        impl<'de> Visitor<'de> for HashVisitor {
            type Value = BlockHash;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a 64-bit integer block hash")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<BlockHash, E> {
                Ok(BlockHash(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<BlockHash, E> {
                Ok(BlockHash(v as u64))
            }
        }

        deserializer.deserialize_any(HashVisitor)
    }
}

impl WireEvent {
    fn into_event(self, index: usize, timestamp: f64) -> Result<KvEvent, DecodeError> {
        match self {
            Self::Stored(stored) => {
                let token_ids = split_tokens(index, &stored)?;
                Ok(KvEvent::BlockStored(BlockStored {
                    block_hashes: stored.block_hashes,
                    token_ids,
                    parent_block_hash: stored.parent_block_hash,
                    block_size: stored.block_size,
                    lora_id: stored.lora_id,
                    medium: stored.medium,
                    timestamp,
                    source: String::new(),
                }))
            }
            Self::Removed {
                block_hashes,
                medium,
            } => Ok(KvEvent::BlockRemoved(BlockRemoved {
                block_hashes,
                medium,
                timestamp,
                source: String::new(),
            })),
            Self::Unknown(tag) => Err(DecodeError::UnknownEventType { index, tag }),
            Self::Incomplete { field } => Err(DecodeError::MissingField { index, field }),
        }
    }
}

/// Normalise token ids to one list per block hash.
fn split_tokens(index: usize, stored: &WireStored) -> Result<Vec<Vec<u32>>, DecodeError> {
    let blocks = stored.block_hashes.len();
    let layout = |reason: String| DecodeError::TokenLayout { index, reason };

    match &stored.token_ids {
        TokenIds::PerBlock(per_block) => {
            if per_block.len() != blocks {
                return Err(layout(format!(
                    "{} token lists for {blocks} block hashes",
                    per_block.len()
                )));
            }
            Ok(per_block.clone())
        }
        TokenIds::Flat(flat) => {
            let size = match stored.block_size {
                Some(size) if size > 0 => size,
                Some(_) => return Err(layout("block_size is zero".into())),
                None => return Err(layout("flat token_ids without block_size".into())),
            };
            let expected = size.checked_mul(blocks);
            if expected != Some(flat.len()) {
                return Err(layout(format!(
                    "{} tokens do not fill {blocks} blocks of {size}",
                    flat.len()
                )));
            }
            Ok(flat.chunks(size).map(<[u32]>::to_vec).collect())
        }
    }
}

// ─── Encoding ────────────────────────────────────────────────────────────────

type StoredTuple<'a> = (
    &'static str,
    &'a [u64],
    Option<u64>,
    &'a [Vec<u32>],
    Option<usize>,
    Option<i64>,
    Option<&'a str>,
);

#[derive(Serialize)]
#[serde(untagged)]
enum EncodedEvent<'a> {
    Stored(StoredTuple<'a>),
    Removed((&'static str, &'a [u64], Option<&'a str>)),
}

impl<'a> From<&'a KvEvent> for EncodedEvent<'a> {
    fn from(event: &'a KvEvent) -> Self {
        match event {
            KvEvent::BlockStored(e) => Self::Stored((
                STORED_TAGS[0],
                &e.block_hashes,
                e.parent_block_hash,
                &e.token_ids,
                e.block_size,
                e.lora_id,
                e.medium.as_deref(),
            )),
            KvEvent::BlockRemoved(e) => Self::Removed((
                REMOVED_TAGS[0],
                &e.block_hashes,
                e.medium.as_deref(),
            )),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
