//! `kvevents decode`: decode one event batch payload and print it as JSON.

use std::path::Path;

use anyhow::{bail, Context, Result};
use kvevents_core::decode_batch;

pub fn run(file: Option<&Path>, hex: Option<&str>, compact: bool) -> Result<()> {
    let payload = match (file, hex) {
        (Some(path), _) => std::fs::read(path)
            .with_context(|| format!("read payload file '{}'", path.display()))?,
        (None, Some(hex)) => parse_hex(hex)?,
        (None, None) => bail!("either --file or --hex is required"),
    };
    println!("{}", render(&payload, compact)?);
    Ok(())
}

fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let trimmed = input.trim();
    hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed)).context("invalid payload hex")
}

/// Decode `payload` and render the batch as JSON.
pub fn render(payload: &[u8], compact: bool) -> Result<String> {
    let batch = decode_batch(payload).context("decode event batch")?;
    let json = if compact {
        serde_json::to_string(&batch)?
    } else {
        serde_json::to_string_pretty(&batch)?
    };
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvevents_core::{encode_batch, BlockRemoved, EventBatch, KvEvent};

    fn payload() -> Vec<u8> {
        encode_batch(&EventBatch {
            timestamp: 12.5,
            events: vec![KvEvent::BlockRemoved(BlockRemoved {
                block_hashes: vec![9, 10],
                medium: Some("GPU".into()),
                timestamp: 12.5,
                source: String::new(),
            })],
        })
        .unwrap()
    }

    #[test]
    fn renders_batch_as_json() {
        let json: serde_json::Value =
            serde_json::from_str(&render(&payload(), true).unwrap()).unwrap();
        assert_eq!(json["timestamp"], 12.5);
        assert_eq!(json["events"][0]["type"], "block_removed");
        assert_eq!(json["events"][0]["block_hashes"], serde_json::json!([9, 10]));
    }

    #[test]
    fn accepts_prefixed_hex() {
        let hex = format!("0x{}", hex::encode(payload()));
        assert_eq!(parse_hex(&hex).unwrap(), payload());
        assert!(parse_hex("0xzz").is_err());
    }

    #[test]
    fn undecodable_payload_is_an_error() {
        let err = render(&[0x92, 0x01, 0x02], false).unwrap_err();
        assert!(format!("{err:#}").contains("decode event batch"));
    }
}
