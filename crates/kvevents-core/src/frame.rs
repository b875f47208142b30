//! Splitting a raw multipart message into `[topic, sequence, payload]`.

use bytes::Bytes;

use crate::error::MalformedMessageError;

/// Number of frames every published message carries.
pub const FRAME_COUNT: usize = 3;

/// One published message after structural validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Publisher topic. Carried through for logging only.
    pub topic: Bytes,
    /// Publisher sequence number (8-byte big-endian on the wire).
    pub sequence: u64,
    /// Encoded event batch.
    pub payload: Bytes,
}

impl Frame {
    /// Validate the frame layout. Does not look at the payload contents.
    pub fn parse(parts: Vec<Bytes>) -> Result<Self, MalformedMessageError> {
        let actual = parts.len();
        let [topic, sequence, payload]: [Bytes; FRAME_COUNT] = parts
            .try_into()
            .map_err(|_| MalformedMessageError::FrameCount {
                expected: FRAME_COUNT,
                actual,
            })?;

        let sequence = decode_sequence(&sequence)?;
        Ok(Self {
            topic,
            sequence,
            payload,
        })
    }

    /// Build the wire representation of this frame.
    pub fn into_parts(self) -> Vec<Bytes> {
        vec![
            self.topic,
            Bytes::copy_from_slice(&self.sequence.to_be_bytes()),
            self.payload,
        ]
    }
}

/// Read an 8-byte big-endian sequence number.
pub fn decode_sequence(raw: &[u8]) -> Result<u64, MalformedMessageError> {
    let bytes: [u8; 8] = raw
        .try_into()
        .map_err(|_| MalformedMessageError::SequenceLength { actual: raw.len() })?;
    Ok(u64::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(seq: &[u8]) -> Vec<Bytes> {
        vec![
            Bytes::from_static(b"kv@vllm-0"),
            Bytes::copy_from_slice(seq),
            Bytes::from_static(b"\x93"),
        ]
    }

    #[test]
    fn parses_big_endian_sequence() {
        let frame = Frame::parse(parts(&258u64.to_be_bytes())).unwrap();
        assert_eq!(frame.sequence, 258);
        assert_eq!(&frame.topic[..], b"kv@vllm-0");
    }

    #[test]
    fn rejects_short_sequence_frame() {
        let err = Frame::parse(parts(&[0u8; 7])).unwrap_err();
        assert_eq!(err, MalformedMessageError::SequenceLength { actual: 7 });
    }

    #[test]
    fn rejects_wrong_frame_count() {
        let mut two = parts(&[0u8; 8]);
        two.pop();
        assert_eq!(
            Frame::parse(two).unwrap_err(),
            MalformedMessageError::FrameCount {
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn into_parts_is_parseable() {
        let frame = Frame {
            topic: Bytes::new(),
            sequence: u64::MAX,
            payload: Bytes::from_static(b"x"),
        };
        assert_eq!(Frame::parse(frame.clone().into_parts()).unwrap(), frame);
    }
}
