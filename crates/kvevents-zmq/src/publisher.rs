//! Synthetic PUB-side publisher for local testing and demos.

use bytes::Bytes;
use zeromq::{PubSocket, Socket, SocketSend, ZmqMessage};

use kvevents_core::decoder::encode_batch;
use kvevents_core::error::TransportError;
use kvevents_core::frame::Frame;
use kvevents_core::types::EventBatch;

/// Binds a PUB socket and emits numbered `[topic, seq, payload]` messages.
pub struct EventPublisher {
    socket: PubSocket,
    topic: Bytes,
    next_seq: u64,
}

impl EventPublisher {
    /// Bind to `url` (e.g. `tcp://0.0.0.0:5557`). Sequence numbers start at 0.
    pub async fn bind(url: &str, topic: impl Into<String>) -> Result<Self, TransportError> {
        let mut socket = PubSocket::new();
        socket
            .bind(url)
            .await
            .map_err(|e| TransportError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        tracing::info!(url, "publisher bound");
        Ok(Self {
            socket,
            topic: Bytes::from(topic.into()),
            next_seq: 0,
        })
    }

    /// Start numbering from `seq` instead of 0.
    pub fn starting_at(mut self, seq: u64) -> Self {
        self.next_seq = seq;
        self
    }

    /// Encode and publish one batch, returning the sequence number used.
    pub async fn publish(&mut self, batch: &EventBatch) -> Result<u64, TransportError> {
        let payload = encode_batch(batch).map_err(|e| TransportError::Socket(e.to_string()))?;
        let seq = self.next_seq;
        self.send(Frame {
            topic: self.topic.clone(),
            sequence: seq,
            payload: Bytes::from(payload),
        })
        .await?;
        self.next_seq = seq.wrapping_add(1);
        Ok(seq)
    }

    /// Publish a pre-built frame as-is.
    pub async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let msg = ZmqMessage::try_from(frame.into_parts())
            .map_err(|e| TransportError::Socket(e.to_string()))?;
        self.socket
            .send(msg)
            .await
            .map_err(|e| TransportError::Socket(e.to_string()))
    }

    pub async fn close(self) {
        let _ = self.socket.close().await;
    }
}
