//! `ZmqTransport`: SUB + DEALER connection per endpoint.
//!
//! A SUB socket never fails a `recv` when its publisher goes away, and it does
//! not follow a restarted publisher. Each connection therefore watches the
//! socket's monitor stream and reports a peer disconnect as
//! [`TransportError::Closed`], so the client reconnects and asks for replay.

use std::net::IpAddr;

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::StreamExt;
use zeromq::{
    DealerSocket, Socket, SocketEvent, SocketRecv, SocketSend, SubSocket, ZmqMessage,
};

use kvevents_core::error::TransportError;
use kvevents_core::transport::{EventConnection, EventTransport};
use kvevents_core::types::Endpoint;

/// Build a `tcp://` URL, bracketing IPv6 literals.
pub fn endpoint_url(address: &str, port: u16) -> String {
    match address.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => format!("tcp://[{v6}]:{port}"),
        _ => format!("tcp://{address}:{port}"),
    }
}

/// Opens ZeroMQ connections. Stateless; one instance serves a whole fleet.
#[derive(Debug, Clone, Default)]
pub struct ZmqTransport {
    topic: String,
}

impl ZmqTransport {
    /// Subscribe to every topic.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to topics starting with `topic` only.
    pub fn with_topic(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl EventTransport for ZmqTransport {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn EventConnection>, TransportError> {
        let url = endpoint_url(&endpoint.address, endpoint.port);
        let connect_err = |e: zeromq::ZmqError| TransportError::Connect {
            url: url.clone(),
            reason: e.to_string(),
        };

        let mut sub = SubSocket::new();
        let monitor = sub.monitor();
        sub.subscribe(&self.topic).await.map_err(connect_err)?;
        sub.connect(&url).await.map_err(connect_err)?;

        tracing::debug!(endpoint = %endpoint.name, url = %url, "SUB socket connected");

        Ok(Box::new(ZmqConnection {
            sub,
            monitor,
            replay: None,
            replay_url: endpoint_url(&endpoint.address, endpoint.replay_port()),
        }))
    }
}

/// One live connection: the event subscription plus the replay channel.
pub struct ZmqConnection {
    sub: SubSocket,
    /// Lifecycle events of `sub`; a `Disconnected` means the publisher is gone.
    monitor: mpsc::Receiver<SocketEvent>,
    replay: Option<DealerSocket>,
    replay_url: String,
}

impl ZmqConnection {
    async fn replay_socket(&mut self) -> Result<&mut DealerSocket, TransportError> {
        if self.replay.is_none() {
            let mut dealer = DealerSocket::new();
            dealer
                .connect(&self.replay_url)
                .await
                .map_err(|e| TransportError::Connect {
                    url: self.replay_url.clone(),
                    reason: e.to_string(),
                })?;
            self.replay = Some(dealer);
        }
        self.replay.as_mut().ok_or(TransportError::Closed)
    }
}

#[async_trait]
impl EventConnection for ZmqConnection {
    async fn recv(&mut self) -> Result<Vec<Bytes>, TransportError> {
        loop {
            tokio::select! {
                msg = self.sub.recv() => {
                    let msg = msg.map_err(|e| TransportError::Socket(e.to_string()))?;
                    return Ok(msg.into_vec());
                }
                event = self.monitor.next() => match event {
                    Some(SocketEvent::Disconnected(_)) | Some(SocketEvent::Closed) | None => {
                        tracing::debug!(replay_url = %self.replay_url, "publisher disconnected");
                        return Err(TransportError::Closed);
                    }
                    Some(_) => {}
                },
            }
        }
    }

    async fn request_replay(&mut self, from_seq: u64) -> Result<Bytes, TransportError> {
        let socket = self.replay_socket().await?;
        let request = ZmqMessage::from(from_seq.to_be_bytes().to_vec());
        socket
            .send(request)
            .await
            .map_err(|e| TransportError::Socket(e.to_string()))?;

        let response = socket
            .recv()
            .await
            .map_err(|e| TransportError::Socket(e.to_string()))?;
        let mut ack = Vec::new();
        for frame in response.into_vec() {
            ack.extend_from_slice(&frame);
        }
        Ok(Bytes::from(ack))
    }

    async fn close(self: Box<Self>) {
        let this = *self;
        let _ = this.sub.close().await;
        if let Some(replay) = this.replay {
            let _ = replay.close().await;
        }
        tracing::debug!(replay_url = %this.replay_url, "connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_and_hostnames_are_not_bracketed() {
        assert_eq!(endpoint_url("10.0.0.7", 5557), "tcp://10.0.0.7:5557");
        assert_eq!(endpoint_url("vllm-0.svc", 5557), "tcp://vllm-0.svc:5557");
    }

    #[test]
    fn ipv6_is_bracketed() {
        assert_eq!(endpoint_url("::1", 5557), "tcp://[::1]:5557");
        assert_eq!(endpoint_url("fd00::7", 1), "tcp://[fd00::7]:1");
    }
}
