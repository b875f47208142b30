//! Loopback tests: `EventPublisher` → `ZmqTransport` over real TCP sockets.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use zeromq::{RouterSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

use kvevents_core::decode_batch;
use kvevents_core::error::TransportError;
use kvevents_core::frame::Frame;
use kvevents_core::testing::{wait_until, RecordingHandler};
use kvevents_core::transport::{EventConnection, EventTransport};
use kvevents_core::types::{BlockRemoved, Endpoint, EventBatch, KvEvent};
use kvevents_stream::{ClientPhase, ClientSettings, StreamingClient};
use kvevents_zmq::{EventPublisher, ZmqTransport};

const WAIT: Duration = Duration::from_secs(5);

fn batch() -> EventBatch {
    EventBatch {
        timestamp: 1.5,
        events: vec![KvEvent::BlockRemoved(BlockRemoved {
            block_hashes: vec![42, 43],
            medium: Some("GPU".into()),
            timestamp: 1.5,
            source: String::new(),
        })],
    }
}

/// PUB drops messages until the subscription has propagated; keep publishing
/// until one arrives.
async fn receive_one(
    publisher: &mut EventPublisher,
    conn: &mut dyn EventConnection,
) -> Option<Vec<Bytes>> {
    for _ in 0..40 {
        publisher.publish(&batch()).await.unwrap();
        if let Ok(Ok(parts)) = tokio::time::timeout(Duration::from_millis(50), conn.recv()).await {
            return Some(parts);
        }
    }
    None
}

/// Same as [`receive_one`], but for a running client.
async fn publish_until(publisher: &mut EventPublisher, handler: &RecordingHandler, above: usize) -> bool {
    for _ in 0..40 {
        publisher.publish(&batch()).await.unwrap();
        if wait_until(Duration::from_millis(50), || handler.len() > above).await {
            return true;
        }
    }
    false
}

#[tokio::test]
async fn subscriber_receives_published_batches() {
    let port = 15_657;
    let mut publisher = EventPublisher::bind(&format!("tcp://127.0.0.1:{port}"), "kv")
        .await
        .unwrap()
        .starting_at(100);

    let transport = ZmqTransport::new();
    let mut conn = transport
        .connect(&Endpoint::new("loopback", "127.0.0.1", port))
        .await
        .unwrap();

    let received = receive_one(&mut publisher, conn.as_mut()).await;
    let frame = Frame::parse(received.expect("no message received")).unwrap();
    assert!(frame.sequence >= 100);
    assert_eq!(&frame.topic[..], b"kv");
    let decoded = decode_batch(&frame.payload).unwrap();
    assert_eq!(decoded, batch());

    conn.close().await;
    publisher.close().await;
}

#[tokio::test]
async fn publisher_shutdown_fails_recv() {
    let port = 15_661;
    let mut publisher = EventPublisher::bind(&format!("tcp://127.0.0.1:{port}"), "kv")
        .await
        .unwrap();
    let mut conn = ZmqTransport::new()
        .connect(&Endpoint::new("loopback", "127.0.0.1", port))
        .await
        .unwrap();
    assert!(receive_one(&mut publisher, conn.as_mut()).await.is_some());

    publisher.close().await;

    // Messages still queued may come first; the disconnect must follow them.
    let outcome = tokio::time::timeout(WAIT, async {
        loop {
            if let Err(e) = conn.recv().await {
                return e;
            }
        }
    })
    .await;
    assert!(matches!(outcome, Ok(TransportError::Closed)));

    conn.close().await;
}

#[tokio::test]
async fn client_reconnects_and_replays_after_publisher_restart() {
    let port = 15_663;
    let url = format!("tcp://127.0.0.1:{port}");

    // Replay responder on port + 1: records `from_seq`, answers "ok".
    let (replays_tx, mut replays_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut router = RouterSocket::new();
    router
        .bind(&format!("tcp://127.0.0.1:{}", port + 1))
        .await
        .unwrap();
    let responder = tokio::spawn(async move {
        while let Ok(msg) = router.recv().await {
            let frames = msg.into_vec();
            let (Some(identity), Some(request)) = (frames.first(), frames.last()) else {
                continue;
            };
            if let Ok(seq) = <[u8; 8]>::try_from(&request[..]) {
                let _ = replays_tx.send(u64::from_be_bytes(seq));
            }
            let reply = ZmqMessage::try_from(vec![identity.clone(), Bytes::from_static(b"ok")])
                .unwrap();
            if router.send(reply).await.is_err() {
                break;
            }
        }
    });

    let mut publisher = EventPublisher::bind(&url, "kv").await.unwrap();
    let handler = RecordingHandler::new();
    let client = StreamingClient::new(
        Endpoint::new("loopback", "127.0.0.1", port),
        ClientSettings {
            poll_timeout_ms: 20,
            replay_timeout_ms: 1_000,
            reconnect_delay_ms: 100,
            connect_timeout_ms: 500,
        },
        Arc::new(ZmqTransport::new()),
        Arc::new(handler.clone()),
    );
    client.start().await.unwrap();
    assert!(publish_until(&mut publisher, &handler, 0).await);
    let last = client.last_sequence().unwrap();

    publisher.close().await;
    assert!(wait_until(WAIT, || client.phase() != ClientPhase::Connected).await);

    let mut publisher = EventPublisher::bind(&url, "kv")
        .await
        .unwrap()
        .starting_at(last + 10);
    let from_seq = tokio::time::timeout(WAIT, replays_rx.recv())
        .await
        .expect("no replay request after reconnect")
        .unwrap();
    assert_eq!(from_seq, last + 1);

    let before = handler.len();
    assert!(publish_until(&mut publisher, &handler, before).await);
    let m = client.metrics();
    assert!(m.connects >= 2);
    assert_eq!(m.replay_failures, 0);

    client.stop().await;
    publisher.close().await;
    responder.abort();
}

#[tokio::test]
async fn connect_to_closed_port_fails() {
    let transport = ZmqTransport::new();
    let result = tokio::time::timeout(
        Duration::from_secs(2),
        transport.connect(&Endpoint::new("nobody", "127.0.0.1", 1)),
    )
    .await;
    // Either refused outright or still retrying when the timeout fires.
    if let Ok(inner) = result {
        assert!(inner.is_err());
    }
}
