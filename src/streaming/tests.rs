use super::*;
use crate::burst::BurstState;
use crate::config::SseConfig;
use crate::notify::fixtures::{self, SharedBuffer};
use crate::notify::{FileChannel, NotificationChannel, NotificationDispatcher, StdioChannel};
use crate::status::PipelineStatus;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn status() -> Arc<PipelineStatus> {
    Arc::new(PipelineStatus::new(
        Arc::new(BurstState::new()),
        Arc::new(AtomicUsize::new(2)),
        10,
        1.5,
    ))
}

fn local_config() -> SseConfig {
    SseConfig {
        enabled: true,
        ip: "127.0.0.1".to_string(),
        port: 0,
        subscriber_buffer: 4,
    }
}

#[tokio::test]
async fn test_stream_server_builder() {
    let server = StreamServerBuilder::new()
        .config(local_config())
        .status(status())
        .build()
        .unwrap();

    assert_eq!(server.config.ip, "127.0.0.1");
    assert_eq!(server.address(), "127.0.0.1:0");

    assert!(StreamServerBuilder::new().config(local_config()).build().is_err());
}

#[tokio::test]
async fn test_status_endpoint() {
    let server = StreamServerBuilder::new()
        .config(local_config())
        .status(status())
        .build()
        .unwrap();

    let response = server
        .router()
        .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["in_flight"], 2);
    assert_eq!(json["target_rate"], 1.5);
    assert_eq!(json["burst_active"], false);
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = StreamServerBuilder::new()
        .config(local_config())
        .status(status())
        .build()
        .unwrap();

    let response = server
        .router()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["subscribers"], 0);
}

#[tokio::test]
async fn test_broadcast_without_subscribers_is_noop() {
    let broadcaster = SseBroadcaster::new(4);
    assert_eq!(broadcaster.broadcast("{}"), 0);

    let channel = SseChannel::new(broadcaster);
    assert!(channel.deliver(&fixtures::event(1, "person")).await.is_ok());
}

#[tokio::test]
async fn test_slow_subscriber_removed_alone() {
    let broadcaster = SseBroadcaster::new(1);
    let mut lagging = broadcaster.subscribe();
    let mut reading = broadcaster.subscribe();
    assert_eq!(broadcaster.subscriber_count(), 2);

    assert_eq!(broadcaster.broadcast("one"), 2);
    assert_eq!(&*reading.recv().await.unwrap(), "one");

    assert_eq!(broadcaster.broadcast("two"), 1);
    assert_eq!(broadcaster.subscriber_count(), 1);
    assert_eq!(&*reading.recv().await.unwrap(), "two");

    assert_eq!(&*lagging.recv().await.unwrap(), "one");
    assert!(lagging.recv().await.is_none());
}

#[tokio::test]
async fn test_dropped_subscription_unregisters() {
    let broadcaster = SseBroadcaster::new(4);
    let first = broadcaster.subscribe();
    let second = broadcaster.subscribe();
    assert_ne!(first.id(), second.id());

    drop(first);
    assert_eq!(broadcaster.subscriber_count(), 1);
    assert_eq!(broadcaster.broadcast("still here"), 1);

    drop(second);
    assert_eq!(broadcaster.subscriber_count(), 0);
}

#[tokio::test]
async fn test_unwritable_file_does_not_block_stdio_or_sse() {
    let dir = tempfile::tempdir().unwrap();
    let bad_path = dir.path().join("no-such-dir").join("events.json");

    let buffer = SharedBuffer::default();
    let broadcaster = SseBroadcaster::new(4);
    let mut subscriber = broadcaster.subscribe();

    let mut dispatcher = NotificationDispatcher::builder()
        .channel(Arc::new(FileChannel::new(&bad_path, Duration::from_secs(30))))
        .channel(Arc::new(StdioChannel::with_writer(Box::new(buffer.clone()))))
        .channel(Arc::new(SseChannel::new(broadcaster.clone())))
        .build();

    let event = fixtures::event(11, "person");
    assert_eq!(dispatcher.dispatch(event.clone()), 3);

    let payload = tokio::time::timeout(Duration::from_secs(2), subscriber.recv())
        .await
        .unwrap()
        .unwrap();
    let received: crate::notify::NotificationEvent = serde_json::from_str(&payload).unwrap();
    assert_eq!(received.event_id, event.event_id);

    dispatcher.shutdown(Duration::from_secs(2)).await;

    assert!(buffer.contents().contains("NEW OBJECT: person"));

    let stats = dispatcher.stats();
    assert_eq!(stats[0].name, "file");
    assert!(stats[0].degraded);
    assert_eq!(stats[1].delivered, 1);
    assert_eq!(stats[2].delivered, 1);
}

#[tokio::test]
async fn test_sse_over_tcp() {
    let shutdown = CancellationToken::new();
    let broadcaster = SseBroadcaster::new(4);
    let server = StreamServerBuilder::new()
        .config(local_config())
        .broadcaster(broadcaster.clone())
        .status(status())
        .shutdown(shutdown.clone())
        .build()
        .unwrap();

    let (addr, task) = server.start().await.unwrap();

    let mut socket = tokio::net::TcpStream::connect(addr).await.unwrap();
    socket
        .write_all(b"GET /events HTTP/1.1\r\nHost: localhost\r\nAccept: text/event-stream\r\n\r\n")
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while broadcaster.subscriber_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let event = fixtures::event(3, "cat");
    SseChannel::new(broadcaster.clone())
        .deliver(&event)
        .await
        .unwrap();

    let mut received = String::new();
    let mut chunk = [0u8; 4096];
    tokio::time::timeout(Duration::from_secs(2), async {
        while !received.contains(&event.event_id.to_string()) {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed early");
            received.push_str(&String::from_utf8_lossy(&chunk[..n]));
        }
    })
    .await
    .unwrap();

    assert!(received.contains("text/event-stream"));
    assert!(received.contains("data: {"));

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
}
