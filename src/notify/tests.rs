use super::fixtures::{self, RecordingChannel, SharedBuffer};
use super::*;
use crate::config::NotificationConfig;
use crate::detection::{BoundingBox, Detection};
use crate::error::ChannelError;
use crate::frame::{Frame, FrameFormat};
use std::time::Duration;

#[test]
fn test_event_payload_shape() {
    let event = fixtures::event(7, "person");
    let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();

    assert_eq!(json["event"], "new_object_detected");
    assert_eq!(json["frame_seq"], 7);
    assert_eq!(json["object"]["type"], "person");
    assert_eq!(json["object"]["x"], 120.0);
    assert_eq!(json["object"]["y"], 90.0);
    assert_eq!(json["object"]["instance_id"], 7);
    assert_eq!(json["all_detections"][0]["class"], "person");
    assert_eq!(json["system_status"]["burst_active"], true);
    assert!(json["event_id"].is_string());
    assert!(json.get("image_base64").is_none());
}

#[test]
fn test_event_requires_new_detection() {
    let frame = Frame::new(1, vec![1, 2, 3], 2, 2, FrameFormat::Mjpeg);
    let known = vec![Detection::new("car", 0.8, BoundingBox::default())];

    assert!(NotificationEvent::from_frame(&frame, &known, fixtures::snapshot(), false).is_none());
    assert!(NotificationEvent::from_frame(&frame, &[], fixtures::snapshot(), false).is_none());
}

#[test]
fn test_event_picks_most_confident_new_detection() {
    let frame = Frame::new(3, vec![0xFF, 0xD8, 0xFF, 0xD9], 2, 2, FrameFormat::Mjpeg);
    let detections = vec![
        Detection::new("car", 0.99, BoundingBox::default()),
        Detection::new("cat", 0.55, BoundingBox::default()).new_instance(),
        Detection::new("dog", 0.75, BoundingBox::default()).new_instance(),
    ];

    let event =
        NotificationEvent::from_frame(&frame, &detections, fixtures::snapshot(), true).unwrap();

    assert_eq!(event.object.label, "dog");
    assert_eq!(event.all_detections.len(), 3);
    assert_eq!(event.image_base64.as_deref(), Some("/9j/2Q=="));
}

#[test]
fn test_image_skipped_for_raw_frames() {
    let frame = Frame::new(3, vec![0u8; 12], 2, 2, FrameFormat::Rgb24);
    let detections = vec![Detection::new("dog", 0.75, BoundingBox::default()).new_instance()];

    let event =
        NotificationEvent::from_frame(&frame, &detections, fixtures::snapshot(), true).unwrap();
    assert!(event.image_base64.is_none());
}

#[tokio::test]
async fn test_stdio_prints_one_line() {
    let buffer = SharedBuffer::default();
    let channel = StdioChannel::with_writer(Box::new(buffer.clone()));

    channel.deliver(&fixtures::event(1, "person")).await.unwrap();
    channel.deliver(&fixtures::event(2, "bicycle")).await.unwrap();

    let output = buffer.contents();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("NEW OBJECT: person"));
    assert!(lines[1].contains("NEW OBJECT: bicycle"));
    assert!(lines[1].contains("burst on"));
}

#[tokio::test]
async fn test_file_channel_appends_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notifications.json");
    let channel = FileChannel::new(&path, Duration::from_secs(30));

    channel.deliver(&fixtures::event(1, "person")).await.unwrap();
    channel.deliver(&fixtures::event(2, "car")).await.unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let events: Vec<NotificationEvent> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].frame_seq, 1);
    assert_eq!(events[1].object.label, "car");
}

#[tokio::test]
async fn test_file_channel_degrades_then_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("notifications.json");

    let patient = FileChannel::new(&path, Duration::from_secs(30));
    assert!(matches!(
        patient.deliver(&fixtures::event(1, "person")).await,
        Err(ChannelError::Io { .. })
    ));
    assert!(matches!(
        patient.deliver(&fixtures::event(2, "person")).await,
        Err(ChannelError::Degraded { .. })
    ));

    let eager = FileChannel::new(&path, Duration::ZERO);
    assert!(eager.deliver(&fixtures::event(1, "person")).await.is_err());

    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    eager.deliver(&fixtures::event(2, "person")).await.unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().count(), 1);
}

#[tokio::test]
async fn test_failing_channel_does_not_affect_others() {
    let good = RecordingChannel::new("good");
    let bad = RecordingChannel::with("bad", Duration::ZERO, true);

    let dispatcher = NotificationDispatcher::builder()
        .channel(bad.clone())
        .channel(good.clone())
        .build();

    let results = dispatcher.deliver_all(&fixtures::event(4, "person")).await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, "bad");
    assert!(results[0].1.is_err());
    assert_eq!(results[1].0, "good");
    assert!(results[1].1.is_ok());
    assert_eq!(good.seen(), vec![4]);

    let stats = dispatcher.stats();
    assert!(stats[0].degraded);
    assert_eq!(stats[0].failed, 1);
    assert!(!stats[1].degraded);
    assert_eq!(stats[1].delivered, 1);
}

#[tokio::test]
async fn test_slow_channel_is_bounded_by_timeout() {
    let slow = RecordingChannel::with("slow", Duration::from_millis(500), false);
    let fast = RecordingChannel::new("fast");

    let dispatcher = NotificationDispatcher::builder()
        .channel(slow)
        .channel(fast.clone())
        .channel_timeout(Duration::from_millis(30))
        .build();

    let started = std::time::Instant::now();
    let results = dispatcher.deliver_all(&fixtures::event(1, "person")).await;

    assert!(started.elapsed() < Duration::from_millis(400));
    assert!(matches!(results[0].1, Err(ChannelError::Timeout(_))));
    assert!(results[1].1.is_ok());
    assert_eq!(fast.seen(), vec![1]);
}

#[tokio::test]
async fn test_queued_events_keep_order_per_channel() {
    let slow = RecordingChannel::with("slow", Duration::from_millis(5), false);
    let fast = RecordingChannel::new("fast");

    let mut dispatcher = NotificationDispatcher::builder()
        .channel(slow.clone())
        .channel(fast.clone())
        .queue_capacity(16)
        .build();

    for seq in 0..10 {
        assert_eq!(dispatcher.dispatch(fixtures::event(seq, "person")), 2);
    }

    dispatcher.shutdown(Duration::from_secs(5)).await;

    let expected: Vec<u64> = (0..10).collect();
    assert_eq!(slow.seen(), expected);
    assert_eq!(fast.seen(), expected);
}

#[tokio::test]
async fn test_full_queue_drops_and_counts() {
    let slow = RecordingChannel::with("slow", Duration::from_millis(20), false);

    let mut dispatcher = NotificationDispatcher::builder()
        .channel(slow.clone())
        .queue_capacity(1)
        .build();

    let accepted: usize = (0..5)
        .map(|seq| dispatcher.dispatch(fixtures::event(seq, "person")))
        .sum();

    assert_eq!(accepted, 1);
    assert_eq!(dispatcher.stats()[0].dropped, 4);

    dispatcher.shutdown(Duration::from_secs(2)).await;
    assert_eq!(slow.seen(), vec![0]);
    assert_eq!(dispatcher.stats()[0].delivered, 1);
}

#[tokio::test]
async fn test_dispatch_after_shutdown_is_dropped() {
    let channel = RecordingChannel::new("late");
    let mut dispatcher = NotificationDispatcher::builder()
        .channel(channel.clone())
        .build();

    dispatcher.shutdown(Duration::from_secs(1)).await;

    assert_eq!(dispatcher.dispatch(fixtures::event(1, "person")), 0);
    assert_eq!(dispatcher.stats()[0].dropped, 1);
    assert!(channel.seen().is_empty());
}

#[tokio::test]
async fn test_channels_from_config() {
    let mut config = NotificationConfig::default();
    assert!(channels_from_config(&config).is_empty());

    let dispatcher = NotificationDispatcher::builder()
        .channels(channels_from_config(&config))
        .build();
    assert!(!dispatcher.is_enabled());
    assert_eq!(dispatcher.dispatch(fixtures::event(1, "person")), 0);

    config.stdio.enabled = true;
    config.file.enabled = true;
    config.webhook.enabled = true;
    config.webhook.url = "http://127.0.0.1:9/hook".to_string();

    let names: Vec<String> = channels_from_config(&config)
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    assert_eq!(names, vec!["stdio", "file", "webhook"]);
}

#[cfg(feature = "streaming")]
mod webhook {
    use super::*;
    use axum::{extract::State, http::StatusCode, routing::post, Router};
    use parking_lot::Mutex;
    use std::net::SocketAddr;
    use std::sync::Arc;

    type Received = Arc<Mutex<Vec<String>>>;

    async fn spawn_receiver() -> (SocketAddr, Received) {
        let received: Received = Arc::default();

        let app = Router::new()
            .route(
                "/ok",
                post(|State(received): State<Received>, body: String| async move {
                    received.lock().push(body);
                    StatusCode::OK
                }),
            )
            .route(
                "/fail",
                post(|State(received): State<Received>, body: String| async move {
                    received.lock().push(body);
                    StatusCode::INTERNAL_SERVER_ERROR
                }),
            )
            .with_state(Arc::clone(&received));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (addr, received)
    }

    #[tokio::test]
    async fn test_webhook_posts_event_json() {
        let (addr, received) = spawn_receiver().await;
        let channel = WebhookChannel::new(format!("http://{}/ok", addr), Duration::from_secs(2));

        channel.deliver(&fixtures::event(5, "person")).await.unwrap();

        let bodies = received.lock().clone();
        assert_eq!(bodies.len(), 1);
        let event: NotificationEvent = serde_json::from_str(&bodies[0]).unwrap();
        assert_eq!(event.frame_seq, 5);
    }

    #[tokio::test]
    async fn test_webhook_reports_status_without_retry() {
        let (addr, received) = spawn_receiver().await;
        let channel =
            WebhookChannel::new(format!("http://{}/fail", addr), Duration::from_secs(2));

        let result = channel.deliver(&fixtures::event(1, "person")).await;

        assert!(matches!(result, Err(ChannelError::HttpStatus { status: 500 })));
        assert_eq!(received.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_webhook_retries_when_configured() {
        let (addr, received) = spawn_receiver().await;
        let channel = WebhookChannel::new(format!("http://{}/fail", addr), Duration::from_secs(2))
            .with_retries(2, Duration::from_millis(5));

        assert!(channel.deliver(&fixtures::event(1, "person")).await.is_err());
        assert_eq!(received.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_webhook_retries_outlast_channel_timeout() {
        let (addr, received) = spawn_receiver().await;
        let webhook = WebhookChannel::new(format!("http://{}/fail", addr), Duration::from_secs(2))
            .with_retries(3, Duration::from_millis(60));

        let dispatcher = NotificationDispatcher::builder()
            .channel(Arc::new(webhook))
            .channel_timeout(Duration::from_millis(150))
            .build();

        let results = dispatcher.deliver_all(&fixtures::event(1, "person")).await;

        assert!(matches!(
            results[0].1,
            Err(ChannelError::HttpStatus { status: 500 })
        ));
        assert_eq!(received.lock().len(), 4);
        assert_eq!(dispatcher.stats()[0].failed, 1);
    }

    #[test]
    fn test_webhook_delivery_bound_covers_retries() {
        let single = WebhookChannel::new("http://127.0.0.1:9/hook", Duration::from_secs(1));
        assert_eq!(
            single.delivery_timeout(Duration::from_secs(5)),
            Duration::from_secs(5)
        );

        let retrying = single.with_retries(3, Duration::from_millis(100));
        // 4 attempts of 5s plus 100 + 200 + 300 ms of backoff
        assert_eq!(
            retrying.delivery_timeout(Duration::from_secs(5)),
            Duration::from_millis(20_600)
        );
    }

    #[tokio::test]
    async fn test_webhook_redirect_status_is_failure() {
        let app = Router::new().route("/moved", post(|| async { StatusCode::NOT_MODIFIED }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let channel =
            WebhookChannel::new(format!("http://{}/moved", addr), Duration::from_secs(2));
        let result = channel.deliver(&fixtures::event(1, "person")).await;

        assert!(matches!(result, Err(ChannelError::HttpStatus { status: 304 })));
    }

    #[tokio::test]
    async fn test_webhook_connection_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let channel = WebhookChannel::new(format!("http://{}/ok", addr), Duration::from_secs(1));
        let result = channel.deliver(&fixtures::event(1, "person")).await;

        assert!(matches!(result, Err(ChannelError::Transport(_))));
    }
}
