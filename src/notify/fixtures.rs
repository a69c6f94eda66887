use super::{NotificationChannel, NotificationEvent};
use crate::detection::{BoundingBox, Detection};
use crate::error::ChannelError;
use crate::frame::{Frame, FrameFormat};
use crate::status::{ObjectCount, StatusSnapshot};
use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

pub fn snapshot() -> StatusSnapshot {
    StatusSnapshot {
        fps: 1.0,
        processing_ms: 42.0,
        last_processing_ms: 40.0,
        burst_active: true,
        target_rate: 1.0,
        in_flight: 1,
        queue_depth: 10,
        frames_processed: 12,
        detection_failures: 0,
        total_objects_detected: 20,
        notifications_emitted: 3,
        uptime_seconds: 60,
        top_objects: vec![ObjectCount {
            label: "person".to_string(),
            count: 14,
        }],
    }
}

pub fn event(seq: u64, label: &str) -> NotificationEvent {
    let frame = Frame::new(seq, vec![0xFF, 0xD8, 0xFF, 0xD9], 640, 480, FrameFormat::Mjpeg);
    let detections = vec![
        Detection::new(label, 0.91, BoundingBox::new(100.0, 50.0, 40.0, 80.0))
            .with_instance(seq)
            .new_instance(),
    ];

    NotificationEvent::from_frame(&frame, &detections, snapshot(), false)
        .expect("fixture has a new detection")
}

/// In-memory writer whose contents stay readable after being boxed
#[derive(Clone, Default)]
pub struct SharedBuffer(pub Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Channel recording the frame numbers it saw, optionally slow or failing
pub struct RecordingChannel {
    name: String,
    pub seen: Mutex<Vec<u64>>,
    delay: Duration,
    fail: bool,
}

impl RecordingChannel {
    pub fn new(name: &str) -> Arc<Self> {
        Self::with(name, Duration::ZERO, false)
    }

    pub fn with(name: &str, delay: Duration, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            seen: Mutex::new(Vec::new()),
            delay,
            fail,
        })
    }

    pub fn seen(&self) -> Vec<u64> {
        self.seen.lock().clone()
    }
}

#[async_trait::async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<(), ChannelError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.seen.lock().push(event.frame_seq);

        if self.fail {
            Err(ChannelError::Transport("refused".to_string()))
        } else {
            Ok(())
        }
    }
}
