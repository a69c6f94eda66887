use super::FrameSource;
use crate::config::CameraConfig;
use crate::error::CaptureError;
use crate::frame::{Frame, FrameFormat};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, trace};

/// Generates placeholder MJPEG frames paced to the configured camera rate.
///
/// All frames share one buffer; only the sequence number and timestamps
/// differ.
pub struct SyntheticFrameSource {
    width: u32,
    height: u32,
    buffer: Arc<Vec<u8>>,
    ticker: Interval,
    next_seq: u64,
    limit: Option<u64>,
}

impl SyntheticFrameSource {
    pub fn new(config: &CameraConfig) -> Self {
        let fps = config.fps.max(1) as u64;
        let mut ticker = interval(Duration::from_millis((1000 / fps).max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Synthetic frame source ready ({}x{} @ {}fps)",
            config.width, config.height, config.fps
        );

        Self {
            width: config.width,
            height: config.height,
            buffer: Arc::new(placeholder_jpeg()),
            ticker,
            next_seq: 0,
            limit: None,
        }
    }

    /// Stop producing frames after `limit` captures
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn frames_produced(&self) -> u64 {
        self.next_seq
    }
}

#[async_trait::async_trait]
impl FrameSource for SyntheticFrameSource {
    async fn capture(&mut self) -> Result<Frame, CaptureError> {
        if let Some(limit) = self.limit {
            if self.next_seq >= limit {
                debug!("Synthetic frame source reached its limit of {}", limit);
                return Err(CaptureError::Exhausted);
            }
        }

        self.ticker.tick().await;

        let seq = self.next_seq;
        self.next_seq += 1;

        trace!("Generated synthetic frame {}", seq);
        Ok(Frame::from_shared(
            seq,
            Arc::clone(&self.buffer),
            self.width,
            self.height,
            FrameFormat::Mjpeg,
        ))
    }

    fn source_name(&self) -> &str {
        "synthetic"
    }
}

/// Minimal JFIF envelope around a flat payload
fn placeholder_jpeg() -> Vec<u8> {
    let mut data = vec![
        0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01, 0x01, 0x01, 0x00,
        0x48, 0x00, 0x48, 0x00, 0x00,
    ];
    data.extend(std::iter::repeat(0x80).take(256));
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}
