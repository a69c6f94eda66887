use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

/// Pixel layout of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// Motion JPEG format - compressed JPEG frames
    Mjpeg,
    /// RGB24 format - uncompressed RGB data
    Rgb24,
}

impl FrameFormat {
    /// Check if format is compressed
    pub fn is_compressed(&self) -> bool {
        matches!(self, FrameFormat::Mjpeg)
    }
}

/// A captured image buffer with its sequence number and capture time.
///
/// The pixel data is shared and immutable, so cloning a frame to hand it to a
/// detection worker does not copy the image.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonic sequence number assigned by the frame source
    pub seq: u64,
    /// Wall-clock capture time
    pub timestamp: SystemTime,
    /// Monotonic capture instant, used for latency measurements
    pub captured_at: Instant,
    /// Raw frame data
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frame format
    pub format: FrameFormat,
}

impl Frame {
    /// Create a new frame captured now
    pub fn new(seq: u64, data: Vec<u8>, width: u32, height: u32, format: FrameFormat) -> Self {
        Self::from_shared(seq, Arc::new(data), width, height, format)
    }

    /// Create a frame that shares an existing pixel buffer
    pub fn from_shared(
        seq: u64,
        data: Arc<Vec<u8>>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Self {
        Self {
            seq,
            timestamp: SystemTime::now(),
            captured_at: Instant::now(),
            data,
            width,
            height,
            format,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
