//! Interfaces to the pipeline's external collaborators, plus bundled
//! implementations that let the binary run without camera hardware or a
//! detection model.

mod scripted;
mod synthetic;
mod tracker;
#[cfg(test)]
mod tests;

pub use scripted::ScriptedDetector;
pub use synthetic::SyntheticFrameSource;
pub use tracker::CentroidTracker;

use crate::detection::Detection;
use crate::error::{CaptureError, DetectionError};
use crate::frame::Frame;
use std::collections::BTreeSet;

/// Produces frames on demand
#[async_trait::async_trait]
pub trait FrameSource: Send {
    /// Capture the next frame. May wait for the device.
    async fn capture(&mut self) -> Result<Frame, CaptureError>;

    /// Name of this source for logging
    fn source_name(&self) -> &str;
}

/// Runs object detection on a single frame.
///
/// Called from dedicated worker threads, so implementations may block.
pub trait DetectionBackend: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectionError>;
}

impl<F> DetectionBackend for F
where
    F: Fn(&Frame) -> Result<Vec<Detection>, DetectionError> + Send + Sync,
{
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
        self(frame)
    }
}

/// Assigns identity across frames and annotates detections with
/// `is_new`/`is_stationary`
pub trait ObjectTracker: Send {
    fn update(&mut self, detections: Vec<Detection>) -> Vec<Detection>;

    /// Distinct types present in the most recent update
    fn current_types(&self) -> BTreeSet<String>;
}
