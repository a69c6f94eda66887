use super::DetectionBackend;
use crate::detection::Detection;
use crate::error::{DetectionError, Result, ScenewatchError};
use crate::frame::Frame;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Replays a fixed detection script, one entry per frame.
///
/// The script is JSON lines: each line is an array of detections, or `null`
/// to simulate a backend failure for that frame. Blank lines and lines
/// starting with `#` are ignored. Entries are selected by frame sequence
/// number and the script wraps around.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDetector {
    script: Vec<Option<Vec<Detection>>>,
    latency: Duration,
}

impl ScriptedDetector {
    pub fn new(script: Vec<Option<Vec<Detection>>>) -> Self {
        Self {
            script,
            latency: Duration::ZERO,
        }
    }

    /// Detector that never finds anything
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn parse(source: &str) -> Result<Self> {
        let mut script = Vec::new();

        for (index, line) in source.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let entry: Option<Vec<Detection>> = serde_json::from_str(line).map_err(|e| {
                ScenewatchError::component(
                    "detection".to_string(),
                    format!("Invalid detection script line {}: {}", index + 1, e),
                )
            })?;
            script.push(entry);
        }

        Ok(Self::new(script))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        let detector = Self::parse(&source)?;

        info!(
            "Loaded detection script {} ({} frames)",
            path.as_ref().display(),
            detector.len()
        );

        Ok(detector)
    }

    pub fn len(&self) -> usize {
        self.script.len()
    }

    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }
}

impl DetectionBackend for ScriptedDetector {
    fn detect(&self, frame: &Frame) -> std::result::Result<Vec<Detection>, DetectionError> {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        if self.script.is_empty() {
            return Ok(Vec::new());
        }

        let index = (frame.seq % self.script.len() as u64) as usize;
        match &self.script[index] {
            Some(detections) => Ok(detections.clone()),
            None => Err(DetectionError::Backend(format!(
                "scripted failure at frame {}",
                frame.seq
            ))),
        }
    }
}
