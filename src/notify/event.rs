use crate::detection::Detection;
use crate::frame::Frame;
use crate::status::StatusSnapshot;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewObjectDetected,
}

/// The detection that triggered a notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSummary {
    #[serde(rename = "type")]
    pub label: String,
    /// Center of the bounding box
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<u64>,
}

impl From<&Detection> for ObjectSummary {
    fn from(detection: &Detection) -> Self {
        let (x, y) = detection.center();
        Self {
            label: detection.label.clone(),
            x,
            y,
            confidence: detection.confidence,
            instance_id: detection.instance_id,
        }
    }
}

/// Immutable event fanned out to every enabled channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub event_id: Uuid,
    #[serde(rename = "event")]
    pub kind: NotificationKind,
    pub timestamp: DateTime<Utc>,
    pub frame_seq: u64,
    pub object: ObjectSummary,
    pub all_detections: Vec<Detection>,
    pub system_status: StatusSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
}

impl NotificationEvent {
    /// Build the event for a frame, if any detection in it is a newly
    /// entered instance. The highest-confidence new detection is reported as
    /// the trigger.
    pub fn from_frame(
        frame: &Frame,
        detections: &[Detection],
        system_status: StatusSnapshot,
        include_image: bool,
    ) -> Option<Self> {
        let trigger = detections
            .iter()
            .filter(|d| d.is_new)
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))?;

        let image_base64 = (include_image && frame.format.is_compressed() && !frame.is_empty())
            .then(|| STANDARD.encode(frame.data.as_slice()));

        Some(Self {
            event_id: Uuid::new_v4(),
            kind: NotificationKind::NewObjectDetected,
            timestamp: DateTime::<Utc>::from(frame.timestamp),
            frame_seq: frame.seq,
            object: ObjectSummary::from(trigger),
            all_detections: detections.to_vec(),
            system_status,
            image_base64,
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// One human-readable line for console output
    pub fn summary_line(&self) -> String {
        format!(
            "[{}] NEW OBJECT: {} ({:.0}%) at ({:.0}, {:.0}) | frame {} | {} object(s) | {:.1} fps | burst {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.object.label,
            self.object.confidence * 100.0,
            self.object.x,
            self.object.y,
            self.frame_seq,
            self.all_detections.len(),
            self.system_status.fps,
            if self.system_status.burst_active {
                "on"
            } else {
                "off"
            }
        )
    }
}
