use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Axis-aligned box in frame pixel space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center point of the box
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// A single detected object, annotated by the tracker with identity flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Object-type label, e.g. "person"
    #[serde(rename = "class")]
    pub label: String,
    /// Confidence in 0.0..=1.0
    pub confidence: f32,
    pub bbox: BoundingBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<u64>,
    /// The instance entered the scene in this frame
    #[serde(default)]
    pub is_new: bool,
    /// The instance has not moved meaningfully since it was last seen
    #[serde(default)]
    pub is_stationary: bool,
}

impl Detection {
    pub fn new<S: Into<String>>(label: S, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
            bbox,
            instance_id: None,
            is_new: false,
            is_stationary: false,
        }
    }

    pub fn with_instance(mut self, instance_id: u64) -> Self {
        self.instance_id = Some(instance_id);
        self
    }

    pub fn new_instance(mut self) -> Self {
        self.is_new = true;
        self
    }

    pub fn stationary(mut self) -> Self {
        self.is_stationary = true;
        self
    }

    pub fn center(&self) -> (f32, f32) {
        self.bbox.center()
    }
}

/// Distinct object types present in a set of detections
pub fn type_set(detections: &[Detection]) -> BTreeSet<String> {
    detections.iter().map(|d| d.label.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center() {
        let bbox = BoundingBox::new(100.0, 100.0, 50.0, 100.0);
        assert_eq!(bbox.center(), (125.0, 150.0));
    }

    #[test]
    fn test_confidence_is_clamped() {
        let det = Detection::new("cat", 1.4, BoundingBox::default());
        assert_eq!(det.confidence, 1.0);
    }

    #[test]
    fn test_type_set_deduplicates() {
        let detections = vec![
            Detection::new("person", 0.9, BoundingBox::default()),
            Detection::new("car", 0.8, BoundingBox::default()),
            Detection::new("person", 0.7, BoundingBox::default()),
        ];

        let types = type_set(&detections);
        assert_eq!(types.len(), 2);
        assert!(types.contains("person"));
        assert!(types.contains("car"));
    }

    #[test]
    fn test_deserialize_minimal_detection() {
        let json = r#"{"class":"dog","confidence":0.5,"bbox":{"x":1,"y":2,"width":3,"height":4}}"#;
        let det: Detection = serde_json::from_str(json).unwrap();

        assert_eq!(det.label, "dog");
        assert!(!det.is_new);
        assert!(!det.is_stationary);
        assert_eq!(det.instance_id, None);
    }
}
