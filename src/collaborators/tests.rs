use super::*;
use crate::config::{CameraConfig, TrackerConfig};
use crate::detection::BoundingBox;
use crate::frame::FrameFormat;
use std::io::Write;
use std::time::{Duration, Instant};

fn frame(seq: u64) -> Frame {
    Frame::new(seq, vec![0u8; 16], 4, 4, FrameFormat::Mjpeg)
}

fn at(label: &str, x: f32, y: f32) -> Detection {
    Detection::new(label, 0.8, BoundingBox::new(x, y, 20.0, 20.0))
}

fn tracker_config() -> TrackerConfig {
    TrackerConfig {
        max_match_distance: 100.0,
        stationary_threshold: 10.0,
        stationary_history: 3,
        max_missed_frames: 2,
    }
}

#[tokio::test]
async fn test_synthetic_source_sequence_and_limit() {
    let config = CameraConfig {
        width: 320,
        height: 240,
        fps: 200,
    };
    let mut source = SyntheticFrameSource::new(&config).with_limit(3);

    let first = source.capture().await.unwrap();
    let second = source.capture().await.unwrap();
    let third = source.capture().await.unwrap();

    assert_eq!((first.seq, second.seq, third.seq), (0, 1, 2));
    assert_eq!(first.width, 320);
    assert_eq!(first.format, FrameFormat::Mjpeg);
    assert!(std::sync::Arc::ptr_eq(&first.data, &third.data));

    assert!(matches!(
        source.capture().await,
        Err(CaptureError::Exhausted)
    ));
    assert_eq!(source.frames_produced(), 3);
}

#[test]
fn test_scripted_detector_cycles_and_fails() {
    let script = r#"
# frame 0: nothing
[]
[{"class":"person","confidence":0.9,"bbox":{"x":0,"y":0,"width":10,"height":10}}]
null
"#;
    let detector = ScriptedDetector::parse(script).unwrap();
    assert_eq!(detector.len(), 3);

    assert!(detector.detect(&frame(0)).unwrap().is_empty());
    assert_eq!(detector.detect(&frame(1)).unwrap()[0].label, "person");
    assert!(matches!(
        detector.detect(&frame(2)),
        Err(DetectionError::Backend(_))
    ));
    assert_eq!(detector.detect(&frame(4)).unwrap().len(), 1);
}

#[test]
fn test_scripted_detector_rejects_bad_line() {
    assert!(ScriptedDetector::parse("[]\nnot json\n").is_err());
}

#[test]
fn test_scripted_detector_loads_file_and_sleeps() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"[{{"class":"car","confidence":0.7,"bbox":{{"x":5,"y":5,"width":50,"height":30}}}}]"#
    )
    .unwrap();

    let detector = ScriptedDetector::load(file.path())
        .unwrap()
        .with_latency(Duration::from_millis(20));

    let start = Instant::now();
    let detections = detector.detect(&frame(9)).unwrap();
    assert!(start.elapsed() >= Duration::from_millis(20));
    assert_eq!(detections[0].label, "car");
}

#[test]
fn test_empty_detector_and_closure_backend() {
    assert!(ScriptedDetector::empty().detect(&frame(0)).unwrap().is_empty());

    let backend = |f: &Frame| -> Result<Vec<Detection>, DetectionError> {
        Ok(vec![at("cat", f.seq as f32, 0.0)])
    };
    assert_eq!(backend.detect(&frame(3)).unwrap()[0].bbox.x, 3.0);
}

#[test]
fn test_tracker_marks_new_then_known() {
    let mut tracker = CentroidTracker::new(&tracker_config());

    let first = tracker.update(vec![at("person", 100.0, 100.0)]);
    assert!(first[0].is_new);
    assert!(!first[0].is_stationary);

    let second = tracker.update(vec![at("person", 130.0, 100.0)]);
    assert!(!second[0].is_new);
    assert_eq!(second[0].instance_id, first[0].instance_id);

    assert_eq!(tracker.current_types().len(), 1);
    assert!(tracker.current_types().contains("person"));
}

#[test]
fn test_tracker_far_detection_is_new_instance() {
    let mut tracker = CentroidTracker::new(&tracker_config());

    let first = tracker.update(vec![at("person", 0.0, 0.0)]);
    let second = tracker.update(vec![at("person", 0.0, 0.0), at("person", 400.0, 400.0)]);

    assert!(!second[0].is_new);
    assert!(second[1].is_new);
    assert_ne!(second[1].instance_id, first[0].instance_id);
    assert_eq!(tracker.tracked_count(), 2);
}

#[test]
fn test_tracker_detects_stationary_objects() {
    let mut tracker = CentroidTracker::new(&tracker_config());

    tracker.update(vec![at("car", 200.0, 200.0)]);
    let second = tracker.update(vec![at("car", 201.0, 200.0)]);
    assert!(!second[0].is_stationary);

    let third = tracker.update(vec![at("car", 202.0, 201.0)]);
    assert!(third[0].is_stationary);

    let moved = tracker.update(vec![at("car", 260.0, 200.0)]);
    assert!(!moved[0].is_stationary);
}

#[test]
fn test_tracker_forgets_missing_objects() {
    let mut tracker = CentroidTracker::new(&tracker_config());

    tracker.update(vec![at("dog", 10.0, 10.0)]);
    tracker.update(vec![]);
    assert!(tracker.current_types().is_empty());
    assert_eq!(tracker.tracked_count(), 1);

    tracker.update(vec![]);
    tracker.update(vec![]);
    assert_eq!(tracker.tracked_count(), 0);

    let back = tracker.update(vec![at("dog", 10.0, 10.0)]);
    assert!(back[0].is_new);
}
