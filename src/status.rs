//! Runtime-queryable pipeline status and performance measurements.

use crate::burst::BurstState;
use crate::detection::Detection;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const PERFORMANCE_WINDOW: usize = 30;
const WARNING_INTERVAL: Duration = Duration::from_secs(60);
const TOP_OBJECTS: usize = 5;

/// Sliding-window frame rate and processing time tracker
#[derive(Debug)]
pub struct PerformanceMonitor {
    completions: VecDeque<Instant>,
    processing: VecDeque<Duration>,
    last_processing: Duration,
    last_warning: Option<Instant>,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self {
            completions: VecDeque::with_capacity(PERFORMANCE_WINDOW),
            processing: VecDeque::with_capacity(PERFORMANCE_WINDOW),
            last_processing: Duration::ZERO,
            last_warning: None,
        }
    }

    pub fn record(&mut self, processing_time: Duration) {
        self.record_at(Instant::now(), processing_time);
    }

    pub fn record_at(&mut self, completed_at: Instant, processing_time: Duration) {
        if self.completions.len() == PERFORMANCE_WINDOW {
            self.completions.pop_front();
            self.processing.pop_front();
        }
        self.completions.push_back(completed_at);
        self.processing.push_back(processing_time);
        self.last_processing = processing_time;
    }

    /// Frames per second over the window, 0.0 until two frames are recorded
    pub fn fps(&self) -> f64 {
        match (self.completions.front(), self.completions.back()) {
            (Some(first), Some(last)) if self.completions.len() > 1 => {
                let span = last.duration_since(*first).as_secs_f64();
                if span > 0.0 {
                    (self.completions.len() - 1) as f64 / span
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }

    pub fn average_processing(&self) -> Duration {
        if self.processing.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.processing.iter().sum();
        total / self.processing.len() as u32
    }

    pub fn last_processing(&self) -> Duration {
        self.last_processing
    }

    /// Returns the measured fps when it is below `min_fps` and no warning was
    /// issued in the last minute.
    pub fn check_threshold(&mut self, min_fps: f64, now: Instant) -> Option<f64> {
        if self.completions.len() < 2 {
            return None;
        }

        let fps = self.fps();
        if fps >= min_fps {
            return None;
        }

        if let Some(last) = self.last_warning {
            if now.duration_since(last) < WARNING_INTERVAL {
                return None;
            }
        }

        self.last_warning = Some(now);
        Some(fps)
    }
}

/// How often one object type has been detected since startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectCount {
    pub label: String,
    pub count: u64,
}

/// Serializable view of the pipeline, embedded in every notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub fps: f64,
    pub processing_ms: f64,
    pub last_processing_ms: f64,
    pub burst_active: bool,
    pub target_rate: f64,
    pub in_flight: usize,
    pub queue_depth: usize,
    pub frames_processed: u64,
    pub detection_failures: u64,
    pub total_objects_detected: u64,
    pub notifications_emitted: u64,
    pub uptime_seconds: u64,
    /// Most frequently detected types, highest count first
    #[serde(default)]
    pub top_objects: Vec<ObjectCount>,
}

/// Shared pipeline status.
///
/// Every field is an atomic or a short-lived lock so monitoring code on
/// other threads never stalls the main loop.
#[derive(Debug)]
pub struct PipelineStatus {
    burst: Arc<BurstState>,
    in_flight: Arc<AtomicUsize>,
    queue_depth: usize,
    target_rate_bits: AtomicU64,
    frames_processed: AtomicU64,
    detection_failures: AtomicU64,
    total_objects_detected: AtomicU64,
    notifications_emitted: AtomicU64,
    label_counts: Mutex<HashMap<String, u64>>,
    performance: Mutex<PerformanceMonitor>,
    started_at: Instant,
}

impl PipelineStatus {
    pub fn new(
        burst: Arc<BurstState>,
        in_flight: Arc<AtomicUsize>,
        queue_depth: usize,
        target_rate: f64,
    ) -> Self {
        Self {
            burst,
            in_flight,
            queue_depth,
            target_rate_bits: AtomicU64::new(target_rate.to_bits()),
            frames_processed: AtomicU64::new(0),
            detection_failures: AtomicU64::new(0),
            total_objects_detected: AtomicU64::new(0),
            notifications_emitted: AtomicU64::new(0),
            label_counts: Mutex::new(HashMap::new()),
            performance: Mutex::new(PerformanceMonitor::new()),
            started_at: Instant::now(),
        }
    }

    pub fn burst_active(&self) -> bool {
        self.burst.is_active()
    }

    pub fn target_rate(&self) -> f64 {
        f64::from_bits(self.target_rate_bits.load(Ordering::Relaxed))
    }

    pub fn set_target_rate(&self, target_rate: f64) {
        self.target_rate_bits
            .store(target_rate.to_bits(), Ordering::Relaxed);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    pub fn detection_failures(&self) -> u64 {
        self.detection_failures.load(Ordering::Relaxed)
    }

    /// Account for one consumed frame result
    pub fn record_frame(&self, processing_time: Duration, detections: &[Detection], failed: bool) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        self.total_objects_detected
            .fetch_add(detections.len() as u64, Ordering::Relaxed);
        if failed {
            self.detection_failures.fetch_add(1, Ordering::Relaxed);
        }
        if !detections.is_empty() {
            let mut counts = self.label_counts.lock();
            for detection in detections {
                *counts.entry(detection.label.clone()).or_insert(0) += 1;
            }
        }
        self.performance.lock().record(processing_time);
    }

    /// Up to `limit` object types by detection count. Ties are ordered by label.
    pub fn top_objects(&self, limit: usize) -> Vec<ObjectCount> {
        let mut top: Vec<ObjectCount> = self
            .label_counts
            .lock()
            .iter()
            .map(|(label, &count)| ObjectCount {
                label: label.clone(),
                count,
            })
            .collect();
        top.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
        top.truncate(limit);
        top
    }

    pub fn record_notification(&self) {
        self.notifications_emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Measured fps if it dropped below `min_fps`, rate limited to once a minute
    pub fn performance_warning(&self, min_fps: f64) -> Option<f64> {
        self.performance
            .lock()
            .check_threshold(min_fps, Instant::now())
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let (fps, average, last) = {
            let perf = self.performance.lock();
            (perf.fps(), perf.average_processing(), perf.last_processing())
        };

        StatusSnapshot {
            fps,
            processing_ms: average.as_secs_f64() * 1000.0,
            last_processing_ms: last.as_secs_f64() * 1000.0,
            burst_active: self.burst_active(),
            target_rate: self.target_rate(),
            in_flight: self.in_flight(),
            queue_depth: self.queue_depth,
            frames_processed: self.frames_processed(),
            detection_failures: self.detection_failures(),
            total_objects_detected: self.total_objects_detected.load(Ordering::Relaxed),
            notifications_emitted: self.notifications_emitted.load(Ordering::Relaxed),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            top_objects: self.top_objects(TOP_OBJECTS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;

    fn det(label: &str) -> Detection {
        Detection::new(label, 0.9, BoundingBox::new(0.0, 0.0, 10.0, 10.0))
    }

    #[test]
    fn test_fps_over_window() {
        let mut monitor = PerformanceMonitor::new();
        let start = Instant::now();

        for i in 0..5 {
            monitor.record_at(start + Duration::from_millis(i * 250), Duration::from_millis(20));
        }

        assert!((monitor.fps() - 4.0).abs() < 1e-9);
        assert_eq!(monitor.average_processing(), Duration::from_millis(20));
    }

    #[test]
    fn test_window_is_bounded() {
        let mut monitor = PerformanceMonitor::new();
        let start = Instant::now();

        for i in 0..(PERFORMANCE_WINDOW as u64 + 10) {
            monitor.record_at(start + Duration::from_millis(i * 100), Duration::from_millis(i));
        }

        assert_eq!(monitor.completions.len(), PERFORMANCE_WINDOW);
        assert_eq!(monitor.last_processing(), Duration::from_millis(39));
    }

    #[test]
    fn test_threshold_warning_is_rate_limited() {
        let mut monitor = PerformanceMonitor::new();
        let start = Instant::now();

        monitor.record_at(start, Duration::from_millis(10));
        monitor.record_at(start + Duration::from_secs(4), Duration::from_millis(10));

        let now = start + Duration::from_secs(4);
        assert!(monitor.check_threshold(0.5, now).is_some());
        assert!(monitor
            .check_threshold(0.5, now + Duration::from_secs(30))
            .is_none());
        assert!(monitor
            .check_threshold(0.5, now + Duration::from_secs(61))
            .is_some());
        assert!(monitor.check_threshold(0.1, now + Duration::from_secs(200)).is_none());
    }

    #[test]
    fn test_snapshot_reflects_shared_state() {
        let burst = Arc::new(BurstState::new());
        let in_flight = Arc::new(AtomicUsize::new(3));
        let status = PipelineStatus::new(Arc::clone(&burst), Arc::clone(&in_flight), 10, 1.0);

        status.record_frame(Duration::from_millis(40), &[det("car"), det("car")], false);
        status.record_frame(Duration::from_millis(60), &[], true);
        status.record_notification();
        status.set_target_rate(2.5);

        let snapshot = status.snapshot();
        assert_eq!(snapshot.in_flight, 3);
        assert_eq!(snapshot.queue_depth, 10);
        assert_eq!(snapshot.frames_processed, 2);
        assert_eq!(snapshot.detection_failures, 1);
        assert_eq!(snapshot.total_objects_detected, 2);
        assert_eq!(snapshot.notifications_emitted, 1);
        assert_eq!(snapshot.target_rate, 2.5);
        assert!(!snapshot.burst_active);
        assert!((snapshot.processing_ms - 50.0).abs() < 1e-6);
        assert!((snapshot.last_processing_ms - 60.0).abs() < 1e-6);
        assert_eq!(
            snapshot.top_objects,
            vec![ObjectCount {
                label: "car".into(),
                count: 2,
            }]
        );
    }

    #[test]
    fn test_top_objects_by_frequency() {
        let status = PipelineStatus::new(
            Arc::new(BurstState::new()),
            Arc::new(AtomicUsize::new(0)),
            10,
            1.0,
        );

        let frame = Duration::from_millis(10);
        status.record_frame(frame, &[det("person"), det("dog"), det("person")], false);
        status.record_frame(frame, &[det("car"), det("dog"), det("person")], false);
        status.record_frame(frame, &[det("bicycle"), det("truck"), det("bus")], false);

        let labels = |top: Vec<ObjectCount>| -> Vec<(String, u64)> {
            top.into_iter().map(|o| (o.label, o.count)).collect()
        };

        assert_eq!(
            labels(status.top_objects(3)),
            vec![
                ("person".to_string(), 3),
                ("dog".to_string(), 2),
                ("bicycle".to_string(), 1),
            ]
        );
        assert_eq!(status.snapshot().top_objects.len(), TOP_OBJECTS);
    }

    #[test]
    fn test_snapshot_without_top_objects_deserializes() {
        let json = r#"{"fps":1.0,"processing_ms":2.0,"last_processing_ms":2.0,
            "burst_active":false,"target_rate":1.0,"in_flight":0,"queue_depth":10,
            "frames_processed":1,"detection_failures":0,"total_objects_detected":0,
            "notifications_emitted":0,"uptime_seconds":3}"#;

        let snapshot: StatusSnapshot = serde_json::from_str(json).unwrap();
        assert!(snapshot.top_objects.is_empty());
    }
}
