use super::ObjectTracker;
use crate::config::TrackerConfig;
use crate::detection::Detection;
use std::collections::{BTreeSet, VecDeque};
use tracing::{debug, trace};

#[derive(Debug)]
struct TrackedObject {
    id: u64,
    label: String,
    center: (f32, f32),
    history: VecDeque<(f32, f32)>,
    frames_since_seen: u32,
}

impl TrackedObject {
    fn observe(&mut self, center: (f32, f32), history_len: usize) {
        if self.history.len() == history_len {
            self.history.pop_front();
        }
        self.history.push_back(center);
        self.center = center;
        self.frames_since_seen = 0;
    }

    /// Average step length across the recorded positions
    fn average_movement(&self) -> f32 {
        if self.history.len() < 2 {
            return f32::INFINITY;
        }
        let total: f32 = self
            .history
            .iter()
            .zip(self.history.iter().skip(1))
            .map(|(a, b)| distance(*a, *b))
            .sum();
        total / (self.history.len() - 1) as f32
    }
}

/// Position-based permanence model.
///
/// A detection keeps the identity of the nearest unmatched tracked object of
/// the same type within `max_match_distance` pixels; otherwise it becomes a
/// new instance.
pub struct CentroidTracker {
    config: TrackerConfig,
    objects: Vec<TrackedObject>,
    next_id: u64,
}

impl CentroidTracker {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            config: config.clone(),
            objects: Vec::new(),
            next_id: 1,
        }
    }

    pub fn tracked_count(&self) -> usize {
        self.objects.len()
    }

    fn closest_match(&self, label: &str, center: (f32, f32), taken: &[bool]) -> Option<usize> {
        self.objects
            .iter()
            .enumerate()
            .filter(|(i, obj)| !taken[*i] && obj.label == label)
            .map(|(i, obj)| (i, distance(obj.center, center)))
            .filter(|(_, d)| *d < self.config.max_match_distance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }
}

impl ObjectTracker for CentroidTracker {
    fn update(&mut self, detections: Vec<Detection>) -> Vec<Detection> {
        for obj in &mut self.objects {
            obj.frames_since_seen = obj.frames_since_seen.saturating_add(1);
        }

        let existing = self.objects.len();
        let mut taken = vec![false; existing];
        let mut annotated = Vec::with_capacity(detections.len());

        for mut detection in detections {
            let center = detection.center();

            match self.closest_match(&detection.label, center, &taken) {
                Some(index) => {
                    taken[index] = true;
                    let obj = &mut self.objects[index];
                    obj.observe(center, self.config.stationary_history);

                    detection.instance_id = Some(obj.id);
                    detection.is_new = false;
                    detection.is_stationary = obj.history.len()
                        >= self.config.stationary_history
                        && obj.average_movement() < self.config.stationary_threshold;

                    trace!(
                        id = obj.id,
                        label = %obj.label,
                        stationary = detection.is_stationary,
                        "Matched tracked object"
                    );
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;

                    let mut history = VecDeque::with_capacity(self.config.stationary_history);
                    history.push_back(center);
                    self.objects.push(TrackedObject {
                        id,
                        label: detection.label.clone(),
                        center,
                        history,
                        frames_since_seen: 0,
                    });

                    detection.instance_id = Some(id);
                    detection.is_new = true;
                    detection.is_stationary = false;

                    debug!(
                        id,
                        label = %detection.label,
                        x = center.0,
                        y = center.1,
                        "New object entered"
                    );
                }
            }

            annotated.push(detection);
        }

        let max_missed = self.config.max_missed_frames;
        self.objects.retain(|obj| {
            let keep = obj.frames_since_seen <= max_missed;
            if !keep {
                debug!(id = obj.id, label = %obj.label, "Forgetting object");
            }
            keep
        });

        annotated
    }

    fn current_types(&self) -> BTreeSet<String> {
        self.objects
            .iter()
            .filter(|obj| obj.frames_since_seen == 0)
            .map(|obj| obj.label.clone())
            .collect()
    }
}

fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}
