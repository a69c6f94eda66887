//! Inter-frame delay computation.

use crate::burst::BurstMode;
use crate::config::{BurstConfig, RateConfig};
use std::time::Duration;

/// Delay before admitting the next frame.
///
/// Outside a burst the pipeline aims for `target_rate` frames per second, so
/// the time already spent processing is subtracted from the frame interval.
/// During a burst the delay is the minimal floor regardless of rate. A
/// non-positive or non-finite rate yields no delay.
pub fn compute_delay(
    mode: BurstMode,
    target_rate: f64,
    processing_time: Duration,
    minimal_floor: Duration,
) -> Duration {
    match mode {
        BurstMode::Active => minimal_floor,
        BurstMode::Inactive => match frame_interval(target_rate) {
            Some(interval) => interval.saturating_sub(processing_time),
            None => Duration::ZERO,
        },
    }
}

fn frame_interval(target_rate: f64) -> Option<Duration> {
    if !target_rate.is_finite() || target_rate <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / target_rate).ok()
}

/// Rate limiter bound to a configured target rate and burst floor
#[derive(Debug, Clone)]
pub struct RateLimiter {
    target_rate: f64,
    minimal_floor: Duration,
}

impl RateLimiter {
    pub fn new(rate: &RateConfig, burst: &BurstConfig) -> Self {
        Self {
            target_rate: rate.target_fps,
            minimal_floor: burst.minimal_floor(),
        }
    }

    pub fn target_rate(&self) -> f64 {
        self.target_rate
    }

    pub fn set_target_rate(&mut self, target_rate: f64) {
        self.target_rate = target_rate;
    }

    pub fn minimal_floor(&self) -> Duration {
        self.minimal_floor
    }

    /// Baseline interval between frames outside of a burst
    pub fn target_interval(&self) -> Duration {
        frame_interval(self.target_rate).unwrap_or(Duration::ZERO)
    }

    pub fn delay(&self, mode: BurstMode, processing_time: Duration) -> Duration {
        compute_delay(mode, self.target_rate, processing_time, self.minimal_floor)
    }
}
