use super::event::NotificationEvent;
use crate::error::ChannelError;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// One notification output.
///
/// Each channel serializes its own copy of the event and owns its
/// resources; a failure is reported to the caller and never touches other
/// channels.
#[async_trait::async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Name of this channel for logging and stats
    fn name(&self) -> &str;

    async fn deliver(&self, event: &NotificationEvent) -> Result<(), ChannelError>;

    /// Bound on one `deliver` call when a single attempt may take
    /// `per_attempt`. Channels that retry internally widen it to cover every
    /// attempt and the pauses between them.
    fn delivery_timeout(&self, per_attempt: Duration) -> Duration {
        per_attempt
    }
}

/// Delivery counters for one channel
#[derive(Debug, Default)]
pub struct ChannelStats {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    degraded: AtomicBool,
}

impl ChannelStats {
    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Set the degraded flag, returning the previous value
    pub fn set_degraded(&self, degraded: bool) -> bool {
        self.degraded.swap(degraded, Ordering::AcqRel)
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    pub fn snapshot(&self, name: &str) -> ChannelStatsSnapshot {
        ChannelStatsSnapshot {
            name: name.to_string(),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            degraded: self.is_degraded(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelStatsSnapshot {
    pub name: String,
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
    pub degraded: bool,
}
