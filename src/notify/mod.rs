//! Detection event notifications.
//!
//! A [`NotificationEvent`] is built once per triggering frame and fanned out
//! to independent channels: console, append-only JSON-lines file, live SSE
//! subscribers and an HTTP webhook. Each channel fails on its own.

mod channel;
mod dispatcher;
mod event;
mod file;
#[cfg(test)]
pub(crate) mod fixtures;
mod stdio;
mod webhook;
#[cfg(test)]
mod tests;

pub use channel::{ChannelStats, ChannelStatsSnapshot, NotificationChannel};
pub use dispatcher::{NotificationDispatcher, NotificationDispatcherBuilder};
pub use event::{NotificationEvent, NotificationKind, ObjectSummary};
pub use file::FileChannel;
pub use stdio::StdioChannel;
pub use webhook::WebhookChannel;

use crate::config::NotificationConfig;
use std::sync::Arc;

/// Channels enabled in the configuration that need no server of their own.
/// The SSE channel is attached by whoever runs the stream server.
pub fn channels_from_config(config: &NotificationConfig) -> Vec<Arc<dyn NotificationChannel>> {
    let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();

    if config.stdio.enabled {
        channels.push(Arc::new(StdioChannel::new()));
    }

    if config.file.enabled {
        channels.push(Arc::new(FileChannel::from_config(&config.file)));
    }

    if config.webhook.enabled {
        channels.push(Arc::new(WebhookChannel::from_config(&config.webhook)));
    }

    channels
}
