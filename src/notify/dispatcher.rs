use super::channel::{ChannelStats, ChannelStatsSnapshot, NotificationChannel};
use super::event::NotificationEvent;
use crate::error::ChannelError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A channel with its own queue and delivery task
struct Lane {
    channel: Arc<dyn NotificationChannel>,
    stats: Arc<ChannelStats>,
    sender: Option<mpsc::Sender<Arc<NotificationEvent>>>,
    task: Option<JoinHandle<()>>,
}

/// Fans events out to independent notification channels.
///
/// Every channel gets a bounded queue drained by its own task, so events
/// reach each channel in dispatch order while a slow or failing channel
/// only ever delays itself. When a queue is full the event is dropped for
/// that channel and counted.
pub struct NotificationDispatcher {
    lanes: Vec<Lane>,
    #[cfg(test)]
    channel_timeout: Duration,
}

pub struct NotificationDispatcherBuilder {
    channels: Vec<Arc<dyn NotificationChannel>>,
    channel_timeout: Duration,
    queue_capacity: usize,
}

impl Default for NotificationDispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationDispatcherBuilder {
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            channel_timeout: Duration::from_secs(5),
            queue_capacity: 64,
        }
    }

    pub fn channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn channels(mut self, channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        self.channels.extend(channels);
        self
    }

    pub fn channel_timeout(mut self, timeout: Duration) -> Self {
        self.channel_timeout = timeout;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Spawn one delivery task per channel. Must run inside a tokio runtime.
    pub fn build(self) -> NotificationDispatcher {
        let lanes = self
            .channels
            .into_iter()
            .map(|channel| {
                let stats = Arc::new(ChannelStats::default());
                let (sender, receiver) = mpsc::channel(self.queue_capacity);
                let task = tokio::spawn(run_lane(
                    Arc::clone(&channel),
                    Arc::clone(&stats),
                    receiver,
                    self.channel_timeout,
                ));

                Lane {
                    channel,
                    stats,
                    sender: Some(sender),
                    task: Some(task),
                }
            })
            .collect::<Vec<_>>();

        if lanes.is_empty() {
            info!("No notification channels enabled");
        } else {
            let names: Vec<&str> = lanes.iter().map(|lane| lane.channel.name()).collect();
            info!("Notification channels enabled: {}", names.join(", "));
        }

        NotificationDispatcher {
            lanes,
            #[cfg(test)]
            channel_timeout: self.channel_timeout,
        }
    }
}

impl NotificationDispatcher {
    pub fn builder() -> NotificationDispatcherBuilder {
        NotificationDispatcherBuilder::new()
    }

    /// Whether any channel is configured
    pub fn is_enabled(&self) -> bool {
        !self.lanes.is_empty()
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.lanes
            .iter()
            .map(|lane| lane.channel.name().to_string())
            .collect()
    }

    /// Queue an event on every channel without waiting for delivery.
    /// Returns how many channels accepted it.
    pub fn dispatch(&self, event: NotificationEvent) -> usize {
        let event = Arc::new(event);
        let mut accepted = 0;

        for lane in &self.lanes {
            let Some(sender) = &lane.sender else {
                lane.stats.record_dropped();
                continue;
            };

            match sender.try_send(Arc::clone(&event)) {
                Ok(()) => accepted += 1,
                Err(TrySendError::Full(_)) => {
                    lane.stats.record_dropped();
                    warn!(
                        channel = lane.channel.name(),
                        event_id = %event.event_id,
                        "Notification queue full, dropping event"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    lane.stats.record_dropped();
                    debug!(
                        channel = lane.channel.name(),
                        "Notification channel closed, dropping event"
                    );
                }
            }
        }

        accepted
    }

    /// Deliver an event to every channel concurrently and wait for all of
    /// them, each bounded by the channel timeout. Bypasses the queues.
    #[cfg(test)]
    pub(crate) async fn deliver_all(
        &self,
        event: &NotificationEvent,
    ) -> Vec<(String, Result<(), ChannelError>)> {
        let deliveries = self.lanes.iter().map(|lane| async move {
            let outcome =
                deliver_one(lane.channel.as_ref(), &lane.stats, event, self.channel_timeout)
                    .await;
            (lane.channel.name().to_string(), outcome)
        });

        futures::future::join_all(deliveries).await
    }

    pub fn stats(&self) -> Vec<ChannelStatsSnapshot> {
        self.lanes
            .iter()
            .map(|lane| lane.stats.snapshot(lane.channel.name()))
            .collect()
    }

    /// Close the queues and wait up to `grace` for queued events to be
    /// delivered. Lanes still busy after that are aborted.
    pub async fn shutdown(&mut self, grace: Duration) {
        for lane in &mut self.lanes {
            lane.sender.take();
        }

        let deadline = tokio::time::Instant::now() + grace;

        for lane in &mut self.lanes {
            let Some(mut task) = lane.task.take() else {
                continue;
            };

            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(
                    channel = lane.channel.name(),
                    "Notification task failed: {}", e
                ),
                Err(_) => {
                    warn!(
                        channel = lane.channel.name(),
                        "Notification queue not drained within {:?}; aborting", grace
                    );
                    task.abort();
                }
            }
        }

        debug!("Notification dispatcher stopped");
    }
}

async fn run_lane(
    channel: Arc<dyn NotificationChannel>,
    stats: Arc<ChannelStats>,
    mut receiver: mpsc::Receiver<Arc<NotificationEvent>>,
    timeout: Duration,
) {
    debug!(channel = channel.name(), "Notification lane started");

    while let Some(event) = receiver.recv().await {
        // Failures are logged and counted inside
        let _ = deliver_one(channel.as_ref(), &stats, &event, timeout).await;
    }

    debug!(channel = channel.name(), "Notification lane stopped");
}

/// Deliver to a single channel within its delivery bound, recording the
/// outcome. The first failure after a success marks the channel degraded
/// and is logged as a warning; repeats are logged at debug until the
/// channel recovers.
async fn deliver_one(
    channel: &dyn NotificationChannel,
    stats: &ChannelStats,
    event: &NotificationEvent,
    timeout: Duration,
) -> Result<(), ChannelError> {
    let bound = channel.delivery_timeout(timeout);
    let outcome = match tokio::time::timeout(bound, channel.deliver(event)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(ChannelError::Timeout(bound)),
    };

    match &outcome {
        Ok(()) => {
            stats.record_delivered();
            if stats.set_degraded(false) {
                info!(channel = channel.name(), "Notification channel recovered");
            }
        }
        Err(e) => {
            stats.record_failed();
            if !stats.set_degraded(true) {
                warn!(
                    channel = channel.name(),
                    event_id = %event.event_id,
                    error = %e,
                    "Notification channel degraded"
                );
            } else {
                debug!(
                    channel = channel.name(),
                    error = %e,
                    "Notification channel still degraded"
                );
            }
        }
    }

    outcome
}
