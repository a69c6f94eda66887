use crate::error::ChannelError;
use crate::notify::{NotificationChannel, NotificationEvent};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, trace};

struct Subscribers {
    senders: Mutex<HashMap<u64, mpsc::Sender<Arc<str>>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl Subscribers {
    fn remove(&self, id: u64) -> bool {
        self.senders.lock().remove(&id).is_some()
    }
}

/// Set of live SSE subscribers.
///
/// Connection handlers add themselves with [`subscribe`](Self::subscribe);
/// dropping the returned [`Subscription`] removes them again. Broadcasting
/// copies the sender list under the lock and writes outside it.
#[derive(Clone)]
pub struct SseBroadcaster {
    inner: Arc<Subscribers>,
}

/// Receiving end held by one connected client
pub struct Subscription {
    id: u64,
    receiver: mpsc::Receiver<Arc<str>>,
    owner: Weak<Subscribers>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next payload, or `None` once the broadcaster dropped this subscriber
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.upgrade() {
            if owner.remove(self.id) {
                debug!("SSE subscriber {} disconnected", self.id);
            }
        }
    }
}

impl SseBroadcaster {
    /// `buffer` is how many undelivered events a subscriber may lag behind
    /// before it is dropped
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(Subscribers {
                senders: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                buffer: buffer.max(1),
            }),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.inner.buffer);
        self.inner.senders.lock().insert(id, sender);

        Subscription {
            id,
            receiver,
            owner: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.senders.lock().len()
    }

    /// Send a payload to every subscriber. A subscriber that cannot take it
    /// is removed; the others are unaffected. Returns the number reached.
    pub fn broadcast(&self, payload: &str) -> usize {
        let targets: Vec<(u64, mpsc::Sender<Arc<str>>)> = self
            .inner
            .senders
            .lock()
            .iter()
            .map(|(id, sender)| (*id, sender.clone()))
            .collect();

        if targets.is_empty() {
            trace!("No SSE subscribers connected");
            return 0;
        }

        let payload: Arc<str> = Arc::from(payload);
        let mut reached = 0;
        let mut failed = Vec::new();

        for (id, sender) in targets {
            match sender.try_send(Arc::clone(&payload)) {
                Ok(()) => reached += 1,
                Err(TrySendError::Full(_)) => failed.push((id, "too slow")),
                Err(TrySendError::Closed(_)) => failed.push((id, "disconnected")),
            }
        }

        if !failed.is_empty() {
            let mut senders = self.inner.senders.lock();
            for (id, reason) in failed {
                if senders.remove(&id).is_some() {
                    info!("Removed SSE subscriber {} ({})", id, reason);
                }
            }
        }

        reached
    }
}

/// Notification channel writing each event to all SSE subscribers
pub struct SseChannel {
    broadcaster: SseBroadcaster,
}

impl SseChannel {
    pub fn new(broadcaster: SseBroadcaster) -> Self {
        Self { broadcaster }
    }
}

#[async_trait::async_trait]
impl NotificationChannel for SseChannel {
    fn name(&self) -> &str {
        "sse"
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<(), ChannelError> {
        if self.broadcaster.subscriber_count() == 0 {
            return Ok(());
        }

        let payload = event.to_json()?;
        let reached = self.broadcaster.broadcast(&payload);
        trace!("Event {} sent to {} SSE subscriber(s)", event.event_id, reached);

        Ok(())
    }
}
