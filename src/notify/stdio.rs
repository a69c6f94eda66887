use super::channel::NotificationChannel;
use super::event::NotificationEvent;
use crate::error::ChannelError;
use parking_lot::Mutex;
use std::io::{self, Write};
use tracing::warn;

/// Prints one summary line per event. Never fails.
pub struct StdioChannel {
    out: Mutex<Box<dyn Write + Send>>,
}

impl Default for StdioChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl StdioChannel {
    pub fn new() -> Self {
        Self::with_writer(Box::new(io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

#[async_trait::async_trait]
impl NotificationChannel for StdioChannel {
    fn name(&self) -> &str {
        "stdio"
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<(), ChannelError> {
        let line = event.summary_line();
        let mut out = self.out.lock();

        if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
            warn!("Failed to print notification {}: {}", event.event_id, e);
        }

        Ok(())
    }
}
