use super::channel::NotificationChannel;
use super::event::NotificationEvent;
use crate::config::WebhookConfig;
use crate::error::ChannelError;
use std::time::Duration;
use tracing::debug;

/// POSTs each event as JSON to a callback URL.
///
/// Retries are off unless `max_retries` is set; attempts are spaced by a
/// linear backoff of `backoff * attempt`.
pub struct WebhookChannel {
    url: String,
    agent: ureq::Agent,
    timeout: Duration,
    max_retries: u32,
    backoff: Duration,
}

impl WebhookChannel {
    pub fn new<S: Into<String>>(url: S, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            timeout,
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.backoff = backoff;
        self
    }

    pub fn from_config(config: &WebhookConfig) -> Self {
        Self::new(config.url.clone(), Duration::from_millis(config.timeout_ms))
            .with_retries(config.max_retries, Duration::from_millis(config.backoff_ms))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, body: String) -> Result<u16, ChannelError> {
        let agent = self.agent.clone();
        let url = self.url.clone();

        let response = tokio::task::spawn_blocking(move || {
            agent
                .post(&url)
                .set("Content-Type", "application/json")
                .send_string(&body)
        })
        .await
        .map_err(|e| ChannelError::Transport(format!("webhook task failed: {}", e)))?;

        match response {
            // Redirects are followed by the agent; anything else outside 2xx
            // that ureq lets through is still a failure
            Ok(response) if (200..300).contains(&response.status()) => Ok(response.status()),
            Ok(response) => Err(ChannelError::HttpStatus {
                status: response.status(),
            }),
            Err(ureq::Error::Status(status, _)) => Err(ChannelError::HttpStatus { status }),
            Err(ureq::Error::Transport(transport)) => {
                Err(ChannelError::Transport(transport.to_string()))
            }
        }
    }
}

#[async_trait::async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    fn delivery_timeout(&self, per_attempt: Duration) -> Duration {
        let attempts = self.max_retries.saturating_add(1);
        // backoff * (1 + 2 + .. + max_retries)
        let pauses = self
            .backoff
            .saturating_mul(self.max_retries.saturating_mul(attempts) / 2);

        per_attempt
            .max(self.timeout)
            .saturating_mul(attempts)
            .saturating_add(pauses)
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<(), ChannelError> {
        let body = event.to_json()?;
        let mut attempt = 0;

        loop {
            match self.post(body.clone()).await {
                Ok(status) => {
                    debug!(
                        "Webhook accepted event {} (HTTP {}, attempt {})",
                        event.event_id,
                        status,
                        attempt + 1
                    );
                    return Ok(());
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    debug!("Webhook attempt {} failed: {}; retrying", attempt, e);
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
