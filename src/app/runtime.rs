use super::{ComponentState, ScenewatchOrchestrator};
use crate::error::{Result, ScenewatchError};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[cfg(feature = "streaming")]
const SERVER_STOP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

impl ScenewatchOrchestrator {
    /// Run until a signal arrives, the source runs dry or the frame limit is
    /// hit. Returns the process exit code.
    pub async fn run(&mut self) -> Result<i32> {
        let pipeline = self
            .pipeline
            .take()
            .ok_or_else(|| ScenewatchError::system("Pipeline already started"))?;

        Self::setup_signal_handlers(self.cancellation_token.clone());

        #[cfg(feature = "streaming")]
        let server_task = self.start_stream_server().await?;

        self.set_component_state("pipeline", ComponentState::Running)
            .await;
        info!("Scenewatch is running");

        let outcome = pipeline.run().await;

        // Stop the server and anything else still watching the token
        self.cancellation_token.cancel();

        #[cfg(feature = "streaming")]
        if let Some(task) = server_task {
            self.set_component_state("sse", ComponentState::Stopping)
                .await;
            match tokio::time::timeout(SERVER_STOP_TIMEOUT, task).await {
                Ok(_) => self.set_component_state("sse", ComponentState::Stopped).await,
                Err(_) => {
                    warn!("SSE server did not stop within {:?}", SERVER_STOP_TIMEOUT);
                    self.set_component_state("sse", ComponentState::Failed)
                        .await;
                }
            }
        }

        match outcome {
            Ok(summary) => {
                self.set_component_state("pipeline", ComponentState::Stopped)
                    .await;
                info!(
                    reason = ?summary.reason,
                    frames_captured = summary.frames_captured,
                    frames_processed = summary.frames_processed,
                    capture_failures = summary.capture_failures,
                    notifications = summary.notifications,
                    "Scenewatch shutdown complete"
                );
                Ok(0)
            }
            Err(e) => {
                self.set_component_state("pipeline", ComponentState::Failed)
                    .await;
                error!("Detection pipeline failed: {}", e);
                Ok(1)
            }
        }
    }

    #[cfg(feature = "streaming")]
    async fn start_stream_server(&mut self) -> Result<Option<tokio::task::JoinHandle<()>>> {
        let Some(server) = self.stream_server.take() else {
            return Ok(None);
        };

        self.set_component_state("sse", ComponentState::Starting)
            .await;
        match server.start().await {
            Ok((addr, task)) => {
                info!("SSE endpoint available at http://{}/events", addr);
                self.set_component_state("sse", ComponentState::Running)
                    .await;
                Ok(Some(task))
            }
            Err(e) => {
                self.set_component_state("sse", ComponentState::Failed)
                    .await;
                Err(e)
            }
        }
    }

    /// Turn SIGINT/SIGTERM into cancellation of the shared token
    fn setup_signal_handlers(token: CancellationToken) {
        // Handle SIGTERM (systemd stop) - Unix only
        #[cfg(unix)]
        {
            let token = token.clone();
            tokio::spawn(async move {
                let mut sigterm =
                    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                        Ok(sigterm) => sigterm,
                        Err(e) => {
                            warn!("Failed to register SIGTERM handler: {}", e);
                            return;
                        }
                    };

                tokio::select! {
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM signal");
                        token.cancel();
                    }
                    _ = token.cancelled() => {}
                }
            });
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        tokio::spawn(async move {
            tokio::select! {
                result = signal::ctrl_c() => {
                    if result.is_ok() {
                        info!("Received SIGINT signal (Ctrl+C)");
                        token.cancel();
                    }
                }
                _ = token.cancelled() => {}
            }
        });
    }
}
