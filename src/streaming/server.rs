use crate::{
    config::SseConfig,
    error::{Result, ScenewatchError, StreamError},
    status::PipelineStatus,
};
use axum::{http::Method, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use super::broadcaster::SseBroadcaster;
use super::handlers::{events_handler, health_handler, status_handler};

/// Shared state for the Axum server
#[derive(Clone)]
pub struct ServerState {
    pub(crate) broadcaster: SseBroadcaster,
    pub(crate) status: Arc<PipelineStatus>,
    pub(crate) shutdown: CancellationToken,
}

/// HTTP server exposing the SSE event stream and pipeline status
pub struct StreamServer {
    pub(crate) config: SseConfig,
    state: ServerState,
}

impl StreamServer {
    pub fn new(
        config: SseConfig,
        broadcaster: SseBroadcaster,
        status: Arc<PipelineStatus>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            state: ServerState {
                broadcaster,
                status,
                shutdown,
            },
        }
    }

    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET]);

        Router::new()
            .route("/events", get(events_handler))
            .route("/status", get(status_handler))
            .route("/health", get(health_handler))
            .layer(cors)
            .with_state(self.state.clone())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.config.ip, self.config.port)
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.address();

        TcpListener::bind(&addr).await.map_err(|e| {
            ScenewatchError::Stream(StreamError::BindFailed {
                address: addr,
                source: e,
            })
        })
    }

    /// Serve on an already bound listener until the shutdown token fires
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let app = self.router();
        let shutdown = self.state.shutdown.clone();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| StreamError::ServerFailed {
                details: format!("Server error: {}", e),
            })?;

        info!("SSE server stopped");
        Ok(())
    }

    /// Bind and serve in a background task. Returns the bound address.
    pub async fn start(self) -> Result<(SocketAddr, JoinHandle<()>)> {
        let listener = self.bind().await?;
        let local = listener.local_addr().map_err(|e| StreamError::BindFailed {
            address: self.address(),
            source: e,
        })?;

        info!("SSE server listening on {}", local);

        let task = tokio::spawn(async move {
            if let Err(e) = self.serve(listener).await {
                error!("SSE server failed: {}", e);
            }
        });

        Ok((local, task))
    }
}

/// Stream server builder for configuration
pub struct StreamServerBuilder {
    config: Option<SseConfig>,
    broadcaster: Option<SseBroadcaster>,
    status: Option<Arc<PipelineStatus>>,
    shutdown: Option<CancellationToken>,
}

impl StreamServerBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            broadcaster: None,
            status: None,
            shutdown: None,
        }
    }

    pub fn config(mut self, config: SseConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn broadcaster(mut self, broadcaster: SseBroadcaster) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn status(mut self, status: Arc<PipelineStatus>) -> Self {
        self.status = Some(status);
        self
    }

    pub fn shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn build(self) -> Result<StreamServer> {
        let config = self.config.ok_or_else(|| {
            ScenewatchError::Stream(StreamError::ServerFailed {
                details: "SSE configuration is required".to_string(),
            })
        })?;

        let status = self.status.ok_or_else(|| {
            ScenewatchError::Stream(StreamError::ServerFailed {
                details: "Pipeline status is required".to_string(),
            })
        })?;

        let broadcaster = self
            .broadcaster
            .unwrap_or_else(|| SseBroadcaster::new(config.subscriber_buffer));

        Ok(StreamServer::new(
            config,
            broadcaster,
            status,
            self.shutdown.unwrap_or_default(),
        ))
    }
}

impl Default for StreamServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
