use super::pipeline::{DetectionPipeline, PipelineSettings};
use super::types::ComponentState;
use crate::burst::BurstController;
use crate::collaborators::{
    CentroidTracker, DetectionBackend, FrameSource, ScriptedDetector, SyntheticFrameSource,
};
use crate::config::ScenewatchConfig;
use crate::dispatcher::FrameDispatcher;
use crate::error::Result;
use crate::notify::{channels_from_config, NotificationDispatcher};
use crate::rate::RateLimiter;
use crate::status::PipelineStatus;
#[cfg(feature = "streaming")]
use crate::streaming::{SseBroadcaster, SseChannel, StreamServer, StreamServerBuilder};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Main application coordinator: wires the collaborators, the detection
/// pipeline and the optional SSE server from one configuration.
pub struct ScenewatchOrchestrator {
    pub(super) config: ScenewatchConfig,
    pub(super) status: Arc<PipelineStatus>,
    pub(super) pipeline: Option<DetectionPipeline>,
    #[cfg(feature = "streaming")]
    pub(super) stream_server: Option<StreamServer>,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) cancellation_token: CancellationToken,
}

impl ScenewatchOrchestrator {
    /// Create an orchestrator backed by the bundled synthetic source and
    /// scripted detector
    pub async fn new(config: ScenewatchConfig, max_frames: Option<u64>) -> Result<Self> {
        let source = SyntheticFrameSource::new(&config.camera);

        let detector = match &config.detection.script_path {
            Some(path) => ScriptedDetector::load(path)?,
            None => {
                warn!("No detection script configured, every frame will report no objects");
                ScriptedDetector::empty()
            }
        }
        .with_latency(Duration::from_millis(config.detection.simulated_latency_ms));

        Self::with_components(config, Box::new(source), Arc::new(detector), max_frames)
    }

    /// Create an orchestrator around caller-supplied capture and detection
    pub fn with_components(
        config: ScenewatchConfig,
        source: Box<dyn FrameSource>,
        backend: Arc<dyn DetectionBackend>,
        max_frames: Option<u64>,
    ) -> Result<Self> {
        let cancellation_token = CancellationToken::new();

        let dispatcher = FrameDispatcher::new(&config.detection, backend)?;
        let burst = BurstController::new(&config.burst);
        let status = Arc::new(PipelineStatus::new(
            burst.state(),
            dispatcher.in_flight_counter(),
            dispatcher.capacity(),
            config.rate.target_fps,
        ));

        #[allow(unused_mut)]
        let mut channels = channels_from_config(&config.notifications);

        #[cfg(feature = "streaming")]
        let stream_server = if config.notifications.sse.enabled {
            let broadcaster = SseBroadcaster::new(config.notifications.sse.subscriber_buffer);
            channels.push(Arc::new(SseChannel::new(broadcaster.clone())));
            Some(
                StreamServerBuilder::new()
                    .config(config.notifications.sse.clone())
                    .broadcaster(broadcaster)
                    .status(Arc::clone(&status))
                    .shutdown(cancellation_token.clone())
                    .build()?,
            )
        } else {
            None
        };

        #[cfg(not(feature = "streaming"))]
        if config.notifications.sse.enabled {
            warn!("SSE notifications requested but streaming support is not compiled in");
        }

        let notifier = NotificationDispatcher::builder()
            .channels(channels)
            .channel_timeout(config.notifications.channel_timeout())
            .queue_capacity(config.notifications.queue_capacity)
            .build();

        if !notifier.is_enabled() {
            info!("No notification channels enabled");
        }

        let pipeline = DetectionPipeline::new(
            source,
            dispatcher,
            Box::new(CentroidTracker::new(&config.tracker)),
            burst,
            RateLimiter::new(&config.rate, &config.burst),
            notifier,
            Arc::clone(&status),
            PipelineSettings::from_config(&config, max_frames),
            cancellation_token.clone(),
        );

        Ok(Self {
            config,
            status,
            pipeline: Some(pipeline),
            #[cfg(feature = "streaming")]
            stream_server,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            cancellation_token,
        })
    }

    pub fn config(&self) -> &ScenewatchConfig {
        &self.config
    }

    /// Live pipeline status, shared with the status endpoint
    pub fn status(&self) -> Arc<PipelineStatus> {
        Arc::clone(&self.status)
    }

    /// Cancelling this token stops the pipeline and the server
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }
}
