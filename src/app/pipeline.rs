use super::types::{PipelineSummary, ShutdownReason};
use crate::burst::BurstController;
use crate::collaborators::{FrameSource, ObjectTracker};
use crate::config::ScenewatchConfig;
use crate::dispatcher::{FrameDispatcher, FrameResult};
use crate::error::{CaptureError, DispatchError, Result};
use crate::frame::Frame;
use crate::notify::{NotificationDispatcher, NotificationEvent};
use crate::rate::RateLimiter;
use crate::status::PipelineStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pause after a failed capture before trying the next cycle
const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Loop tunables that are not owned by a component
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub heartbeat: Duration,
    pub min_fps_warning: f64,
    pub include_image: bool,
    pub max_frames: Option<u64>,
    pub shutdown_grace: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &ScenewatchConfig, max_frames: Option<u64>) -> Self {
        Self {
            heartbeat: Duration::from_secs(config.system.heartbeat_seconds.max(1)),
            min_fps_warning: config.system.min_fps_warning,
            include_image: config.notifications.include_image,
            max_frames,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// The capture → detect → burst → notify → pace loop.
///
/// While burst mode is inactive each frame's result is awaited before the
/// rate delay, so the pacing always reflects the latest processing time.
/// In burst mode frames are pipelined up to the dispatcher depth and only
/// results that are already complete are harvested each cycle.
pub struct DetectionPipeline {
    source: Box<dyn FrameSource>,
    dispatcher: FrameDispatcher,
    tracker: Box<dyn ObjectTracker>,
    burst: BurstController,
    limiter: RateLimiter,
    notifier: NotificationDispatcher,
    status: Arc<PipelineStatus>,
    settings: PipelineSettings,
    shutdown: CancellationToken,

    last_processing: Duration,
    frames_captured: u64,
    capture_failures: u64,
    notifications: u64,
}

impl DetectionPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Box<dyn FrameSource>,
        dispatcher: FrameDispatcher,
        tracker: Box<dyn ObjectTracker>,
        burst: BurstController,
        limiter: RateLimiter,
        notifier: NotificationDispatcher,
        status: Arc<PipelineStatus>,
        settings: PipelineSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            dispatcher,
            tracker,
            burst,
            limiter,
            notifier,
            status,
            settings,
            shutdown,
            last_processing: Duration::ZERO,
            frames_captured: 0,
            capture_failures: 0,
            notifications: 0,
        }
    }

    pub fn status(&self) -> Arc<PipelineStatus> {
        Arc::clone(&self.status)
    }

    /// Run until cancelled, the source is exhausted or the frame limit is
    /// reached. In-flight frames are drained before returning; a stalled
    /// backend is returned as an error after the same cleanup.
    pub async fn run(mut self) -> Result<PipelineSummary> {
        info!(
            "Detection pipeline started (source: {}, notification channels: {:?})",
            self.source.source_name(),
            self.notifier.channel_names()
        );

        let outcome = self.run_loop().await;

        self.finish().await;

        let reason = outcome?;
        Ok(PipelineSummary {
            reason,
            frames_captured: self.frames_captured,
            frames_processed: self.status.frames_processed(),
            capture_failures: self.capture_failures,
            notifications: self.notifications,
        })
    }

    async fn run_loop(&mut self) -> Result<ShutdownReason> {
        let mut last_heartbeat = Instant::now();

        loop {
            if self.shutdown.is_cancelled() {
                return Ok(ShutdownReason::Cancelled);
            }

            if let Some(limit) = self.settings.max_frames {
                if self.frames_captured >= limit {
                    info!("Frame limit of {} reached", limit);
                    return Ok(ShutdownReason::FrameLimit(limit));
                }
            }

            let captured = tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(ShutdownReason::Cancelled),
                captured = self.source.capture() => captured,
            };

            match captured {
                Ok(frame) => {
                    self.frames_captured += 1;
                    self.submit(frame).await?;
                    self.collect_results().await?;
                }
                Err(CaptureError::Exhausted) => {
                    info!("Frame source exhausted");
                    return Ok(ShutdownReason::SourceExhausted);
                }
                Err(e) => {
                    self.capture_failures += 1;
                    warn!("Frame capture failed, skipping cycle: {}", e);
                    if !self.pause(CAPTURE_RETRY_DELAY).await {
                        return Ok(ShutdownReason::Cancelled);
                    }
                    continue;
                }
            }

            if last_heartbeat.elapsed() >= self.settings.heartbeat {
                self.heartbeat();
                last_heartbeat = Instant::now();
            }

            self.limiter.set_target_rate(self.status.target_rate());
            let delay = self.limiter.delay(self.burst.mode(), self.last_processing);
            if !self.pause(delay).await {
                return Ok(ShutdownReason::Cancelled);
            }
        }
    }

    /// Submit a frame, waiting on the oldest task while the queue is full
    async fn submit(&mut self, frame: Frame) -> Result<()> {
        loop {
            match self.dispatcher.submit(frame.clone()) {
                Ok(handle) => {
                    debug!("Submitted frame {}", handle.seq());
                    return Ok(());
                }
                Err(DispatchError::CapacityExceeded { depth }) => {
                    debug!("Dispatcher full ({} in flight), waiting on oldest", depth);
                    if let Some(result) = self.dispatcher.wait_oldest().await? {
                        self.handle_result(result, true);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn collect_results(&mut self) -> Result<()> {
        if !self.burst.mode().is_active() {
            if let Some(result) = self.dispatcher.wait_oldest().await? {
                self.handle_result(result, true);
            }
        }

        while let Some(result) = self.dispatcher.try_next()? {
            self.handle_result(result, true);
        }

        Ok(())
    }

    /// Tracker → status → burst → notification for one completed frame
    fn handle_result(&mut self, result: FrameResult, notify: bool) {
        let seq = result.frame.seq;

        if let Err(e) = &result.outcome {
            warn!("Detection failed for frame {}: {}", seq, e);
        }

        let detections = self.tracker.update(result.detections().to_vec());
        self.status
            .record_frame(result.processing_time, &detections, result.is_failure());
        self.last_processing = result.processing_time;

        debug!(
            frame = seq,
            objects = detections.len(),
            processing_ms = result.processing_time.as_millis() as u64,
            latency_ms = result.latency.as_millis() as u64,
            "Frame processed"
        );

        self.burst.observe(&detections);

        if !notify || !self.notifier.is_enabled() {
            return;
        }

        let Some(event) = NotificationEvent::from_frame(
            &result.frame,
            &detections,
            self.status.snapshot(),
            self.settings.include_image,
        ) else {
            return;
        };

        info!(
            frame = seq,
            object = %event.object.label,
            confidence = event.object.confidence,
            "New object detected"
        );

        if self.notifier.dispatch(event) > 0 {
            self.notifications += 1;
            self.status.record_notification();
        }
    }

    fn heartbeat(&self) {
        let snapshot = self.status.snapshot();
        info!(
            fps = snapshot.fps,
            processing_ms = snapshot.processing_ms,
            in_flight = snapshot.in_flight,
            burst_active = snapshot.burst_active,
            frames_processed = snapshot.frames_processed,
            detection_failures = snapshot.detection_failures,
            "Pipeline heartbeat"
        );

        if let Some(fps) = self.status.performance_warning(self.settings.min_fps_warning) {
            warn!(
                "Processing rate {:.2} fps is below the {:.2} fps warning threshold",
                fps, self.settings.min_fps_warning
            );
        }
    }

    /// Sleep for `delay`, yielding when it is zero. False if cancelled.
    async fn pause(&self, delay: Duration) -> bool {
        if delay.is_zero() {
            tokio::task::yield_now().await;
            return !self.shutdown.is_cancelled();
        }

        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Drain in-flight frames without notifying, then stop workers and lanes
    async fn finish(&mut self) {
        let pending = self.dispatcher.in_flight();
        if pending > 0 {
            info!("Draining {} in-flight frames", pending);
        }

        match self.dispatcher.drain().await {
            Ok(results) => {
                for result in results {
                    self.handle_result(result, false);
                }
            }
            Err(e) => error!("Failed to drain in-flight frames: {}", e),
        }

        self.dispatcher.shutdown(self.settings.shutdown_grace).await;
        self.notifier.shutdown(self.settings.shutdown_grace).await;

        for stats in self.notifier.stats() {
            info!(
                channel = %stats.name,
                delivered = stats.delivered,
                failed = stats.failed,
                dropped = stats.dropped,
                degraded = stats.degraded,
                "Notification channel summary"
            );
        }
    }
}
