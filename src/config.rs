use crate::burst::DeactivationRule;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ScenewatchConfig {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub burst: BurstConfig,
    #[serde(default)]
    pub rate: RateConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Frame width in pixels
    #[serde(default = "default_camera_width")]
    pub width: u32,

    /// Frame height in pixels
    #[serde(default = "default_camera_height")]
    pub height: u32,

    /// Capture frames per second
    #[serde(default = "default_camera_fps")]
    pub fps: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DetectionConfig {
    /// Number of inference worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum frames in flight
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Upper bound on a single frame's inference time
    #[serde(default = "default_detection_timeout_ms")]
    pub timeout_ms: u64,

    /// Consecutive timeouts before the pipeline is considered stuck
    #[serde(default = "default_stall_limit")]
    pub stall_limit: u32,

    /// Artificial per-frame latency of the scripted detector
    #[serde(default)]
    pub simulated_latency_ms: u64,

    /// JSON-lines detection script replayed by the bundled detector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_path: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BurstConfig {
    /// Enable unthrottled analysis when new activity enters the scene
    #[serde(default = "default_burst_enabled")]
    pub enabled: bool,

    /// Which frames end a burst
    #[serde(default)]
    pub deactivation: DeactivationRule,

    /// Delay between frames while a burst is active
    #[serde(default = "default_minimal_floor_ms")]
    pub minimal_floor_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RateConfig {
    /// Analysis frames per second outside of bursts
    #[serde(default = "default_target_fps")]
    pub target_fps: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TrackerConfig {
    /// Farthest a same-type object may move between frames and keep its identity
    #[serde(default = "default_max_match_distance")]
    pub max_match_distance: f32,

    /// Average movement (pixels) below which an object counts as stationary
    #[serde(default = "default_stationary_threshold")]
    pub stationary_threshold: f32,

    /// Positions required before stationarity is decided
    #[serde(default = "default_stationary_history")]
    pub stationary_history: usize,

    /// Frames an object may go unseen before it is forgotten
    #[serde(default = "default_max_missed_frames")]
    pub max_missed_frames: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Interval between status heartbeat log lines
    #[serde(default = "default_heartbeat_seconds")]
    pub heartbeat_seconds: u64,

    /// Log a warning when the measured frame rate drops below this
    #[serde(default = "default_min_fps_warning")]
    pub min_fps_warning: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NotificationConfig {
    /// Per-channel bound on a single delivery
    #[serde(default = "default_channel_timeout_ms")]
    pub channel_timeout_ms: u64,

    /// Events buffered per channel before new ones are dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Attach the encoded frame as base64
    #[serde(default)]
    pub include_image: bool,

    #[serde(default)]
    pub stdio: StdioConfig,

    #[serde(default)]
    pub file: FileSinkConfig,

    #[serde(default)]
    pub sse: SseConfig,

    #[serde(default)]
    pub webhook: WebhookConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct StdioConfig {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FileSinkConfig {
    #[serde(default)]
    pub enabled: bool,

    /// JSON-lines file events are appended to
    #[serde(default = "default_notification_file_path")]
    pub path: String,

    /// Minimum wait before reopening a failed file
    #[serde(default = "default_file_retry_seconds")]
    pub retry_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SseConfig {
    #[serde(default)]
    pub enabled: bool,

    /// IP address to bind to
    #[serde(default = "default_sse_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_sse_port")]
    pub port: u16,

    /// Events buffered per subscriber before it is disconnected
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebhookConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Callback URL receiving POSTed events
    #[serde(default)]
    pub url: String,

    /// HTTP request timeout
    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,

    /// Additional attempts after a failed POST (0 = no retry)
    #[serde(default)]
    pub max_retries: u32,

    /// Linear backoff step between attempts
    #[serde(default = "default_webhook_backoff_ms")]
    pub backoff_ms: u64,
}

impl ScenewatchConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("scenewatch.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.width", default_camera_width() as i64)?
            .set_default("camera.height", default_camera_height() as i64)?
            .set_default("camera.fps", default_camera_fps() as i64)?
            .set_default("detection.workers", default_workers() as i64)?
            .set_default("detection.queue_depth", default_queue_depth() as i64)?
            .set_default("detection.timeout_ms", default_detection_timeout_ms() as i64)?
            .set_default("detection.stall_limit", default_stall_limit() as i64)?
            .set_default("burst.enabled", default_burst_enabled())?
            .set_default("burst.minimal_floor_ms", default_minimal_floor_ms() as i64)?
            .set_default("rate.target_fps", default_target_fps())?
            .set_default(
                "tracker.max_match_distance",
                default_max_match_distance() as f64,
            )?
            .set_default(
                "tracker.stationary_threshold",
                default_stationary_threshold() as f64,
            )?
            .set_default(
                "tracker.stationary_history",
                default_stationary_history() as i64,
            )?
            .set_default("tracker.max_missed_frames", default_max_missed_frames() as i64)?
            .set_default("system.heartbeat_seconds", default_heartbeat_seconds() as i64)?
            .set_default("system.min_fps_warning", default_min_fps_warning())?
            .set_default(
                "notifications.channel_timeout_ms",
                default_channel_timeout_ms() as i64,
            )?
            .set_default(
                "notifications.queue_capacity",
                default_queue_capacity() as i64,
            )?
            .set_default("notifications.file.path", default_notification_file_path())?
            .set_default("notifications.sse.ip", default_sse_ip())?
            .set_default("notifications.sse.port", default_sse_port() as i64)?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Environment variables, e.g. SCENEWATCH_RATE__TARGET_FPS=2
            .add_source(
                Environment::with_prefix("SCENEWATCH")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: ScenewatchConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        if !(1..=16).contains(&self.detection.workers) {
            return Err(ConfigError::Message(format!(
                "Invalid detection workers: {} (must be 1-16)",
                self.detection.workers
            )));
        }

        if !(1..=100).contains(&self.detection.queue_depth) {
            return Err(ConfigError::Message(format!(
                "Invalid detection queue_depth: {} (must be 1-100)",
                self.detection.queue_depth
            )));
        }

        if self.detection.timeout_ms == 0 || self.detection.stall_limit == 0 {
            return Err(ConfigError::Message(
                "Detection timeout_ms and stall_limit must be greater than 0".to_string(),
            ));
        }

        let rate = self.rate.target_fps;
        if !rate.is_finite() || rate <= 0.0 || rate > 100.0 {
            return Err(ConfigError::Message(format!(
                "Invalid rate target_fps: {} (must be 0.01-100)",
                rate
            )));
        }

        if self.burst.minimal_floor_ms == 0 {
            return Err(ConfigError::Message(
                "Burst minimal_floor_ms must be at least 1".to_string(),
            ));
        }

        if self.tracker.stationary_history < 2 {
            return Err(ConfigError::Message(
                "Tracker stationary_history must be at least 2".to_string(),
            ));
        }

        if self.notifications.queue_capacity == 0 {
            return Err(ConfigError::Message(
                "Notification queue_capacity must be greater than 0".to_string(),
            ));
        }

        if self.notifications.file.enabled && self.notifications.file.path.is_empty() {
            return Err(ConfigError::Message(
                "File notifications enabled but no path configured".to_string(),
            ));
        }

        if self.notifications.sse.enabled && self.notifications.sse.port == 0 {
            return Err(ConfigError::Message(
                "SSE notifications enabled but port is 0".to_string(),
            ));
        }

        if self.notifications.webhook.enabled && self.notifications.webhook.url.is_empty() {
            return Err(ConfigError::Message(
                "Webhook notifications enabled but no url configured".to_string(),
            ));
        }

        Ok(())
    }
}

impl DetectionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl BurstConfig {
    pub fn minimal_floor(&self) -> Duration {
        Duration::from_millis(self.minimal_floor_ms)
    }
}

impl NotificationConfig {
    /// Whether at least one channel is switched on
    pub fn any_enabled(&self) -> bool {
        self.stdio.enabled || self.file.enabled || self.sse.enabled || self.webhook.enabled
    }

    pub fn channel_timeout(&self) -> Duration {
        Duration::from_millis(self.channel_timeout_ms)
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: default_camera_width(),
            height: default_camera_height(),
            fps: default_camera_fps(),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_depth: default_queue_depth(),
            timeout_ms: default_detection_timeout_ms(),
            stall_limit: default_stall_limit(),
            simulated_latency_ms: 0,
            script_path: None,
        }
    }
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            enabled: default_burst_enabled(),
            deactivation: DeactivationRule::default(),
            minimal_floor_ms: default_minimal_floor_ms(),
        }
    }
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            target_fps: default_target_fps(),
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_match_distance: default_max_match_distance(),
            stationary_threshold: default_stationary_threshold(),
            stationary_history: default_stationary_history(),
            max_missed_frames: default_max_missed_frames(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            heartbeat_seconds: default_heartbeat_seconds(),
            min_fps_warning: default_min_fps_warning(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel_timeout_ms: default_channel_timeout_ms(),
            queue_capacity: default_queue_capacity(),
            include_image: false,
            stdio: StdioConfig::default(),
            file: FileSinkConfig::default(),
            sse: SseConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_notification_file_path(),
            retry_seconds: default_file_retry_seconds(),
        }
    }
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ip: default_sse_ip(),
            port: default_sse_port(),
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            timeout_ms: default_webhook_timeout_ms(),
            max_retries: 0,
            backoff_ms: default_webhook_backoff_ms(),
        }
    }
}

// Default value functions
fn default_camera_width() -> u32 {
    640
}
fn default_camera_height() -> u32 {
    480
}
fn default_camera_fps() -> u32 {
    30
}

fn default_workers() -> usize {
    1
}
fn default_queue_depth() -> usize {
    10
}
fn default_detection_timeout_ms() -> u64 {
    5000
}
fn default_stall_limit() -> u32 {
    5
}

fn default_burst_enabled() -> bool {
    true
}
fn default_minimal_floor_ms() -> u64 {
    1
}

fn default_target_fps() -> f64 {
    1.0
}

fn default_max_match_distance() -> f32 {
    100.0
}
fn default_stationary_threshold() -> f32 {
    10.0
}
fn default_stationary_history() -> usize {
    3
}
fn default_max_missed_frames() -> u32 {
    30
}

fn default_heartbeat_seconds() -> u64 {
    60
}
fn default_min_fps_warning() -> f64 {
    0.5
}

fn default_channel_timeout_ms() -> u64 {
    5000
}
fn default_queue_capacity() -> usize {
    64
}
fn default_notification_file_path() -> String {
    "/tmp/object_notifications.json".to_string()
}
fn default_file_retry_seconds() -> u64 {
    30
}
fn default_sse_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_sse_port() -> u16 {
    8081
}
fn default_subscriber_buffer() -> usize {
    32
}
fn default_webhook_timeout_ms() -> u64 {
    5000
}
fn default_webhook_backoff_ms() -> u64 {
    500
}
