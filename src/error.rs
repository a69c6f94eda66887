use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScenewatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Frame dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Notification error: {0}")]
    Notification(#[from] ChannelError),

    #[error("Stream server error: {0}")]
    Stream(#[from] StreamError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl ScenewatchError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Errors surfaced by the frame dispatcher's submit/poll/wait contract
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Backpressure signal: the caller must wait on the oldest task first
    #[error("Frame queue at capacity ({depth} frames in flight)")]
    CapacityExceeded { depth: usize },

    #[error("Task {requested} cannot complete before task {expected}")]
    OutOfOrder { expected: u64, requested: u64 },

    #[error("No in-flight task with id {id}")]
    UnknownTask { id: u64 },

    #[error("Detection stalled: {consecutive} consecutive frames timed out")]
    Stalled { consecutive: u32 },

    #[error("Frame dispatcher is shut down")]
    ShutDown,
}

/// Per-frame detection failures, carried inside the frame result
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    #[error("Detection backend failed: {0}")]
    Backend(String),

    #[error("Detection timed out after {0:?}")]
    Timeout(Duration),

    #[error("Detection worker dropped the task")]
    WorkerLost,

    #[error("Detection backend panicked: {0}")]
    Panicked(String),
}

/// Frame source failures
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Camera unavailable: {0}")]
    Unavailable(String),

    #[error("Frame source exhausted")]
    Exhausted,
}

/// Failures of a single notification channel
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("I/O failure on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize notification: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Channel degraded, next attempt in {retry_in:?}")]
    Degraded { retry_in: Duration },

    #[error("Webhook returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("Webhook transport failure: {0}")]
    Transport(String),

    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("Channel worker closed")]
    Closed,
}

/// SSE/status server failures
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Failed to bind {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server failed: {details}")]
    ServerFailed { details: String },
}

pub type Result<T> = std::result::Result<T, ScenewatchError>;
