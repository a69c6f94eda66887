pub mod app;
pub mod burst;
pub mod collaborators;
pub mod config;
pub mod detection;
pub mod dispatcher;
pub mod error;
pub mod frame;
pub mod notify;
pub mod rate;
pub mod status;

#[cfg(feature = "streaming")]
pub mod streaming;

pub use app::{
    ComponentState, DetectionPipeline, PipelineSummary, ScenewatchOrchestrator, ShutdownReason,
};
pub use burst::{
    BurstController, BurstMode, BurstState, BurstTransition, BurstTrigger, DeactivationRule,
};
pub use collaborators::{
    CentroidTracker, DetectionBackend, FrameSource, ObjectTracker, ScriptedDetector,
    SyntheticFrameSource,
};
pub use config::ScenewatchConfig;
pub use detection::{BoundingBox, Detection};
pub use dispatcher::{FrameDispatcher, FrameResult, TaskHandle, TaskPoll};
pub use error::{
    CaptureError, ChannelError, DetectionError, DispatchError, Result, ScenewatchError,
};
pub use frame::{Frame, FrameFormat};
pub use notify::{
    FileChannel, NotificationChannel, NotificationDispatcher, NotificationEvent, StdioChannel,
    WebhookChannel,
};
pub use rate::{compute_delay, RateLimiter};
pub use status::{ObjectCount, PerformanceMonitor, PipelineStatus, StatusSnapshot};

#[cfg(feature = "streaming")]
pub use streaming::{SseBroadcaster, SseChannel, StreamServer, StreamServerBuilder};
