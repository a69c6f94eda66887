mod orchestrator;
mod pipeline;
mod runtime;
mod state;
mod types;


pub use orchestrator::ScenewatchOrchestrator;
pub use pipeline::{DetectionPipeline, PipelineSettings};
pub use types::{ComponentState, PipelineSummary, ShutdownReason};
