/// Component lifecycle states
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// Why the detection loop stopped
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    /// Shutdown token cancelled (signal or caller)
    Cancelled,
    /// The frame source has no more frames
    SourceExhausted,
    /// `--max-frames` reached
    FrameLimit(u64),
}

/// Totals reported when the detection loop exits
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSummary {
    pub reason: ShutdownReason,
    pub frames_captured: u64,
    pub frames_processed: u64,
    pub capture_failures: u64,
    pub notifications: u64,
}
