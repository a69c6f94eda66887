use crate::detection::Detection;
use crate::error::DetectionError;
use crate::frame::Frame;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

/// Reference to an in-flight frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskHandle {
    pub(crate) id: u64,
    seq: u64,
}

impl TaskHandle {
    pub(crate) fn new(id: u64, seq: u64) -> Self {
        Self { id, seq }
    }

    /// Sequence number of the submitted frame
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Completed detection for one frame
#[derive(Debug, Clone)]
pub struct FrameResult {
    pub frame: Frame,
    /// Detections, or the failure marker for this frame
    pub outcome: Result<Vec<Detection>, DetectionError>,
    /// Time the backend spent on this frame
    pub processing_time: Duration,
    /// Capture-to-consumption time
    pub latency: Duration,
}

impl FrameResult {
    /// Detections, treating a failed frame as empty
    pub fn detections(&self) -> &[Detection] {
        match &self.outcome {
            Ok(detections) => detections,
            Err(_) => &[],
        }
    }

    pub fn is_failure(&self) -> bool {
        self.outcome.is_err()
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.outcome, Err(DetectionError::Timeout(_)))
    }
}

/// Non-blocking check result
#[derive(Debug)]
pub enum TaskPoll {
    Ready(FrameResult),
    Pending,
}

impl TaskPoll {
    pub fn is_pending(&self) -> bool {
        matches!(self, TaskPoll::Pending)
    }
}

/// Worker answer for a single job
#[derive(Debug)]
pub(crate) struct WorkerReply {
    pub outcome: Result<Vec<Detection>, DetectionError>,
    pub processing_time: Duration,
}

/// Set by the worker when it starts running a job
pub(crate) type StartMark = Arc<OnceLock<Instant>>;

/// A submitted frame and the pending handle to its result.
///
/// The detection bound runs from the moment a worker starts the frame, so
/// time spent queued behind other frames does not count. A frame that
/// reaches the front of the queue without being picked up (every worker
/// busy on abandoned jobs) is timed from when it became the front.
pub(crate) struct FrameTask {
    pub id: u64,
    frame: Frame,
    submitted_at: Instant,
    started: StartMark,
    front_since: Option<Instant>,
    reply: oneshot::Receiver<WorkerReply>,
    ready: Option<WorkerReply>,
}

impl FrameTask {
    pub fn new(
        id: u64,
        frame: Frame,
        started: StartMark,
        reply: oneshot::Receiver<WorkerReply>,
    ) -> Self {
        Self {
            id,
            frame,
            submitted_at: Instant::now(),
            started,
            front_since: None,
            reply,
            ready: None,
        }
    }

    pub fn seq(&self) -> u64 {
        self.frame.seq
    }

    /// Record that every earlier task has been consumed
    pub fn mark_front(&mut self) {
        self.front_since.get_or_insert_with(Instant::now);
    }

    /// Start of the detection bound, if it is running yet
    fn clock_start(&self) -> Option<Instant> {
        self.started.get().copied().or(self.front_since)
    }

    fn remaining(&self, timeout: Duration) -> Duration {
        match self.clock_start() {
            Some(start) => timeout.saturating_sub(start.elapsed()),
            None => timeout,
        }
    }

    /// Collect the worker's answer if it is available, or give up on the
    /// task once `timeout` has passed since its clock started.
    pub fn try_complete(&mut self, timeout: Duration) -> bool {
        if self.ready.is_some() {
            return true;
        }

        match self.reply.try_recv() {
            Ok(reply) => self.ready = Some(reply),
            Err(TryRecvError::Closed) => self.ready = Some(self.lost()),
            Err(TryRecvError::Empty) => {
                if self.clock_start().is_some_and(|start| start.elapsed() >= timeout) {
                    self.ready = Some(timed_out(timeout));
                }
            }
        }

        self.ready.is_some()
    }

    /// Wait for the worker's answer, bounded by what remains of `timeout`.
    /// A worker picking the frame up mid-wait pushes the deadline back.
    pub async fn complete(&mut self, timeout: Duration) {
        while !self.try_complete(timeout) {
            let remaining = self.remaining(timeout);
            match tokio::time::timeout(remaining, &mut self.reply).await {
                Ok(Ok(reply)) => self.ready = Some(reply),
                Ok(Err(_)) => self.ready = Some(self.lost()),
                // Re-checked against the latest clock start
                Err(_) => {}
            }
        }
    }

    /// Turn a completed task into its result. Pending tasks are reported as
    /// lost.
    pub fn into_result(self) -> FrameResult {
        let reply = match self.ready {
            Some(reply) => reply,
            None => WorkerReply {
                outcome: Err(DetectionError::WorkerLost),
                processing_time: self.submitted_at.elapsed(),
            },
        };

        FrameResult {
            latency: self.frame.captured_at.elapsed(),
            frame: self.frame,
            outcome: reply.outcome,
            processing_time: reply.processing_time,
        }
    }

    fn lost(&self) -> WorkerReply {
        WorkerReply {
            outcome: Err(DetectionError::WorkerLost),
            processing_time: self.submitted_at.elapsed(),
        }
    }
}

fn timed_out(timeout: Duration) -> WorkerReply {
    WorkerReply {
        outcome: Err(DetectionError::Timeout(timeout)),
        processing_time: timeout,
    }
}
