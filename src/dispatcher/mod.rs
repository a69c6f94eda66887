//! Bounded, order-preserving frame submission to the detection backend.
//!
//! Frames are handed to a pool of `W` worker threads. At most `D` frames are
//! in flight; `submit` fails fast with [`DispatchError::CapacityExceeded`]
//! beyond that and the caller is expected to wait on the oldest task.
//! Results are released strictly in submission order: a frame that finishes
//! early is held until every frame submitted before it has been consumed.

mod pool;
mod task;

pub use task::{FrameResult, TaskHandle, TaskPoll};

use crate::collaborators::DetectionBackend;
use crate::config::DetectionConfig;
use crate::error::{DispatchError, ScenewatchError};
use crate::frame::Frame;
use pool::{Job, WorkerPool};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use task::{FrameTask, StartMark};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

pub struct FrameDispatcher {
    pool: WorkerPool,
    queue: VecDeque<FrameTask>,
    depth: usize,
    timeout: Duration,
    stall_limit: u32,
    consecutive_timeouts: u32,
    next_id: u64,
    in_flight: Arc<AtomicUsize>,
    shut_down: bool,
}

impl FrameDispatcher {
    pub fn new(
        config: &DetectionConfig,
        backend: Arc<dyn DetectionBackend>,
    ) -> Result<Self, ScenewatchError> {
        let depth = config.queue_depth.max(1);
        let workers = config.workers.max(1);

        let pool = WorkerPool::spawn(workers, depth, backend)?;

        info!(
            "Frame dispatcher ready (workers: {}, queue depth: {}, timeout: {:?})",
            workers,
            depth,
            config.timeout()
        );

        Ok(Self {
            pool,
            queue: VecDeque::with_capacity(depth),
            depth,
            timeout: config.timeout(),
            stall_limit: config.stall_limit.max(1),
            consecutive_timeouts: 0,
            next_id: 0,
            in_flight: Arc::new(AtomicUsize::new(0)),
            shut_down: false,
        })
    }

    /// Hand a frame to the worker pool. Returns immediately.
    pub fn submit(&mut self, frame: Frame) -> Result<TaskHandle, DispatchError> {
        if self.shut_down {
            return Err(DispatchError::ShutDown);
        }

        if self.queue.len() >= self.depth {
            return Err(DispatchError::CapacityExceeded { depth: self.depth });
        }

        let id = self.next_id;
        let seq = frame.seq;
        let (reply_tx, reply_rx) = oneshot::channel();
        let started: StartMark = Arc::default();

        self.pool
            .submit(Job {
                id,
                frame: frame.clone(),
                started: Arc::clone(&started),
                reply: reply_tx,
            })
            .map_err(|e| match e {
                DispatchError::Stalled { .. } => DispatchError::Stalled {
                    consecutive: self.consecutive_timeouts,
                },
                other => other,
            })?;

        self.next_id += 1;
        self.queue
            .push_back(FrameTask::new(id, frame, started, reply_rx));
        if self.queue.len() == 1 {
            self.mark_front();
        }
        self.publish_in_flight();

        debug!("Submitted frame {} as task {}", seq, id);
        Ok(TaskHandle::new(id, seq))
    }

    /// Non-blocking check. A finished task stays `Pending` until every task
    /// submitted before it has been consumed.
    pub fn poll(&mut self, handle: TaskHandle) -> Result<TaskPoll, DispatchError> {
        let timeout = self.timeout;
        let position = self
            .queue
            .iter()
            .position(|task| task.id == handle.id)
            .ok_or(DispatchError::UnknownTask { id: handle.id })?;

        let done = self.queue[position].try_complete(timeout);
        if position != 0 || !done {
            return Ok(TaskPoll::Pending);
        }

        self.consume_front().map(TaskPoll::Ready)
    }

    /// Wait for a specific task. Only the oldest in-flight task may be
    /// awaited.
    pub async fn wait(&mut self, handle: TaskHandle) -> Result<FrameResult, DispatchError> {
        let front = self
            .queue
            .front()
            .map(|task| task.id)
            .ok_or(DispatchError::UnknownTask { id: handle.id })?;

        if front != handle.id {
            if self.queue.iter().any(|task| task.id == handle.id) {
                return Err(DispatchError::OutOfOrder {
                    expected: front,
                    requested: handle.id,
                });
            }
            return Err(DispatchError::UnknownTask { id: handle.id });
        }

        let timeout = self.timeout;
        if let Some(task) = self.queue.front_mut() {
            task.complete(timeout).await;
        }

        self.consume_front()
    }

    /// Wait for the oldest in-flight task, if any
    pub async fn wait_oldest(&mut self) -> Result<Option<FrameResult>, DispatchError> {
        match self.oldest() {
            Some(handle) => self.wait(handle).await.map(Some),
            None => Ok(None),
        }
    }

    /// The oldest result if it is ready, without blocking
    pub fn try_next(&mut self) -> Result<Option<FrameResult>, DispatchError> {
        match self.oldest() {
            Some(handle) => match self.poll(handle)? {
                TaskPoll::Ready(result) => Ok(Some(result)),
                TaskPoll::Pending => Ok(None),
            },
            None => Ok(None),
        }
    }

    pub fn oldest(&self) -> Option<TaskHandle> {
        self.queue
            .front()
            .map(|task| TaskHandle::new(task.id, task.seq()))
    }

    pub fn in_flight(&self) -> usize {
        self.queue.len()
    }

    /// Shared in-flight counter for status readers
    pub fn in_flight_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.in_flight)
    }

    pub fn capacity(&self) -> usize {
        self.depth
    }

    pub fn is_full(&self) -> bool {
        self.queue.len() >= self.depth
    }

    /// Consume every in-flight task in order
    pub async fn drain(&mut self) -> Result<Vec<FrameResult>, DispatchError> {
        let mut results = Vec::with_capacity(self.queue.len());
        while let Some(result) = self.wait_oldest().await? {
            results.push(result);
        }
        Ok(results)
    }

    /// Abandon in-flight tasks, stop the workers and wait up to `grace` for
    /// them to exit.
    pub async fn shutdown(&mut self, grace: Duration) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        let abandoned = self.queue.len();
        self.queue.clear();
        self.publish_in_flight();
        if abandoned > 0 {
            warn!("Abandoning {} in-flight frame(s) at shutdown", abandoned);
        }

        let workers = self.pool.close();
        let deadline = Instant::now() + grace;

        while workers.iter().any(|w| !w.is_finished()) {
            if Instant::now() >= deadline {
                warn!("Detection workers still busy after {:?}; detaching", grace);
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        for worker in workers {
            if worker.join().is_err() {
                error!("Detection worker exited with a panic");
            }
        }

        info!("Frame dispatcher stopped");
    }

    fn consume_front(&mut self) -> Result<FrameResult, DispatchError> {
        let task = self
            .queue
            .pop_front()
            .ok_or(DispatchError::ShutDown)?;
        self.mark_front();
        self.publish_in_flight();

        let result = task.into_result();

        if result.is_timeout() {
            self.consecutive_timeouts += 1;
            warn!(
                "Detection for frame {} timed out after {:?} ({} consecutive)",
                result.frame.seq, self.timeout, self.consecutive_timeouts
            );

            if self.consecutive_timeouts >= self.stall_limit {
                error!(
                    "Detection stalled: {} consecutive frames timed out",
                    self.consecutive_timeouts
                );
                return Err(DispatchError::Stalled {
                    consecutive: self.consecutive_timeouts,
                });
            }
        } else {
            self.consecutive_timeouts = 0;
        }

        Ok(result)
    }

    fn mark_front(&mut self) {
        if let Some(front) = self.queue.front_mut() {
            front.mark_front();
        }
    }

    fn publish_in_flight(&self) {
        self.in_flight.store(self.queue.len(), Ordering::Release);
    }
}
