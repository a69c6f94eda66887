use super::task::{StartMark, WorkerReply};
use crate::collaborators::DetectionBackend;
use crate::error::{DetectionError, DispatchError};
use crate::frame::Frame;
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

pub(crate) struct Job {
    pub id: u64,
    pub frame: Frame,
    pub started: StartMark,
    pub reply: oneshot::Sender<WorkerReply>,
}

/// Fixed set of OS threads running blocking inference
pub(crate) struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(
        count: usize,
        queue_capacity: usize,
        backend: Arc<dyn DetectionBackend>,
    ) -> std::io::Result<Self> {
        let (sender, receiver) = channel::bounded::<Job>(queue_capacity);
        let mut workers = Vec::with_capacity(count);

        for index in 0..count {
            let receiver = receiver.clone();
            let backend = Arc::clone(&backend);
            let handle = thread::Builder::new()
                .name(format!("detect-{}", index))
                .spawn(move || run_worker(index, receiver, backend))?;
            workers.push(handle);
        }

        info!("Started {} detection worker(s)", count);

        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    pub fn submit(&self, job: Job) -> Result<(), DispatchError> {
        let sender = self.sender.as_ref().ok_or(DispatchError::ShutDown)?;

        match sender.try_send(job) {
            Ok(()) => Ok(()),
            // Only abandoned jobs can fill the channel, which means no
            // worker has picked anything up since they timed out.
            Err(TrySendError::Full(job)) => {
                warn!("Detection job queue full at frame {}", job.frame.seq);
                Err(DispatchError::Stalled { consecutive: 0 })
            }
            Err(TrySendError::Disconnected(_)) => Err(DispatchError::ShutDown),
        }
    }

    /// Stop accepting jobs and hand back the worker threads for joining
    pub fn close(&mut self) -> Vec<JoinHandle<()>> {
        self.sender.take();
        std::mem::take(&mut self.workers)
    }
}

fn run_worker(index: usize, receiver: Receiver<Job>, backend: Arc<dyn DetectionBackend>) {
    debug!("Detection worker {} started", index);

    while let Ok(job) = receiver.recv() {
        if job.reply.is_closed() {
            trace!("Worker {} skipping abandoned job {}", index, job.id);
            continue;
        }

        let start = Instant::now();
        let _ = job.started.set(start);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| backend.detect(&job.frame)))
            .unwrap_or_else(|payload| Err(DetectionError::Panicked(panic_message(payload))));
        let processing_time = start.elapsed();

        trace!(
            "Worker {} finished frame {} in {:?}",
            index,
            job.frame.seq,
            processing_time
        );

        if job
            .reply
            .send(WorkerReply {
                outcome,
                processing_time,
            })
            .is_err()
        {
            debug!("Result for job {} arrived after it was abandoned", job.id);
        }
    }

    debug!("Detection worker {} stopped", index);
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
