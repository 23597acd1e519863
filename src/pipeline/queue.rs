//! Job queue with a fixed pool of job workers.

use super::{CancelToken, Job, JobContext, JobSummary, run_job};
use crate::error::{Error, Result};
use crate::store::ReportId;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error};

struct Queued {
    job: Job,
    cancel: CancelToken,
    done: oneshot::Sender<JobSummary>,
}

/// Handle to a submitted job.
#[derive(Debug)]
pub struct JobHandle {
    report_id: ReportId,
    cancel: CancelToken,
    done: oneshot::Receiver<JobSummary>,
}

impl JobHandle {
    /// Report the job writes to.
    #[must_use]
    pub fn report_id(&self) -> ReportId {
        self.report_id
    }

    /// Request cooperative cancellation of this job only.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token cancelling this job, e.g. for a signal handler.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Wait for the job's summary.
    pub async fn wait(self) -> Result<JobSummary> {
        self.done.await.map_err(|_| Error::QueueClosed)
    }
}

/// Runs submitted jobs, at most `concurrent_jobs` at a time.
pub struct JobQueue {
    intake: Option<mpsc::UnboundedSender<Queued>>,
    workers: JoinSet<()>,
    root: CancelToken,
}

impl JobQueue {
    /// Start the job workers. Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(ctx: Arc<JobContext>, concurrent_jobs: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Queued>();
        let rx = Arc::new(Mutex::new(rx));
        let mut workers = JoinSet::new();

        for worker in 0..concurrent_jobs.max(1) {
            let ctx = Arc::clone(&ctx);
            let rx = Arc::clone(&rx);
            workers.spawn(async move {
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(Queued { job, cancel, done }) = next else {
                        break;
                    };
                    let report_id = job.report_id;
                    let summary = run_job(Arc::clone(&ctx), job, cancel).await;
                    if done.send(summary).is_err() {
                        debug!(worker, report = %report_id, "job handle dropped before completion");
                    }
                }
                debug!(worker, "job worker stopped");
            });
        }

        Self {
            intake: Some(tx),
            workers,
            root: CancelToken::new(),
        }
    }

    /// Queue a job. Its report must already exist in the store.
    pub fn submit(&self, job: Job) -> Result<JobHandle> {
        let intake = self.intake.as_ref().ok_or(Error::QueueClosed)?;
        let cancel = self.root.child();
        let (done_tx, done_rx) = oneshot::channel();
        let report_id = job.report_id;

        intake
            .send(Queued {
                job,
                cancel: cancel.clone(),
                done: done_tx,
            })
            .map_err(|_| Error::QueueClosed)?;

        Ok(JobHandle {
            report_id,
            cancel,
            done: done_rx,
        })
    }

    /// Token whose cancellation cancels every submitted job.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.root.clone()
    }

    /// Cancel every submitted job, queued or running.
    pub fn cancel_all(&self) {
        self.root.cancel();
    }

    /// Stop accepting jobs and wait for queued ones to finish.
    pub async fn shutdown(mut self) {
        self.intake.take();
        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined {
                error!("job worker failed: {e}");
            }
        }
    }
}
