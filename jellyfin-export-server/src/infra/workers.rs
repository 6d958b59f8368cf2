//! Queue consumers.
//!
//! Each worker claims one job at a time, runs it under the job's timeout and
//! records the outcome. Idle workers park until the queue signals an enqueue,
//! the poll interval elapses or shutdown is requested.

use std::{fmt, sync::Arc, time::Duration};

use jellyfin_export_core::{
    jobs::{DequeueRequest, JobRecord, QueueService},
    runner::JobRunner,
    types::QueueName,
};
use tokio::{sync::Notify, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::infra::app_state::AppState;

/// Pause after a queue backend error before the next claim.
const BACKOFF: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct WorkerPool {
    queue: Arc<dyn QueueService>,
    runner: JobRunner,
    queues: Vec<QueueName>,
    poll_interval: Duration,
    notify: Option<Arc<Notify>>,
    shutdown: CancellationToken,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("queues", &self.queues)
            .field("poll_interval", &self.poll_interval)
            .field("push_wakeups", &self.notify.is_some())
            .field("shutdown_cancelled", &self.shutdown.is_cancelled())
            .finish()
    }
}

/// Result of one claim attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerTick {
    Idle,
    Completed(JobRecord),
    Failed(JobRecord, String),
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn QueueService>,
        runner: JobRunner,
        queues: Vec<QueueName>,
        poll_interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        let notify = queue.notifier();
        Self {
            queue,
            runner,
            queues,
            poll_interval,
            notify,
            shutdown,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            Arc::clone(state.queue()),
            state.runner.clone(),
            state.config().queues.clone(),
            state.config().poll_interval,
            state.shutdown.clone(),
        )
    }

    pub fn spawn(&self, parallelism: usize) -> Vec<JoinHandle<()>> {
        let worker_group = format!("export-{}", std::process::id());
        (0..parallelism.max(1))
            .map(|i| {
                let worker_id = format!("{worker_group}-w{i}");
                let pool = self.clone();
                tokio::spawn(async move { pool.run(worker_id).await })
            })
            .collect()
    }

    async fn run(self, worker_id: String) {
        info!(target: "export::workers", worker = %worker_id, queues = ?self.queues, "worker started");
        loop {
            if self.shutdown.is_cancelled() {
                info!(target: "export::workers", worker = %worker_id, "worker shutting down");
                break;
            }

            match self.tick(&worker_id).await {
                Ok(WorkerTick::Idle) => self.idle(self.poll_interval).await,
                Ok(_) => {}
                Err(err) => {
                    error!(target: "export::workers", worker = %worker_id, error = %err, "queue backend error");
                    self.idle(BACKOFF).await;
                }
            }
        }
    }

    /// Claim and run at most one job.
    pub async fn tick(&self, worker_id: &str) -> jellyfin_export_core::Result<WorkerTick> {
        let request = DequeueRequest {
            queues: self.queues.clone(),
            worker_id: worker_id.to_string(),
        };
        let Some(job) = self.queue.dequeue(request).await? else {
            return Ok(WorkerTick::Idle);
        };

        debug!(
            target: "export::workers",
            worker = worker_id,
            job = %job.id,
            kind = job.payload.name(),
            "job claimed"
        );

        let outcome = tokio::select! {
            _ = self.shutdown.cancelled() => Err("worker shut down mid-job".to_string()),
            result = tokio::time::timeout(job.timeout, self.runner.run(&job.payload)) => {
                match result {
                    Ok(Ok(report)) => Ok(report),
                    Ok(Err(err)) => Err(err.to_string()),
                    Err(_) => Err(format!(
                        "timed out after {}",
                        humantime::format_duration(job.timeout)
                    )),
                }
            }
        };

        match outcome {
            Ok(report) => {
                info!(
                    target: "export::workers",
                    job = %job.id,
                    kind = job.payload.name(),
                    report = ?report,
                    "job completed"
                );
                self.queue.complete(job.id).await?;
                Ok(WorkerTick::Completed(job))
            }
            Err(message) => {
                warn!(
                    target: "export::workers",
                    job = %job.id,
                    kind = job.payload.name(),
                    error = %message,
                    "job failed"
                );
                self.queue.fail(job.id, message.clone()).await?;
                Ok(WorkerTick::Failed(job, message))
            }
        }
    }

    /// Run jobs until the queues are empty. Used by the CLI `drain` mode and
    /// tests.
    pub async fn drain(&self, worker_id: &str) -> jellyfin_export_core::Result<Vec<WorkerTick>> {
        let mut ticks = Vec::new();
        loop {
            match self.tick(worker_id).await? {
                WorkerTick::Idle => return Ok(ticks),
                tick => ticks.push(tick),
            }
        }
    }

    async fn idle(&self, wait: Duration) {
        let notified = async {
            match &self.notify {
                Some(notify) => notify.notified().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = self.shutdown.cancelled() => {}
            _ = notified => {}
            _ = tokio::time::sleep(wait) => {}
        }
    }
}
