use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::Arc,
    time::Duration,
};
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use super::{
    job::{EnqueueRequest, JobHandle, JobRecord, JobState},
    queue::{ABANDONED_ERROR, DequeueRequest, QueueService, QueueSnapshot},
};
use crate::{
    error::{ExportError, Result},
    types::{JobId, QueueName},
};

/// Keeps at most this many finished jobs around for inspection.
const FINISHED_HISTORY: usize = 1_000;

/// FIFO queue per name, kept in process memory.
pub struct InMemoryQueue {
    state: Mutex<QueueState>,
    notify: Arc<Notify>,
}

#[derive(Default)]
struct QueueState {
    jobs: HashMap<JobId, JobRecord>,
    ready: HashMap<QueueName, VecDeque<(u64, JobId)>>,
    order: VecDeque<JobId>,
    next_seq: u64,
}

impl fmt::Debug for InMemoryQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("InMemoryQueue");
        match self.state.try_lock() {
            Ok(state) => {
                debug.field("jobs", &state.jobs.len());
            }
            Err(_) => {
                debug.field("state", &"<locked>");
            }
        }
        debug.finish()
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Every job ever accepted, oldest first. Test helper.
    pub async fn all(&self) -> Vec<JobRecord> {
        let state = self.state.lock().await;
        state
            .order
            .iter()
            .filter_map(|id| state.jobs.get(id).cloned())
            .collect()
    }

    async fn finish(
        &self,
        job_id: JobId,
        outcome: JobState,
        error: Option<String>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| ExportError::NotFound(format!("job {job_id}")))?;
        job.state = outcome;
        job.finished_at = Some(Utc::now());
        job.last_error = error;
        state.prune();
        Ok(())
    }
}

impl QueueState {
    fn prune(&mut self) {
        let finished = self
            .jobs
            .values()
            .filter(|job| job.state.is_terminal())
            .count();
        if finished <= FINISHED_HISTORY {
            return;
        }

        let mut excess = finished - FINISHED_HISTORY;
        let jobs = &mut self.jobs;
        self.order.retain(|id| {
            if excess == 0 {
                return true;
            }
            let terminal =
                jobs.get(id).is_some_and(|job| job.state.is_terminal());
            if terminal {
                jobs.remove(id);
                excess -= 1;
            }
            !terminal
        });
    }
}

#[async_trait]
impl QueueService for InMemoryQueue {
    async fn enqueue(&self, request: EnqueueRequest) -> Result<JobHandle> {
        let record = JobRecord::from_request(request);
        let job_id = record.id;
        {
            let mut state = self.state.lock().await;
            let seq = state.next_seq;
            state.next_seq += 1;
            state
                .ready
                .entry(record.queue.clone())
                .or_default()
                .push_back((seq, job_id));
            state.order.push_back(job_id);
            debug!(
                target: "export::queue",
                job = %job_id,
                queue = %record.queue,
                kind = record.payload.name(),
                "job enqueued"
            );
            state.jobs.insert(job_id, record);
        }
        self.notify.notify_one();
        Ok(JobHandle { job_id })
    }

    async fn dequeue(&self, request: DequeueRequest) -> Result<Option<JobRecord>> {
        let mut state = self.state.lock().await;

        // Oldest head across the requested queues wins.
        let mut best: Option<(QueueName, u64, JobId)> = None;
        for queue in &request.queues {
            let Some(&(seq, job_id)) =
                state.ready.get(queue).and_then(|q| q.front())
            else {
                continue;
            };
            if best.as_ref().is_none_or(|(_, current, _)| seq < *current) {
                best = Some((queue.clone(), seq, job_id));
            }
        }

        let Some((queue, _, job_id)) = best else {
            return Ok(None);
        };
        if let Some(ready) = state.ready.get_mut(&queue) {
            ready.pop_front();
        }

        let Some(job) = state.jobs.get_mut(&job_id) else {
            return Ok(None);
        };
        job.state = JobState::Running;
        job.attempts += 1;
        job.started_at = Some(Utc::now());
        job.worker_id = Some(request.worker_id);
        Ok(Some(job.clone()))
    }

    async fn complete(&self, job_id: JobId) -> Result<()> {
        self.finish(job_id, JobState::Completed, None).await
    }

    async fn fail(&self, job_id: JobId, error: String) -> Result<()> {
        self.finish(job_id, JobState::Failed, Some(error)).await
    }

    async fn get(&self, job_id: JobId) -> Result<Option<JobRecord>> {
        Ok(self.state.lock().await.jobs.get(&job_id).cloned())
    }

    async fn snapshot(&self) -> Result<QueueSnapshot> {
        let state = self.state.lock().await;
        let mut snapshot = QueueSnapshot::new(Utc::now());
        for job in state.jobs.values() {
            snapshot.count(job.queue.clone(), job.state, 1);
        }
        Ok(snapshot)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<JobRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .order
            .iter()
            .rev()
            .filter_map(|id| state.jobs.get(id).cloned())
            .take(limit)
            .collect())
    }

    async fn reap_abandoned(&self, grace: Duration) -> Result<usize> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let mut reaped = 0;
        for job in state.jobs.values_mut() {
            let expired = job.state == JobState::Running
                && job
                    .started_at
                    .and_then(|started| deadline(started, job.timeout.saturating_add(grace)))
                    .is_some_and(|deadline| deadline <= now);
            if expired {
                job.state = JobState::Failed;
                job.finished_at = Some(now);
                job.last_error = Some(ABANDONED_ERROR.to_string());
                reaped += 1;
            }
        }
        Ok(reaped)
    }

    async fn prune_finished(&self, older_than: Duration) -> Result<usize> {
        let Some(cutoff) = TimeDelta::from_std(older_than)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return Ok(0);
        };

        let mut state = self.state.lock().await;
        let QueueState { jobs, order, .. } = &mut *state;
        let before = jobs.len();
        jobs.retain(|_, job| {
            !(job.state.is_terminal()
                && job.finished_at.is_some_and(|finished| finished <= cutoff))
        });
        order.retain(|id| jobs.contains_key(id));
        Ok(before - jobs.len())
    }

    fn notifier(&self) -> Option<Arc<Notify>> {
        Some(Arc::clone(&self.notify))
    }
}

fn deadline(started: DateTime<Utc>, budget: Duration) -> Option<DateTime<Utc>> {
    started.checked_add_signed(TimeDelta::from_std(budget).ok()?)
}
