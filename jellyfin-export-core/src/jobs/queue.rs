use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tokio::sync::Notify;

use super::job::{EnqueueRequest, JobHandle, JobRecord, JobState};
use crate::{
    error::Result,
    types::{JobId, QueueName},
};

/// Request object to take the oldest queued job from any of `queues`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DequeueRequest {
    pub queues: Vec<QueueName>,
    pub worker_id: String,
}

/// Abstracts the queue backend consumed by the sync service and workers.
///
/// Jobs are not deduplicated: two clicks on the same button queue two jobs.
#[async_trait]
pub trait QueueService: Send + Sync {
    async fn enqueue(&self, request: EnqueueRequest) -> Result<JobHandle>;

    /// Claim the oldest queued job and flip it to running.
    async fn dequeue(&self, request: DequeueRequest) -> Result<Option<JobRecord>>;

    async fn complete(&self, job_id: JobId) -> Result<()>;

    async fn fail(&self, job_id: JobId, error: String) -> Result<()>;

    async fn get(&self, job_id: JobId) -> Result<Option<JobRecord>>;

    async fn snapshot(&self) -> Result<QueueSnapshot>;

    /// Most recently enqueued jobs first.
    async fn recent(&self, limit: usize) -> Result<Vec<JobRecord>>;

    /// Fail running jobs whose timeout plus `grace` has elapsed since they
    /// were claimed. Their worker stopped without recording an outcome.
    async fn reap_abandoned(&self, grace: Duration) -> Result<usize>;

    /// Delete completed and failed jobs that finished more than
    /// `older_than` ago.
    async fn prune_finished(&self, older_than: Duration) -> Result<usize>;

    /// Signalled on enqueue when the backend can push wake-ups; workers
    /// poll otherwise.
    fn notifier(&self) -> Option<Arc<Notify>> {
        None
    }

    /// Enqueue several jobs. Backends with transactions should override
    /// this to insert atomically.
    async fn enqueue_many(
        &self,
        requests: Vec<EnqueueRequest>,
    ) -> Result<Vec<JobHandle>> {
        let mut out = Vec::with_capacity(requests.len());
        for request in requests {
            out.push(self.enqueue(request).await?);
        }
        Ok(out)
    }
}

/// `last_error` of jobs failed by [`QueueService::reap_abandoned`].
pub const ABANDONED_ERROR: &str = "Abandoned: worker stopped before the job finished";

/// Per-queue counters at a specific instant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub sampled_at: DateTime<Utc>,
    pub queues: BTreeMap<QueueName, QueueSnapshotEntry>,
}

impl QueueSnapshot {
    pub fn new(sampled_at: DateTime<Utc>) -> Self {
        Self {
            sampled_at,
            queues: BTreeMap::new(),
        }
    }

    pub fn entry_mut(&mut self, queue: QueueName) -> &mut QueueSnapshotEntry {
        self.queues.entry(queue).or_default()
    }

    pub fn count(&mut self, queue: QueueName, state: JobState, n: usize) {
        let entry = self.entry_mut(queue);
        match state {
            JobState::Queued => entry.queued += n,
            JobState::Running => entry.running += n,
            JobState::Completed => entry.completed += n,
            JobState::Failed => entry.failed += n,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshotEntry {
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}
