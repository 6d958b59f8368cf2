use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::{fmt, time::Duration};
use tracing::debug;
use uuid::Uuid;

use crate::{
    database::db_err,
    error::{ExportError, Result},
    jobs::{
        ABANDONED_ERROR, DequeueRequest, EnqueueRequest, JobHandle,
        JobPayload, JobRecord, JobState, QueueService, QueueSnapshot,
    },
    types::{JobId, QueueName},
};

const JOB_COLUMNS: &str = "id, queue, payload, state, attempts, timeout_secs, \
     enqueued_at, started_at, finished_at, worker_id, last_error";

#[derive(Debug, FromRow)]
struct JobRow {
    id: Uuid,
    queue: String,
    payload: serde_json::Value,
    state: String,
    attempts: i32,
    timeout_secs: i64,
    enqueued_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    worker_id: Option<String>,
    last_error: Option<String>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = ExportError;

    fn try_from(row: JobRow) -> Result<Self> {
        let payload: JobPayload = serde_json::from_value(row.payload)?;
        Ok(Self {
            id: JobId(row.id),
            queue: QueueName::new(row.queue),
            payload,
            state: row.state.parse().map_err(ExportError::Database)?,
            attempts: row.attempts.max(0) as u32,
            timeout: Duration::from_secs(row.timeout_secs.max(0) as u64),
            enqueued_at: row.enqueued_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
            worker_id: row.worker_id,
            last_error: row.last_error,
        })
    }
}

#[derive(Debug, FromRow)]
struct CountRow {
    queue: String,
    state: String,
    total: i64,
}

/// Durable queue on `export_jobs`. Concurrent workers claim rows with
/// `FOR UPDATE SKIP LOCKED`; there is no push notification, workers poll.
#[derive(Clone)]
pub struct PostgresQueue {
    pool: PgPool,
}

impl fmt::Debug for PostgresQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresQueue")
            .field("pool_size", &self.pool.size())
            .field("idle_connections", &self.pool.num_idle())
            .finish()
    }
}

impl PostgresQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn finish(
        &self,
        job_id: JobId,
        state: JobState,
        error: Option<String>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE export_jobs
            SET state = $2, finished_at = NOW(), last_error = $3
            WHERE id = $1
            "#,
        )
        .bind(job_id.0)
        .bind(state.as_str())
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(db_err("finish job"))?;

        if result.rows_affected() == 0 {
            return Err(ExportError::NotFound(format!("job {job_id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl QueueService for PostgresQueue {
    async fn enqueue(&self, request: EnqueueRequest) -> Result<JobHandle> {
        let job_id = JobId::new();
        let payload = serde_json::to_value(&request.payload)?;

        sqlx::query(
            r#"
            INSERT INTO export_jobs (id, queue, kind, payload, timeout_secs)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(job_id.0)
        .bind(request.queue.as_str())
        .bind(request.payload.name())
        .bind(payload)
        .bind(request.timeout.as_secs() as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err("enqueue job"))?;

        debug!(
            target: "export::queue",
            job = %job_id,
            queue = %request.queue,
            kind = request.payload.name(),
            "job enqueued"
        );
        Ok(JobHandle { job_id })
    }

    async fn enqueue_many(
        &self,
        requests: Vec<EnqueueRequest>,
    ) -> Result<Vec<JobHandle>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("begin enqueue transaction"))?;
        let mut handles = Vec::with_capacity(requests.len());

        for request in requests {
            let job_id = JobId::new();
            sqlx::query(
                r#"
                INSERT INTO export_jobs (id, queue, kind, payload, timeout_secs)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(job_id.0)
            .bind(request.queue.as_str())
            .bind(request.payload.name())
            .bind(serde_json::to_value(&request.payload)?)
            .bind(request.timeout.as_secs() as i64)
            .execute(&mut *tx)
            .await
            .map_err(db_err("enqueue job"))?;
            handles.push(JobHandle { job_id });
        }

        tx.commit()
            .await
            .map_err(db_err("commit enqueue transaction"))?;
        Ok(handles)
    }

    async fn dequeue(&self, request: DequeueRequest) -> Result<Option<JobRecord>> {
        let queues: Vec<&str> =
            request.queues.iter().map(QueueName::as_str).collect();
        let sql = r#"
            WITH next AS (
                SELECT id
                FROM export_jobs
                WHERE state = 'queued' AND queue = ANY($1)
                ORDER BY seq
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            UPDATE export_jobs j
            SET state = 'running',
                attempts = j.attempts + 1,
                started_at = NOW(),
                worker_id = $2
            FROM next
            WHERE j.id = next.id
            RETURNING j.id, j.queue, j.payload, j.state, j.attempts,
                      j.timeout_secs, j.enqueued_at, j.started_at,
                      j.finished_at, j.worker_id, j.last_error
            "#;

        let row = sqlx::query_as::<_, JobRow>(sql)
            .bind(&queues)
            .bind(&request.worker_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("dequeue job"))?;
        row.map(JobRecord::try_from).transpose()
    }

    async fn complete(&self, job_id: JobId) -> Result<()> {
        self.finish(job_id, JobState::Completed, None).await
    }

    async fn fail(&self, job_id: JobId, error: String) -> Result<()> {
        self.finish(job_id, JobState::Failed, Some(error)).await
    }

    async fn get(&self, job_id: JobId) -> Result<Option<JobRecord>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM export_jobs WHERE id = $1");
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(job_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("load job"))?;
        row.map(JobRecord::try_from).transpose()
    }

    async fn snapshot(&self) -> Result<QueueSnapshot> {
        let rows = sqlx::query_as::<_, CountRow>(
            r#"
            SELECT queue, state, COUNT(*) AS total
            FROM export_jobs
            GROUP BY queue, state
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("snapshot queue"))?;

        let mut snapshot = QueueSnapshot::new(Utc::now());
        for row in rows {
            let state: JobState =
                row.state.parse().map_err(ExportError::Database)?;
            snapshot.count(
                QueueName::new(row.queue),
                state,
                row.total.max(0) as usize,
            );
        }
        Ok(snapshot)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<JobRecord>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM export_jobs \
             ORDER BY enqueued_at DESC, seq DESC LIMIT $1"
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("list recent jobs"))?;
        rows.into_iter().map(JobRecord::try_from).collect()
    }

    async fn reap_abandoned(&self, grace: Duration) -> Result<usize> {
        let result = sqlx::query(
            r#"
            UPDATE export_jobs
            SET state = 'failed', finished_at = NOW(), last_error = $2
            WHERE state = 'running'
              AND started_at + (timeout_secs + $1) * INTERVAL '1 second' <= NOW()
            "#,
        )
        .bind(grace.as_secs_f64())
        .bind(ABANDONED_ERROR)
        .execute(&self.pool)
        .await
        .map_err(db_err("reap abandoned jobs"))?;

        Ok(result.rows_affected() as usize)
    }

    async fn prune_finished(&self, older_than: Duration) -> Result<usize> {
        let result = sqlx::query(
            r#"
            DELETE FROM export_jobs
            WHERE state IN ('completed', 'failed')
              AND finished_at <= NOW() - $1 * INTERVAL '1 second'
            "#,
        )
        .bind(older_than.as_secs_f64())
        .execute(&self.pool)
        .await
        .map_err(db_err("prune finished jobs"))?;

        Ok(result.rows_affected() as usize)
    }
}
