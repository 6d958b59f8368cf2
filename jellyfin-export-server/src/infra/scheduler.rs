use std::{sync::Arc, time::Duration};

use jellyfin_export_core::{jobs::QueueService, sync::SyncService};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Queue a full resync every `every`. The first run happens one period after
/// startup. A zero period disables the task.
pub fn spawn_periodic_resync(
    sync: SyncService,
    every: Duration,
    shutdown: CancellationToken,
) -> Option<JoinHandle<()>> {
    if every.is_zero() {
        info!(target: "export::scheduler", "periodic resync disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(target: "export::scheduler", "resync scheduler shutting down");
                    break;
                }
                _ = interval.tick() => {
                    match sync.nightly_resync().await {
                        Ok(jobs) => info!(target: "export::scheduler", jobs = jobs.len(), "periodic resync queued"),
                        Err(err) => warn!(target: "export::scheduler", error = %err, "periodic resync failed"),
                    }
                }
            }
        }
    }))
}

/// Extra time a running job gets past its own timeout before it counts as
/// abandoned. Live workers fail timed-out jobs themselves well before that.
pub const ABANDON_GRACE: Duration = Duration::from_secs(5 * 60);

/// Period of [`spawn_queue_maintenance`].
pub const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub abandoned: usize,
    pub pruned: usize,
}

/// Fail jobs left running by a dead worker, then drop finished jobs older
/// than `retention` (zero keeps them).
pub async fn maintain_queue(
    queue: &dyn QueueService,
    grace: Duration,
    retention: Duration,
) -> jellyfin_export_core::Result<MaintenanceReport> {
    let abandoned = queue.reap_abandoned(grace).await?;
    let pruned = if retention.is_zero() {
        0
    } else {
        queue.prune_finished(retention).await?
    };

    if abandoned > 0 {
        warn!(target: "export::scheduler", abandoned, "abandoned jobs marked failed");
    }
    if pruned > 0 {
        info!(target: "export::scheduler", pruned, "finished jobs pruned");
    }
    Ok(MaintenanceReport { abandoned, pruned })
}

/// Run [`maintain_queue`] now and then every `every` until shutdown.
pub fn spawn_queue_maintenance(
    queue: Arc<dyn QueueService>,
    retention: Duration,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(Duration::from_secs(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(err) = maintain_queue(queue.as_ref(), ABANDON_GRACE, retention).await {
                        warn!(target: "export::scheduler", error = %err, "queue maintenance failed");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jellyfin_export_core::{
        jobs::{
            ABANDONED_ERROR, DequeueRequest, EnqueueRequest, InMemoryQueue,
            JobPayload, JobState,
        },
        settings::{ExportSettings, InMemorySettingsRepository, LibrarySettings},
        tree::InMemoryEntityStore,
        types::{EntityId, QueueName},
    };

    #[tokio::test(start_paused = true)]
    async fn resync_fires_after_each_period() {
        let settings = ExportSettings {
            enabled: true,
            export_root: "/srv/jellyfin".into(),
            libraries: vec![LibrarySettings::new("Movies", EntityId::new("movies"))],
            ..ExportSettings::default()
        };
        let queue = Arc::new(InMemoryQueue::new());
        let sync = SyncService::new(
            Arc::new(InMemorySettingsRepository::with_settings(settings)),
            Arc::new(InMemoryEntityStore::new()),
            Arc::clone(&queue) as Arc<dyn QueueService>,
        );
        let shutdown = CancellationToken::new();
        let every = Duration::from_secs(3600);

        let handle = spawn_periodic_resync(sync, every, shutdown.clone()).unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(queue.recent(10).await.unwrap().is_empty());

        tokio::time::sleep(every + Duration::from_secs(1)).await;
        let kinds: Vec<&str> = queue
            .recent(10)
            .await
            .unwrap()
            .iter()
            .map(|job| job.payload.name())
            .collect();
        assert_eq!(kinds.len(), 2);
        assert!(kinds.contains(&"sync_all"));
        assert!(kinds.contains(&"cleanup_library"));

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn maintenance_fails_lost_jobs_and_prunes_old_ones() {
        let queue = InMemoryQueue::new();
        let request = |timeout| {
            EnqueueRequest::new(QueueName::default(), JobPayload::SyncAll, timeout)
        };
        let claim = || DequeueRequest {
            queues: vec![QueueName::default()],
            worker_id: "gone".into(),
        };

        let finished = queue.enqueue(request(Duration::from_secs(60))).await.unwrap();
        queue.dequeue(claim()).await.unwrap();
        queue.complete(finished.job_id).await.unwrap();
        let lost = queue.enqueue(request(Duration::ZERO)).await.unwrap();
        queue.dequeue(claim()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let report = maintain_queue(&queue, Duration::ZERO, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(report, MaintenanceReport { abandoned: 1, pruned: 1 });

        assert!(queue.get(finished.job_id).await.unwrap().is_none());
        let failed = queue.get(lost.job_id).await.unwrap().unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.last_error.as_deref(), Some(ABANDONED_ERROR));

        let kept = maintain_queue(&queue, Duration::ZERO, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(kept, MaintenanceReport::default());
        assert!(queue.get(lost.job_id).await.unwrap().is_some());
    }

    #[test]
    fn zero_period_disables_scheduler() {
        let sync = SyncService::new(
            Arc::new(InMemorySettingsRepository::new()),
            Arc::new(InMemoryEntityStore::new()),
            Arc::new(InMemoryQueue::new()),
        );
        assert!(spawn_periodic_resync(sync, Duration::ZERO, CancellationToken::new()).is_none());
    }
}
