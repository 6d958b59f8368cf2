use std::{path::PathBuf, sync::Arc};

use jellyfin_export_core::{
    EntityId, QueueName,
    export_map::{ExportMapRepository, ExportStatus, InMemoryExportMap},
    exporter::Exporter,
    jobs::{DequeueRequest, InMemoryQueue, JobPayload, QueueService},
    lock::InProcessLocks,
    runner::{JobReport, JobRunner},
    settings::{ExportSettings, InMemorySettingsRepository, LibrarySettings},
    sync::SyncService,
    tree::{DriveEntity, EntityStore, InMemoryEntityStore},
};
use tempfile::TempDir;

fn id(value: &str) -> EntityId {
    EntityId::new(value)
}

struct Stack {
    _dir: TempDir,
    export_root: PathBuf,
    entities: Arc<InMemoryEntityStore>,
    maps: Arc<InMemoryExportMap>,
    queue: Arc<InMemoryQueue>,
    sync: SyncService,
    runner: JobRunner,
}

async fn stack() -> Stack {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("drive");
    let export_root = dir.path().join("jellyfin");
    tokio::fs::create_dir_all(&source).await.unwrap();

    let movie = source.join("alien.mkv");
    let episode = source.join("s01e01.mkv");
    tokio::fs::write(&movie, b"alien").await.unwrap();
    tokio::fs::write(&episode, b"pilot").await.unwrap();

    // No nested-set bounds yet: the export jobs heal the tree first.
    let entities = Arc::new(InMemoryEntityStore::with_entities([
        DriveEntity::folder("root", "My Drive", None),
        DriveEntity::folder("movies", "Movies", Some(id("root"))),
        DriveEntity::folder("alien", "Alien (1979)", Some(id("movies"))),
        DriveEntity::file(
            "alien-mkv",
            "Alien.mkv",
            Some(id("alien")),
            movie.to_string_lossy(),
        ),
        DriveEntity::folder("shows", "Shows", Some(id("root"))),
        DriveEntity::file(
            "pilot",
            "S01E01.mkv",
            Some(id("shows")),
            episode.to_string_lossy(),
        ),
    ]));

    let settings = Arc::new(InMemorySettingsRepository::with_settings(
        ExportSettings {
            enabled: true,
            export_root: export_root.clone(),
            libraries: vec![
                LibrarySettings::new("Movies", id("movies")),
                LibrarySettings::new("Shows", id("shows")),
            ],
            ..ExportSettings::default()
        },
    ));
    let maps = Arc::new(InMemoryExportMap::new());
    let queue = Arc::new(InMemoryQueue::new());

    let sync = SyncService::new(settings, entities.clone(), queue.clone());
    let exporter = Exporter::new(entities.clone(), maps.clone());
    let runner = JobRunner::new(
        sync.clone(),
        entities.clone(),
        exporter,
        Arc::new(InProcessLocks::new()),
        "media.local",
    );

    Stack {
        _dir: dir,
        export_root,
        entities,
        maps,
        queue,
        sync,
        runner,
    }
}

impl Stack {
    /// Run queued jobs until the queue is empty.
    async fn drain(&self) -> Vec<(JobPayload, JobReport)> {
        let mut reports = Vec::new();
        while let Some(job) = self
            .queue
            .dequeue(DequeueRequest {
                queues: vec![QueueName::default()],
                worker_id: "test".into(),
            })
            .await
            .unwrap()
        {
            let report = self.runner.run(&job.payload).await.unwrap();
            self.queue.complete(job.id).await.unwrap();
            reports.push((job.payload, report));
        }
        reports
    }
}

#[tokio::test]
async fn sync_all_fans_out_into_library_exports() {
    let s = stack().await;
    s.sync.sync_all().await.unwrap();

    let reports = s.drain().await;
    let kinds: Vec<&str> = reports.iter().map(|(p, _)| p.name()).collect();
    assert_eq!(
        kinds,
        [
            "sync_library",
            "sync_library",
            "export_library",
            "export_library"
        ]
    );

    assert!(
        s.export_root
            .join("Movies/Alien (1979)/Alien.mkv")
            .exists()
    );
    assert!(s.export_root.join("Shows/S01E01.mkv").exists());
}

#[tokio::test]
async fn export_job_heals_the_tree_before_walking_it() {
    let s = stack().await;
    s.sync.sync_library("Movies").await.unwrap();

    let reports = s.drain().await;
    let JobReport::Exported { summary } = &reports[0].1 else {
        panic!("unexpected report {:?}", reports[0].1);
    };
    assert_eq!(summary.exported, 3);

    let movies = s.entities.get(&id("movies")).await.unwrap().unwrap();
    assert!(movies.nested_bounds().is_some());
}

#[tokio::test]
async fn entity_hooks_export_and_remove_single_files() {
    let s = stack().await;

    s.sync.on_entity_change(&id("alien-mkv")).await.unwrap();
    s.drain().await;
    let exported = s.export_root.join("Movies/Alien (1979)/Alien.mkv");
    assert!(exported.exists());

    s.sync.on_entity_trash(&id("alien-mkv")).await.unwrap();
    let reports = s.drain().await;
    assert_eq!(reports[0].1, JobReport::Removed { removed: true });
    assert!(!exported.exists());

    let record = s.maps.get(&id("alien-mkv")).await.unwrap().unwrap();
    assert_eq!(record.status, ExportStatus::Deleted);
}

#[tokio::test]
async fn cleanup_job_reports_what_it_removed() {
    let s = stack().await;
    s.sync.sync_library("Shows").await.unwrap();
    s.drain().await;

    s.entities.remove(&id("pilot")).await;
    s.sync.cleanup_library("Shows").await.unwrap();
    let reports = s.drain().await;

    let JobReport::Cleaned { summary } = &reports[0].1 else {
        panic!("unexpected report {:?}", reports[0].1);
    };
    assert_eq!(summary.removed, 1);
    assert!(!s.export_root.join("Shows/S01E01.mkv").exists());
}
