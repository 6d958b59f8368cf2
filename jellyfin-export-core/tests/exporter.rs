use std::{path::PathBuf, sync::Arc};

use chrono::Utc;
use jellyfin_export_core::{
    EntityId,
    export_map::{ExportMapRepository, ExportStatus, InMemoryExportMap},
    exporter::{EntityOutcome, ExportContext, Exporter},
    fsops::{LinkMode, same_inode},
    settings::{ExportSettings, LibrarySettings},
    tree::{
        DriveEntity, EntityStore, InMemoryEntityStore, LibraryTarget,
        PathCache, diagnose_and_heal_tree,
    },
};
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    source: PathBuf,
    export_root: PathBuf,
    entities: Arc<InMemoryEntityStore>,
    maps: Arc<InMemoryExportMap>,
    exporter: Exporter,
}

fn id(value: &str) -> EntityId {
    EntityId::new(value)
}

impl Fixture {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("drive");
        let export_root = dir.path().join("jellyfin");
        tokio::fs::create_dir_all(&source).await.unwrap();
        tokio::fs::create_dir_all(&export_root).await.unwrap();

        let entities = Arc::new(InMemoryEntityStore::new());
        let maps = Arc::new(InMemoryExportMap::new());
        let exporter = Exporter::new(
            entities.clone() as Arc<dyn EntityStore>,
            maps.clone() as Arc<dyn ExportMapRepository>,
        );

        let fixture = Self {
            _dir: dir,
            source,
            export_root,
            entities,
            maps,
            exporter,
        };

        fixture
            .entities
            .upsert(DriveEntity::folder("root", "My Drive", None))
            .await;
        fixture
            .entities
            .upsert(DriveEntity::folder("movies", "Movies", Some(id("root"))))
            .await;
        fixture
            .entities
            .upsert(DriveEntity::folder(
                "heat",
                "Heat (1995)",
                Some(id("movies")),
            ))
            .await;
        fixture.add_file("heat-mkv", "Heat.mkv", "heat").await;
        fixture.add_file("heat-srt", "Heat.srt", "heat").await;
        fixture.add_file("poster", "poster.jpg", "heat").await;
        fixture.add_file("notes", "notes.txt", "heat").await;
        fixture.heal().await;
        fixture
    }

    async fn add_file(&self, entity: &str, title: &str, parent: &str) -> PathBuf {
        let path = self.source.join(entity);
        tokio::fs::write(&path, entity.as_bytes()).await.unwrap();
        self.entities
            .upsert(DriveEntity::file(
                entity,
                title,
                Some(id(parent)),
                path.to_string_lossy(),
            ))
            .await;
        path
    }

    async fn heal(&self) {
        diagnose_and_heal_tree(self.entities.as_ref(), &id("root"))
            .await
            .unwrap();
    }

    fn ctx(&self, link_mode: LinkMode) -> ExportContext {
        let settings = ExportSettings {
            enabled: true,
            export_root: self.export_root.clone(),
            link_mode,
            libraries: vec![LibrarySettings::new("Movies", id("movies"))],
            ..ExportSettings::default()
        };
        ExportContext::new(
            &settings,
            &LibraryTarget {
                library_name: "Movies".into(),
                root_entity: id("movies"),
                export_subdir: "Movies".into(),
                allowed_exts: None,
            },
        )
    }

    fn exported(&self, rel: &str) -> PathBuf {
        self.export_root.join("Movies").join(rel)
    }

    async fn status(&self, entity: &str) -> Option<ExportStatus> {
        self.maps
            .get(&id(entity))
            .await
            .unwrap()
            .map(|record| record.status)
    }
}

#[tokio::test]
async fn subtree_export_links_media_and_skips_the_rest() {
    let fx = Fixture::new().await;
    let ctx = fx.ctx(LinkMode::Hardlink);

    let summary = fx
        .exporter
        .export_subtree(&ctx, &id("movies"))
        .await
        .unwrap();

    assert_eq!(summary.visited, 6);
    assert_eq!(summary.exported, 4);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.failed, 0);

    let video = fx.exported("Heat (1995)/Heat.mkv");
    assert!(video.exists());
    assert!(same_inode(&fx.source.join("heat-mkv"), &video).await);
    assert!(fx.exported("Heat (1995)/Heat.srt").exists());
    assert!(!fx.exported("Heat (1995)/poster.jpg").exists());
    assert!(!fx.exported("Heat (1995)/notes.txt").exists());

    assert_eq!(fx.status("heat-mkv").await, Some(ExportStatus::Exported));
    assert_eq!(fx.status("poster").await, Some(ExportStatus::Skipped));
}

#[tokio::test]
async fn second_run_leaves_current_files_alone() {
    let fx = Fixture::new().await;
    let ctx = fx.ctx(LinkMode::Hardlink);

    fx.exporter.export_subtree(&ctx, &id("movies")).await.unwrap();
    let again = fx
        .exporter
        .export_subtree(&ctx, &id("movies"))
        .await
        .unwrap();

    assert_eq!(again.unchanged, 2);
    assert_eq!(again.failed, 0);
}

#[tokio::test]
async fn images_follow_the_settings_flag() {
    let fx = Fixture::new().await;
    let mut ctx = fx.ctx(LinkMode::Copy);
    ctx.include_images = true;

    fx.exporter.export_subtree(&ctx, &id("movies")).await.unwrap();

    let poster = fx.exported("Heat (1995)/poster.jpg");
    assert!(poster.exists());
    assert!(!same_inode(&fx.source.join("poster"), &poster).await);
}

#[tokio::test]
async fn renamed_folder_moves_the_export() {
    let fx = Fixture::new().await;
    let ctx = fx.ctx(LinkMode::Hardlink);
    fx.exporter.export_subtree(&ctx, &id("movies")).await.unwrap();

    fx.entities
        .update(&id("heat"), |e| e.title = "Heat".into())
        .await;
    fx.exporter.export_subtree(&ctx, &id("movies")).await.unwrap();

    assert!(!fx.exported("Heat (1995)").exists());
    assert!(fx.exported("Heat/Heat.mkv").exists());
    let record = fx.maps.get(&id("heat-mkv")).await.unwrap().unwrap();
    let expected = fx.exported("Heat/Heat.mkv");
    assert_eq!(
        record.exported_path().map(PathBuf::from),
        Some(expected)
    );
}

#[tokio::test]
async fn clashing_titles_get_an_entity_suffix() {
    let fx = Fixture::new().await;
    fx.add_file("heat-alt", "Heat.mkv", "heat").await;
    fx.heal().await;
    let ctx = fx.ctx(LinkMode::Hardlink);

    fx.exporter.export_subtree(&ctx, &id("movies")).await.unwrap();

    let plain = fx.exported("Heat (1995)/Heat.mkv");
    let suffixed_alt = fx.exported("Heat (1995)/Heat__heat-alt.mkv");
    let suffixed_main = fx.exported("Heat (1995)/Heat__heat-mkv.mkv");
    assert!(plain.exists());
    assert!(suffixed_alt.exists() ^ suffixed_main.exists());

    // Both entities stay stable on the next run.
    let again = fx
        .exporter
        .export_subtree(&ctx, &id("movies"))
        .await
        .unwrap();
    assert_eq!(again.unchanged, 3);
}

#[tokio::test]
async fn missing_source_is_recorded_as_error() {
    let fx = Fixture::new().await;
    tokio::fs::remove_file(fx.source.join("heat-mkv")).await.unwrap();
    let ctx = fx.ctx(LinkMode::Hardlink);

    let outcome = fx
        .exporter
        .export_entity(&ctx, &id("heat-mkv"), &PathCache::empty())
        .await
        .unwrap();

    assert_eq!(outcome, EntityOutcome::Failed);
    let record = fx.maps.get(&id("heat-mkv")).await.unwrap().unwrap();
    assert_eq!(record.status, ExportStatus::Error);
    assert_eq!(record.last_error.as_deref(), Some("Missing src path"));
}

#[tokio::test]
async fn trashed_ancestor_drops_the_export() {
    let fx = Fixture::new().await;
    let ctx = fx.ctx(LinkMode::Hardlink);
    fx.exporter.export_subtree(&ctx, &id("movies")).await.unwrap();

    fx.entities
        .update(&id("heat"), |e| e.trashed_on = Some(Utc::now()))
        .await;
    let outcome = fx
        .exporter
        .export_entity(&ctx, &id("heat-mkv"), &PathCache::empty())
        .await
        .unwrap();

    assert_eq!(outcome, EntityOutcome::Skipped);
    assert!(!fx.exported("Heat (1995)/Heat.mkv").exists());
    let record = fx.maps.get(&id("heat-mkv")).await.unwrap().unwrap();
    assert_eq!(record.last_error.as_deref(), Some("Invalid Ancestor"));

    let ignored = fx
        .exporter
        .export_entity(&ctx, &id("heat"), &PathCache::empty())
        .await
        .unwrap();
    assert_eq!(ignored, EntityOutcome::Ignored);
}

#[tokio::test]
async fn removing_a_folder_flags_descendants_deleted() {
    let fx = Fixture::new().await;
    let ctx = fx.ctx(LinkMode::Hardlink);
    fx.exporter.export_subtree(&ctx, &id("movies")).await.unwrap();

    assert!(fx.exporter.remove_export(&id("heat")).await.unwrap());

    assert!(!fx.exported("Heat (1995)").exists());
    assert_eq!(fx.status("heat").await, Some(ExportStatus::Deleted));
    assert_eq!(fx.status("heat-mkv").await, Some(ExportStatus::Deleted));
    assert_eq!(fx.status("heat-srt").await, Some(ExportStatus::Deleted));
    // Source files are never touched.
    assert!(fx.source.join("heat-mkv").exists());

    assert!(!fx.exporter.remove_export(&id("unknown")).await.unwrap());
}

#[tokio::test]
async fn cleanup_removes_exports_of_trashed_entities() {
    let fx = Fixture::new().await;
    let ctx = fx.ctx(LinkMode::Hardlink);
    fx.exporter.export_subtree(&ctx, &id("movies")).await.unwrap();

    fx.entities
        .update(&id("heat-srt"), |e| e.trashed_on = Some(Utc::now()))
        .await;
    fx.entities.remove(&id("heat-mkv")).await;

    let summary = fx.exporter.cleanup_invalid_exports("Movies").await.unwrap();

    assert_eq!(summary.examined, 2);
    assert_eq!(summary.removed, 2);
    assert!(!fx.exported("Heat (1995)/Heat.srt").exists());
    assert!(!fx.exported("Heat (1995)/Heat.mkv").exists());
    assert_eq!(fx.status("heat-srt").await, Some(ExportStatus::Deleted));

    // Deleted rows whose files are gone are not touched again.
    let again = fx.exporter.cleanup_invalid_exports("Movies").await.unwrap();
    assert_eq!(again.removed, 0);
}

#[tokio::test]
async fn dot_titles_stay_inside_the_library() {
    let fx = Fixture::new().await;
    fx.entities
        .upsert(DriveEntity::folder("dots", "..", Some(id("movies"))))
        .await;
    fx.heal().await;
    let ctx = fx.ctx(LinkMode::Hardlink);
    fx.exporter.export_subtree(&ctx, &id("movies")).await.unwrap();

    let record = fx.maps.get(&id("dots")).await.unwrap().unwrap();
    assert_eq!(PathBuf::from(&record.export_path), fx.exported("__"));
    assert!(fx.exported("__").is_dir());

    assert!(fx.exporter.remove_export(&id("dots")).await.unwrap());
    assert!(!fx.exported("__").exists());
    assert!(fx.exported("Heat (1995)/Heat.mkv").exists());
}

#[tokio::test]
async fn moved_file_with_stale_bounds_is_not_exported_here() {
    let fx = Fixture::new().await;
    fx.entities
        .upsert(DriveEntity::folder("shows", "Shows", Some(id("root"))))
        .await;
    fx.entities
        .update(&id("heat-mkv"), |e| e.parent = Some(id("shows")))
        .await;
    let ctx = fx.ctx(LinkMode::Hardlink);

    fx.exporter.export_subtree(&ctx, &id("movies")).await.unwrap();

    assert_eq!(fx.status("heat-mkv").await, Some(ExportStatus::Skipped));
    assert!(!fx.exported("Heat (1995)/Heat.mkv").exists());
    assert!(!fx.exported("My Drive").exists());
    assert!(fx.exported("Heat (1995)/Heat.srt").exists());
}
