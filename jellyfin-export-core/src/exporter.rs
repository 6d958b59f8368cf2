//! Maintains the export view: one directory per library mirroring the drive
//! hierarchy, populated with hardlinks, copies or symlinks of media files.

use chrono::Utc;
use serde::Serialize;
use std::{
    collections::{BTreeSet, HashMap},
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, instrument, warn};

use crate::{
    error::Result,
    export_map::{ExportMapRepository, ExportRecord, ExportStatus, ExportType},
    fsops::{
        self, LinkMode, collision_path, ensure_dir, exists, lexists,
        remove_path_safely, same_inode,
    },
    naming::{ExportClass, safe_name, split_ext},
    settings::ExportSettings,
    tree::{
        DriveEntity, EntityStore, LibraryTarget, PathCache, build_rel_parts,
        iter_descendants,
    },
    types::EntityId,
};

const INVALID_ANCESTOR: &str = "Invalid Ancestor";
const MISSING_SOURCE: &str = "Missing src path";

/// Everything an export run needs to know about its library.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportContext {
    pub library_name: String,
    pub library_root: EntityId,
    pub export_root: PathBuf,
    pub export_subdir: String,
    pub link_mode: LinkMode,
    pub include_images: bool,
    pub allowed_exts: Option<BTreeSet<String>>,
}

impl ExportContext {
    pub fn new(settings: &ExportSettings, target: &LibraryTarget) -> Self {
        Self {
            library_name: target.library_name.clone(),
            library_root: target.root_entity.clone(),
            export_root: settings.export_root.clone(),
            export_subdir: target.export_subdir.clone(),
            link_mode: settings.link_mode,
            include_images: settings.include_images,
            allowed_exts: target.allowed_exts.clone(),
        }
    }

    /// `export_root/export_subdir`.
    pub fn base(&self) -> PathBuf {
        self.export_root.join(&self.export_subdir)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityOutcome {
    /// Missing, inactive or trashed; nothing recorded.
    Ignored,
    Exported,
    /// Already present and pointing at the right file.
    Unchanged,
    Skipped,
    Failed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub visited: usize,
    pub exported: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub ignored: usize,
}

impl ExportSummary {
    pub fn record(&mut self, outcome: EntityOutcome) {
        self.visited += 1;
        match outcome {
            EntityOutcome::Ignored => self.ignored += 1,
            EntityOutcome::Exported => self.exported += 1,
            EntityOutcome::Unchanged => self.unchanged += 1,
            EntityOutcome::Skipped => self.skipped += 1,
            EntityOutcome::Failed => self.failed += 1,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CleanupSummary {
    pub examined: usize,
    pub removed: usize,
}

#[derive(Clone)]
pub struct Exporter {
    entities: Arc<dyn EntityStore>,
    maps: Arc<dyn ExportMapRepository>,
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter").finish_non_exhaustive()
    }
}

impl Exporter {
    pub fn new(
        entities: Arc<dyn EntityStore>,
        maps: Arc<dyn ExportMapRepository>,
    ) -> Self {
        Self { entities, maps }
    }

    /// Export (or refresh) a single entity. `cache` may be empty.
    pub async fn export_entity(
        &self,
        ctx: &ExportContext,
        entity: &EntityId,
        cache: &PathCache,
    ) -> Result<EntityOutcome> {
        let store = self.entities.as_ref();
        let Some(ent) = cache.lookup(store, entity).await? else {
            return Ok(EntityOutcome::Ignored);
        };
        if !ent.is_valid() {
            return Ok(EntityOutcome::Ignored);
        }

        ensure_dir(&ctx.base()).await?;

        if ent.is_group {
            self.export_folder(ctx, &ent, cache).await
        } else {
            self.export_file(ctx, &ent, cache).await
        }
    }

    async fn export_folder(
        &self,
        ctx: &ExportContext,
        ent: &DriveEntity,
        cache: &PathCache,
    ) -> Result<EntityOutcome> {
        let parts = build_rel_parts(
            self.entities.as_ref(),
            cache,
            &ent.id,
            &ctx.library_root,
        )
        .await?;

        let Some(parts) = parts else {
            self.drop_previous_export(&ent.id).await?;
            self.maps
                .upsert(
                    &ExportRecord::new(
                        ent.id.clone(),
                        &ctx.library_name,
                        ExportType::Folder,
                    )
                    .with_status(ExportStatus::Skipped)
                    .with_error(INVALID_ANCESTOR),
                )
                .await?;
            return Ok(EntityOutcome::Skipped);
        };

        let folder_dst = join_parts(&ctx.base(), &parts);
        ensure_dir(&folder_dst).await?;

        // Moved or renamed folder: the old location goes away.
        if let Some(previous) = self.maps.get(&ent.id).await?
            && let Some(old) = previous.exported_path()
            && Path::new(old) != folder_dst
        {
            remove_path_safely(Path::new(old)).await;
        }

        self.maps
            .upsert(
                &ExportRecord::new(
                    ent.id.clone(),
                    &ctx.library_name,
                    ExportType::Folder,
                )
                .with_paths("", folder_dst.to_string_lossy()),
            )
            .await?;

        Ok(EntityOutcome::Exported)
    }

    async fn export_file(
        &self,
        ctx: &ExportContext,
        ent: &DriveEntity,
        cache: &PathCache,
    ) -> Result<EntityOutcome> {
        let file_record = || {
            ExportRecord::new(ent.id.clone(), &ctx.library_name, ExportType::File)
        };

        let src_raw = ent.path.as_deref().unwrap_or_default().trim();
        let src = Path::new(src_raw);
        if src_raw.is_empty() || !exists(src).await {
            self.maps
                .upsert(
                    &file_record()
                        .with_paths(src_raw, "")
                        .with_status(ExportStatus::Error)
                        .with_error(MISSING_SOURCE),
                )
                .await?;
            return Ok(EntityOutcome::Failed);
        }

        let ext = split_ext(&ent.title, ent.file_ext.as_deref());
        if ExportClass::classify(&ext, ctx.allowed_exts.as_ref(), ctx.include_images)
            .is_none()
        {
            self.maps
                .upsert(
                    &file_record()
                        .with_paths(src_raw, "")
                        .with_status(ExportStatus::Skipped),
                )
                .await?;
            return Ok(EntityOutcome::Skipped);
        }

        let parts = build_rel_parts(
            self.entities.as_ref(),
            cache,
            &ent.id,
            &ctx.library_root,
        )
        .await?;
        let Some(mut parts) = parts else {
            self.drop_previous_export(&ent.id).await?;
            self.maps
                .upsert(
                    &file_record()
                        .with_paths(src_raw, "")
                        .with_status(ExportStatus::Skipped)
                        .with_error(INVALID_ANCESTOR),
                )
                .await?;
            return Ok(EntityOutcome::Skipped);
        };
        if parts.is_empty() {
            parts.push(safe_name(&ent.title));
        }

        let desired = join_parts(&ctx.base(), &parts);
        if let Some(parent) = desired.parent() {
            ensure_dir(parent).await?;
        }

        if let Some(previous) = self.maps.get(&ent.id).await?
            && let Some(old) = previous.exported_path()
        {
            let old = PathBuf::from(old);
            let current = old == desired || old == collision_path(&desired, &ent.id);

            if current
                && exists(&old).await
                && (ctx.link_mode != LinkMode::Hardlink
                    || same_inode(src, &old).await)
            {
                return Ok(EntityOutcome::Unchanged);
            }

            if !current && exists(&old).await {
                debug!(
                    target: "export::jobs",
                    entity = %ent.id,
                    old = %old.display(),
                    new = %desired.display(),
                    "export moved"
                );
                remove_path_safely(&old).await;
            }
        }

        let mut dst = desired;
        if exists(&dst).await {
            if ctx.link_mode == LinkMode::Hardlink && same_inode(src, &dst).await {
                self.maps
                    .upsert(&file_record().with_paths(src_raw, dst.to_string_lossy()))
                    .await?;
                return Ok(EntityOutcome::Exported);
            }
            // Another entity owns this name.
            dst = collision_path(&dst, &ent.id);
        }

        match fsops::link_or_copy(src, &dst, ctx.link_mode, &ctx.export_root).await
        {
            Ok(outcome) => {
                debug!(
                    target: "export::jobs",
                    entity = %ent.id,
                    dst = %dst.display(),
                    ?outcome,
                    "exported file"
                );
                self.maps
                    .upsert(&file_record().with_paths(src_raw, dst.to_string_lossy()))
                    .await?;
                Ok(EntityOutcome::Exported)
            }
            Err(err) => {
                warn!(
                    target: "export::jobs",
                    entity = %ent.id,
                    dst = %dst.display(),
                    error = %err,
                    "export failed"
                );
                self.maps
                    .upsert(
                        &file_record()
                            .with_paths(src_raw, dst.to_string_lossy())
                            .with_status(ExportStatus::Error)
                            .with_error(err.to_string()),
                    )
                    .await?;
                Ok(EntityOutcome::Failed)
            }
        }
    }

    /// Export `root` and everything below it.
    #[instrument(skip(self, ctx), fields(library = %ctx.library_name))]
    pub async fn export_subtree(
        &self,
        ctx: &ExportContext,
        root: &EntityId,
    ) -> Result<ExportSummary> {
        let store = self.entities.as_ref();
        let cache = PathCache::build(store, root).await?;
        let mut summary = ExportSummary::default();

        summary.record(self.export_entity(ctx, root, &cache).await?);

        for row in iter_descendants(store, root).await? {
            summary.record(self.export_entity(ctx, &row.id, &cache).await?);
        }

        info!(
            target: "export::jobs",
            library = %ctx.library_name,
            root = %root,
            visited = summary.visited,
            exported = summary.exported,
            unchanged = summary.unchanged,
            skipped = summary.skipped,
            failed = summary.failed,
            "subtree export finished"
        );

        Ok(summary)
    }

    /// Remove the exported file or folder of `entity` and flag it (and, for
    /// folders, every nested descendant) as deleted. Returns false when the
    /// entity was never exported.
    pub async fn remove_export(&self, entity: &EntityId) -> Result<bool> {
        let Some(record) = self.maps.get(entity).await? else {
            return Ok(false);
        };

        if let Some(path) = record.exported_path() {
            remove_path_safely(Path::new(path)).await;
        }

        let now = Utc::now();
        self.maps.mark_deleted(std::slice::from_ref(entity), now).await?;

        if let Some(ent) = self.entities.get(entity).await?
            && ent.is_group
            && let Some((lft, rgt)) = ent.nested_bounds()
        {
            let descendants: Vec<EntityId> = self
                .entities
                .nested_within(lft, rgt)
                .await?
                .into_iter()
                .map(|row| row.id)
                .collect();
            if !descendants.is_empty() {
                let touched = self.maps.mark_deleted(&descendants, now).await?;
                debug!(
                    target: "export::jobs",
                    entity = %entity,
                    descendants = touched,
                    "descendant exports flagged deleted"
                );
            }
        }

        Ok(true)
    }

    /// Remove exports whose drive entity is gone, inactive or trashed, plus
    /// "zombie" rows already flagged deleted whose files still exist.
    pub async fn cleanup_invalid_exports(
        &self,
        library: &str,
    ) -> Result<CleanupSummary> {
        let records = self.maps.list_by_library(library).await?;
        let ids: Vec<EntityId> =
            records.iter().map(|r| r.drive_entity.clone()).collect();
        let live: HashMap<EntityId, DriveEntity> = self
            .entities
            .get_many(&ids)
            .await?
            .into_iter()
            .map(|entity| (entity.id.clone(), entity))
            .collect();

        let mut summary = CleanupSummary::default();
        for record in records {
            let invalid = live
                .get(&record.drive_entity)
                .is_none_or(|entity| !entity.is_valid());
            if !invalid {
                continue;
            }
            summary.examined += 1;

            let should_remove = match record.status {
                ExportStatus::Deleted => match record.exported_path() {
                    Some(path) => lexists(Path::new(path)).await,
                    None => false,
                },
                _ => true,
            };

            if should_remove && self.remove_export(&record.drive_entity).await? {
                summary.removed += 1;
            }
        }

        info!(
            target: "export::jobs",
            library,
            examined = summary.examined,
            removed = summary.removed,
            "invalid exports cleaned"
        );

        Ok(summary)
    }

    async fn drop_previous_export(&self, entity: &EntityId) -> Result<()> {
        if let Some(previous) = self.maps.get(entity).await?
            && let Some(path) = previous.exported_path()
        {
            remove_path_safely(Path::new(path)).await;
        }
        Ok(())
    }
}

fn join_parts(base: &Path, parts: &[String]) -> PathBuf {
    parts.iter().fold(base.to_path_buf(), |acc, part| acc.join(part))
}
