//! Executes dequeued jobs against the exporter.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    error::ExportError,
    exporter::{CleanupSummary, ExportContext, ExportSummary, Exporter},
    jobs::JobPayload,
    lock::{
        DELETE_LOCK_TTL, LIBRARY_LOCK_TTL, LockProvider, delete_lock_key,
        library_lock_key, with_lock,
    },
    settings::SettingsRepository,
    sync::{SyncError, SyncService},
    tree::{
        EntityStore, LibraryTarget, PathCache, diagnose_and_heal_tree,
        resolve_library,
    },
    types::{EntityId, JobId},
};

#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

/// What a finished job did, for logs and the jobs endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobReport {
    Queued { jobs: Vec<JobId> },
    Exported { summary: ExportSummary },
    Removed { removed: bool },
    Cleaned { summary: CleanupSummary },
}

#[derive(Clone)]
pub struct JobRunner {
    sync: SyncService,
    entities: Arc<dyn EntityStore>,
    exporter: Exporter,
    locks: Arc<dyn LockProvider>,
    site: String,
}

impl std::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunner")
            .field("site", &self.site)
            .finish_non_exhaustive()
    }
}

impl JobRunner {
    pub fn new(
        sync: SyncService,
        entities: Arc<dyn EntityStore>,
        exporter: Exporter,
        locks: Arc<dyn LockProvider>,
        site: impl Into<String>,
    ) -> Self {
        Self {
            sync,
            entities,
            exporter,
            locks,
            site: site.into(),
        }
    }

    fn settings(&self) -> &Arc<dyn SettingsRepository> {
        self.sync.settings()
    }

    pub async fn run(&self, payload: &JobPayload) -> Result<JobReport, JobError> {
        match payload {
            JobPayload::SyncAll => {
                let accepted = self.sync.sync_all().await?;
                Ok(JobReport::Queued {
                    jobs: accepted.jobs,
                })
            }
            JobPayload::SyncLibrary { library_name } => {
                let accepted = self.sync.sync_library(library_name).await?;
                Ok(JobReport::Queued {
                    jobs: accepted.jobs,
                })
            }
            JobPayload::ExportLibrary {
                library_name,
                root_entity,
                export_subdir,
            } => {
                let summary = self
                    .export_library(library_name, root_entity, export_subdir)
                    .await?;
                Ok(JobReport::Exported { summary })
            }
            JobPayload::ExportEntity {
                entity,
                library_name,
                root_entity,
                export_subdir,
            } => {
                let summary = self
                    .export_changed_entity(
                        entity,
                        library_name,
                        root_entity,
                        export_subdir,
                    )
                    .await?;
                Ok(JobReport::Exported { summary })
            }
            JobPayload::DeleteExport { entity } => {
                let removed = with_lock(
                    self.locks.as_ref(),
                    &delete_lock_key(&self.site),
                    DELETE_LOCK_TTL,
                    self.exporter.remove_export(entity),
                )
                .await?;
                debug!(target: "export::jobs", entity = %entity, removed, "delete job finished");
                Ok(JobReport::Removed { removed })
            }
            JobPayload::CleanupLibrary { library_name } => {
                let summary = with_lock(
                    self.locks.as_ref(),
                    &library_lock_key(&self.site, library_name),
                    LIBRARY_LOCK_TTL,
                    self.exporter.cleanup_invalid_exports(library_name),
                )
                .await?;
                Ok(JobReport::Cleaned { summary })
            }
        }
    }

    async fn export_library(
        &self,
        library_name: &str,
        root_entity: &EntityId,
        export_subdir: &str,
    ) -> Result<ExportSummary, ExportError> {
        diagnose_and_heal_tree(self.entities.as_ref(), root_entity).await?;

        let settings = self.settings().load().await?;
        let allowed_exts = settings
            .library(library_name)
            .and_then(|lib| lib.allowed_exts());
        let ctx = ExportContext::new(
            &settings,
            &LibraryTarget {
                library_name: library_name.to_string(),
                root_entity: root_entity.clone(),
                export_subdir: export_subdir.to_string(),
                allowed_exts,
            },
        );

        with_lock(
            self.locks.as_ref(),
            &library_lock_key(&self.site, library_name),
            LIBRARY_LOCK_TTL,
            self.exporter.export_subtree(&ctx, root_entity),
        )
        .await
    }

    async fn export_changed_entity(
        &self,
        entity: &EntityId,
        library_name: &str,
        root_entity: &EntityId,
        export_subdir: &str,
    ) -> Result<ExportSummary, ExportError> {
        diagnose_and_heal_tree(self.entities.as_ref(), root_entity).await?;

        let settings = self.settings().load().await?;
        let allowed_exts =
            resolve_library(&settings, self.entities.as_ref(), entity)
                .await?
                .and_then(|target| target.allowed_exts);
        let ctx = ExportContext::new(
            &settings,
            &LibraryTarget {
                library_name: library_name.to_string(),
                root_entity: root_entity.clone(),
                export_subdir: export_subdir.to_string(),
                allowed_exts,
            },
        );

        let is_group = self
            .entities
            .get(entity)
            .await?
            .is_some_and(|row| row.is_group);

        with_lock(
            self.locks.as_ref(),
            &library_lock_key(&self.site, library_name),
            LIBRARY_LOCK_TTL,
            async {
                if is_group {
                    return self.exporter.export_subtree(&ctx, entity).await;
                }
                let mut summary = ExportSummary::default();
                let outcome = self
                    .exporter
                    .export_entity(&ctx, entity, &PathCache::empty())
                    .await?;
                summary.record(outcome);
                info!(
                    target: "export::jobs",
                    entity = %entity,
                    library = library_name,
                    ?outcome,
                    "entity export finished"
                );
                Ok(summary)
            },
        )
        .await
    }
}
