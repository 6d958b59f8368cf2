//! Entry points that turn user clicks, drive hooks and the nightly timer into
//! queued jobs. Nothing here touches the export view directly.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    error::ExportError,
    jobs::{
        DELETE_TIMEOUT, ENTITY_EXPORT_TIMEOUT, EnqueueRequest, JobHandle,
        JobPayload, LIBRARY_SYNC_TIMEOUT, QueueService,
    },
    settings::{ExportSettings, SettingsRepository},
    tree::{EntityStore, resolve_library},
    types::{EntityId, JobId},
};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Jellyfin Export is disabled.")]
    Disabled,

    #[error("Library not found or disabled: {0}")]
    LibraryNotFound(String),

    #[error("Library {0} has no root folder configured")]
    LibraryRootMissing(String),

    #[error(transparent)]
    Storage(#[from] ExportError),
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Reply of the remote sync methods once the work is queued.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SyncAccepted {
    pub message: String,
    pub jobs: Vec<JobId>,
}

impl SyncAccepted {
    fn queued(jobs: Vec<JobId>) -> Self {
        Self {
            message: "Queued".to_string(),
            jobs,
        }
    }
}

#[derive(Clone)]
pub struct SyncService {
    settings: Arc<dyn SettingsRepository>,
    entities: Arc<dyn EntityStore>,
    queue: Arc<dyn QueueService>,
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService").finish_non_exhaustive()
    }
}

impl SyncService {
    pub fn new(
        settings: Arc<dyn SettingsRepository>,
        entities: Arc<dyn EntityStore>,
        queue: Arc<dyn QueueService>,
    ) -> Self {
        Self {
            settings,
            entities,
            queue,
        }
    }

    pub fn settings(&self) -> &Arc<dyn SettingsRepository> {
        &self.settings
    }

    pub fn queue(&self) -> &Arc<dyn QueueService> {
        &self.queue
    }

    /// Queue one library sync per enabled library with a root folder.
    pub async fn sync_all(&self) -> SyncResult<SyncAccepted> {
        let settings = self.settings.load().await?;
        if !settings.enabled {
            return Err(SyncError::Disabled);
        }

        let requests: Vec<EnqueueRequest> = settings
            .exportable_libraries()
            .map(|lib| {
                library_request(
                    &settings,
                    JobPayload::SyncLibrary {
                        library_name: lib.library_name.clone(),
                    },
                )
            })
            .collect();

        let handles = self.queue.enqueue_many(requests).await?;
        info!(
            target: "export::jobs",
            libraries = handles.len(),
            "full sync queued"
        );
        Ok(SyncAccepted::queued(job_ids(&handles)))
    }

    /// Queue a full subtree export of one enabled library.
    pub async fn sync_library(&self, library_name: &str) -> SyncResult<SyncAccepted> {
        let settings = self.settings.load().await?;
        let lib = settings
            .enabled_library(library_name)
            .ok_or_else(|| SyncError::LibraryNotFound(library_name.to_string()))?;
        let root_entity = lib
            .root_entity
            .clone()
            .ok_or_else(|| SyncError::LibraryRootMissing(library_name.to_string()))?;

        let handle = self
            .queue
            .enqueue(library_request(
                &settings,
                JobPayload::ExportLibrary {
                    library_name: lib.library_name.clone(),
                    root_entity,
                    export_subdir: lib.effective_subdir(),
                },
            ))
            .await?;

        info!(
            target: "export::jobs",
            library = library_name,
            job = %handle.job_id,
            "library sync queued"
        );
        Ok(SyncAccepted::queued(vec![handle.job_id]))
    }

    /// Queue removal of exports whose entities are gone or trashed.
    pub async fn cleanup_library(&self, library_name: &str) -> SyncResult<SyncAccepted> {
        let settings = self.settings.load().await?;
        let lib = settings
            .enabled_library(library_name)
            .ok_or_else(|| SyncError::LibraryNotFound(library_name.to_string()))?;

        let handle = self
            .queue
            .enqueue(library_request(
                &settings,
                JobPayload::CleanupLibrary {
                    library_name: lib.library_name.clone(),
                },
            ))
            .await?;
        Ok(SyncAccepted::queued(vec![handle.job_id]))
    }

    /// Periodic safety net: full sync plus a cleanup pass per library.
    /// Does nothing while the export is disabled.
    pub async fn nightly_resync(&self) -> SyncResult<Vec<JobId>> {
        let settings = self.settings.load().await?;
        if !settings.enabled {
            debug!(target: "export::jobs", "nightly resync skipped, export disabled");
            return Ok(Vec::new());
        }

        let mut requests =
            vec![library_request(&settings, JobPayload::SyncAll)];
        requests.extend(settings.exportable_libraries().map(|lib| {
            library_request(
                &settings,
                JobPayload::CleanupLibrary {
                    library_name: lib.library_name.clone(),
                },
            )
        }));

        let handles = self.queue.enqueue_many(requests).await?;
        info!(target: "export::jobs", jobs = handles.len(), "nightly resync queued");
        Ok(job_ids(&handles))
    }

    /// A drive entity was created, renamed, moved or purged.
    pub async fn on_entity_change(
        &self,
        entity: &EntityId,
    ) -> SyncResult<Option<JobHandle>> {
        let settings = self.settings.load().await?;
        if !settings.enabled {
            return Ok(None);
        }
        let Some(row) = self.entities.get(entity).await? else {
            debug!(target: "export::jobs", entity = %entity, "change for unknown entity ignored");
            return Ok(None);
        };

        if row.is_purged() {
            return self.enqueue_delete(&settings, entity).await.map(Some);
        }

        let Some(target) =
            resolve_library(&settings, self.entities.as_ref(), entity).await?
        else {
            return Ok(None);
        };

        let handle = self
            .queue
            .enqueue(EnqueueRequest::new(
                settings.queue.clone(),
                JobPayload::ExportEntity {
                    entity: entity.clone(),
                    library_name: target.library_name,
                    root_entity: target.root_entity,
                    export_subdir: target.export_subdir,
                },
                ENTITY_EXPORT_TIMEOUT,
            ))
            .await?;
        Ok(Some(handle))
    }

    /// A drive entity was moved to the trash.
    pub async fn on_entity_trash(
        &self,
        entity: &EntityId,
    ) -> SyncResult<Option<JobHandle>> {
        let settings = self.settings.load().await?;
        if !settings.enabled {
            return Ok(None);
        }
        self.enqueue_delete(&settings, entity).await.map(Some)
    }

    async fn enqueue_delete(
        &self,
        settings: &ExportSettings,
        entity: &EntityId,
    ) -> SyncResult<JobHandle> {
        Ok(self
            .queue
            .enqueue(EnqueueRequest::new(
                settings.queue.clone(),
                JobPayload::DeleteExport {
                    entity: entity.clone(),
                },
                DELETE_TIMEOUT,
            ))
            .await?)
    }
}

fn library_request(settings: &ExportSettings, payload: JobPayload) -> EnqueueRequest {
    EnqueueRequest::new(settings.queue.clone(), payload, LIBRARY_SYNC_TIMEOUT)
}

fn job_ids(handles: &[JobHandle]) -> Vec<JobId> {
    handles.iter().map(|handle| handle.job_id).collect()
}
