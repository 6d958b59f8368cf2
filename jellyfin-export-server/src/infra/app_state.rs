use std::{fmt, sync::Arc};

use jellyfin_export_core::{
    export_map::{ExportMapRepository, InMemoryExportMap},
    exporter::Exporter,
    jobs::{InMemoryQueue, QueueService},
    lock::{InProcessLocks, LockProvider},
    runner::JobRunner,
    settings::{InMemorySettingsRepository, SettingsRepository},
    sync::SyncService,
    tree::{EntityStore, InMemoryEntityStore},
};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::infra::config::Config;

/// Storage adapters behind the services.
#[derive(Clone)]
pub struct Backends {
    pub settings: Arc<dyn SettingsRepository>,
    pub entities: Arc<dyn EntityStore>,
    pub exports: Arc<dyn ExportMapRepository>,
    pub queue: Arc<dyn QueueService>,
    pub locks: Arc<dyn LockProvider>,
    pub postgres: Option<PgPool>,
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backends")
            .field("postgres", &self.postgres.is_some())
            .finish_non_exhaustive()
    }
}

impl Backends {
    /// Everything in process memory. Lost on restart.
    pub fn in_memory() -> Self {
        Self {
            settings: Arc::new(InMemorySettingsRepository::new()),
            entities: Arc::new(InMemoryEntityStore::new()),
            exports: Arc::new(InMemoryExportMap::new()),
            queue: Arc::new(InMemoryQueue::new()),
            locks: Arc::new(InProcessLocks::new()),
            postgres: None,
        }
    }

    pub fn postgres(pool: PgPool, locks: Arc<dyn LockProvider>) -> Self {
        use jellyfin_export_core::database::{
            PostgresEntityStore, PostgresExportMap, PostgresQueue,
            PostgresSettingsRepository,
        };

        Self {
            settings: Arc::new(PostgresSettingsRepository::new(pool.clone())),
            entities: Arc::new(PostgresEntityStore::new(pool.clone())),
            exports: Arc::new(PostgresExportMap::new(pool.clone())),
            queue: Arc::new(PostgresQueue::new(pool.clone())),
            locks,
            postgres: Some(pool),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub backends: Backends,
    pub sync: SyncService,
    pub runner: JobRunner,
    /// Cancelled on shutdown; background tasks watch it.
    pub shutdown: CancellationToken,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(config: Arc<Config>, backends: Backends) -> Self {
        let sync = SyncService::new(
            Arc::clone(&backends.settings),
            Arc::clone(&backends.entities),
            Arc::clone(&backends.queue),
        );
        let exporter = Exporter::new(
            Arc::clone(&backends.entities),
            Arc::clone(&backends.exports),
        );
        let runner = JobRunner::new(
            sync.clone(),
            Arc::clone(&backends.entities),
            exporter,
            Arc::clone(&backends.locks),
            config.site_name.clone(),
        );

        Self {
            config,
            backends,
            sync,
            runner,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn settings(&self) -> &Arc<dyn SettingsRepository> {
        &self.backends.settings
    }

    pub fn entities(&self) -> &Arc<dyn EntityStore> {
        &self.backends.entities
    }

    pub fn exports(&self) -> &Arc<dyn ExportMapRepository> {
        &self.backends.exports
    }

    pub fn queue(&self) -> &Arc<dyn QueueService> {
        &self.backends.queue
    }

    pub fn postgres(&self) -> Option<&PgPool> {
        self.backends.postgres.as_ref()
    }
}
