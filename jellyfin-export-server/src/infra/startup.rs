use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::infra::{
    app_state::AppState,
    scheduler::{MAINTENANCE_INTERVAL, spawn_periodic_resync, spawn_queue_maintenance},
    workers::WorkerPool,
};

#[async_trait]
pub trait StartupHooks: Send + Sync {
    async fn run(&self, state: &AppState) -> Result<()>;
}

/// Seeds the settings store, then starts queue maintenance, the workers and
/// the resync timer.
#[derive(Debug, Default)]
pub struct ProdStartupHooks;

#[async_trait]
impl StartupHooks for ProdStartupHooks {
    async fn run(&self, state: &AppState) -> Result<()> {
        seed_settings(state).await?;

        let settings = state
            .settings()
            .load()
            .await
            .context("failed to load export settings")?;
        if !state.config().queues.contains(&settings.queue) {
            warn!(
                queue = %settings.queue,
                consumed = ?state.config().queues,
                "export jobs target a queue no local worker consumes"
            );
        }

        spawn_queue_maintenance(
            Arc::clone(state.queue()),
            state.config().job_retention,
            MAINTENANCE_INTERVAL,
            state.shutdown.clone(),
        );

        let workers = WorkerPool::from_state(state).spawn(state.config().workers);
        info!(workers = workers.len(), "export workers started");

        spawn_periodic_resync(
            state.sync.clone(),
            state.config().resync_interval,
            state.shutdown.clone(),
        );

        Ok(())
    }
}

/// Write the configured seed when the store holds no settings yet.
pub async fn seed_settings(state: &AppState) -> Result<()> {
    let Some(seed) = state.config().settings_seed.as_ref() else {
        return Ok(());
    };
    if state.settings().is_initialized().await? {
        info!("export settings already stored, seed ignored");
        return Ok(());
    }

    seed.validate().context("settings seed rejected")?;
    state
        .settings()
        .save(seed)
        .await
        .context("failed to store settings seed")?;
    info!(libraries = seed.libraries.len(), "export settings seeded");
    Ok(())
}

#[derive(Debug, Default)]
pub struct NoopStartupHooks;

#[async_trait]
impl StartupHooks for NoopStartupHooks {
    async fn run(&self, _state: &AppState) -> Result<()> {
        Ok(())
    }
}
