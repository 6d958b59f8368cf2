//! Postgres adapters for the repository ports.

pub mod postgres;

use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;
use tracing::info;

use crate::error::{ExportError, Result};

pub use postgres::{
    PostgresEntityStore, PostgresExportMap, PostgresQueue,
    PostgresSettingsRepository,
};

#[derive(Clone, Debug)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

/// Open a pool and verify the server answers.
pub async fn connect(database_url: &str, config: &PoolConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(database_url)
        .await
        .map_err(|e| {
            ExportError::Database(format!("Failed to connect to Postgres: {e}"))
        })?;

    sqlx::query("SELECT 1").execute(&pool).await.map_err(|e| {
        ExportError::Database(format!("Postgres health check failed: {e}"))
    })?;

    info!(
        max_connections = config.max_connections,
        "Connected to Postgres"
    );
    Ok(pool)
}

/// Apply the embedded migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    crate::MIGRATOR.run(pool).await?;
    info!("Database migrations applied");
    Ok(())
}

pub(crate) fn db_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> ExportError {
    move |err| ExportError::Database(format!("{context}: {err}"))
}
