use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use std::path::PathBuf;

use crate::{
    database::db_err,
    error::{ExportError, Result},
    fsops::LinkMode,
    settings::{ExportSettings, LibrarySettings, SettingsRepository},
    types::{EntityId, QueueName},
};

#[derive(Debug, FromRow)]
struct SettingsRow {
    enabled: bool,
    export_root: String,
    link_mode: String,
    include_images: bool,
    queue: String,
}

#[derive(Debug, FromRow)]
struct LibraryRow {
    library_name: String,
    enabled: bool,
    root_entity: Option<String>,
    export_subdir: Option<String>,
    allowed_extensions: Option<String>,
}

impl From<LibraryRow> for LibrarySettings {
    fn from(row: LibraryRow) -> Self {
        Self {
            library_name: row.library_name,
            enabled: row.enabled,
            root_entity: row.root_entity.map(EntityId::from),
            export_subdir: row.export_subdir,
            allowed_extensions: row.allowed_extensions,
        }
    }
}

/// `export_settings` holds the single document row, `export_libraries` its
/// library table in display order.
#[derive(Clone, Debug)]
pub struct PostgresSettingsRepository {
    pool: PgPool,
}

impl PostgresSettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsRepository for PostgresSettingsRepository {
    async fn load(&self) -> Result<ExportSettings> {
        let row = sqlx::query_as::<_, SettingsRow>(
            r#"
            SELECT enabled, export_root, link_mode, include_images, queue
            FROM export_settings
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("load export settings"))?;

        let Some(row) = row else {
            return Ok(ExportSettings::default());
        };

        let libraries = sqlx::query_as::<_, LibraryRow>(
            r#"
            SELECT library_name, enabled, root_entity, export_subdir,
                   allowed_extensions
            FROM export_libraries
            ORDER BY position
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("load export libraries"))?;

        let link_mode = row
            .link_mode
            .parse::<LinkMode>()
            .map_err(ExportError::InvalidSettings)?;

        Ok(ExportSettings {
            enabled: row.enabled,
            export_root: PathBuf::from(row.export_root),
            link_mode,
            include_images: row.include_images,
            queue: QueueName::new(row.queue),
            libraries: libraries.into_iter().map(LibrarySettings::from).collect(),
        })
    }

    async fn save(&self, settings: &ExportSettings) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("begin settings transaction"))?;

        sqlx::query(
            r#"
            INSERT INTO export_settings
                (id, enabled, export_root, link_mode, include_images, queue,
                 updated_at)
            VALUES (1, $1, $2, $3, $4, $5, NOW())
            ON CONFLICT (id) DO UPDATE SET
                enabled = EXCLUDED.enabled,
                export_root = EXCLUDED.export_root,
                link_mode = EXCLUDED.link_mode,
                include_images = EXCLUDED.include_images,
                queue = EXCLUDED.queue,
                updated_at = NOW()
            "#,
        )
        .bind(settings.enabled)
        .bind(settings.export_root.to_string_lossy().into_owned())
        .bind(settings.link_mode.to_string())
        .bind(settings.include_images)
        .bind(settings.queue.as_str())
        .execute(&mut *tx)
        .await
        .map_err(db_err("save export settings"))?;

        sqlx::query("DELETE FROM export_libraries")
            .execute(&mut *tx)
            .await
            .map_err(db_err("clear export libraries"))?;

        for (position, lib) in settings.libraries.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO export_libraries
                    (position, library_name, enabled, root_entity,
                     export_subdir, allowed_extensions)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(position as i32)
            .bind(&lib.library_name)
            .bind(lib.enabled)
            .bind(lib.root_entity.as_ref().map(EntityId::as_str))
            .bind(lib.export_subdir.as_deref())
            .bind(lib.allowed_extensions.as_deref())
            .execute(&mut *tx)
            .await
            .map_err(db_err("save export library"))?;
        }

        tx.commit()
            .await
            .map_err(db_err("commit settings transaction"))?;
        Ok(())
    }

    async fn is_initialized(&self) -> Result<bool> {
        let found: Option<i16> =
            sqlx::query_scalar("SELECT id FROM export_settings WHERE id = 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err("check export settings"))?;
        Ok(found.is_some())
    }
}
