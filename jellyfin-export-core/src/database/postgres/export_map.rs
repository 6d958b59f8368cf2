use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use crate::{
    database::db_err,
    error::{ExportError, Result},
    export_map::{ExportFilter, ExportMapRepository, ExportRecord},
    types::EntityId,
};

#[derive(Debug, FromRow)]
struct ExportRow {
    drive_entity: String,
    library_name: String,
    src_path: String,
    export_path: String,
    export_type: String,
    status: String,
    last_exported_on: DateTime<Utc>,
    last_error: Option<String>,
}

impl TryFrom<ExportRow> for ExportRecord {
    type Error = ExportError;

    fn try_from(row: ExportRow) -> Result<Self> {
        Ok(Self {
            drive_entity: EntityId(row.drive_entity),
            library_name: row.library_name,
            src_path: row.src_path,
            export_path: row.export_path,
            export_type: row.export_type.parse().map_err(ExportError::Database)?,
            status: row.status.parse().map_err(ExportError::Database)?,
            last_exported_on: row.last_exported_on,
            last_error: row.last_error,
        })
    }
}

const SELECT_EXPORTS: &str = "SELECT drive_entity, library_name, src_path, \
     export_path, export_type, status, last_exported_on, last_error \
     FROM export_map";

#[derive(Clone, Debug)]
pub struct PostgresExportMap {
    pool: PgPool,
}

impl PostgresExportMap {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_records(rows: Vec<ExportRow>) -> Result<Vec<ExportRecord>> {
    rows.into_iter().map(ExportRecord::try_from).collect()
}

#[async_trait]
impl ExportMapRepository for PostgresExportMap {
    async fn get(&self, entity: &EntityId) -> Result<Option<ExportRecord>> {
        let sql = format!("{SELECT_EXPORTS} WHERE drive_entity = $1");
        let row = sqlx::query_as::<_, ExportRow>(&sql)
            .bind(entity.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("load export record"))?;
        row.map(ExportRecord::try_from).transpose()
    }

    async fn upsert(&self, record: &ExportRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO export_map
                (drive_entity, library_name, src_path, export_path,
                 export_type, status, last_exported_on, last_error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (drive_entity) DO UPDATE SET
                library_name = EXCLUDED.library_name,
                src_path = EXCLUDED.src_path,
                export_path = EXCLUDED.export_path,
                export_type = EXCLUDED.export_type,
                status = EXCLUDED.status,
                last_exported_on = EXCLUDED.last_exported_on,
                last_error = EXCLUDED.last_error
            "#,
        )
        .bind(record.drive_entity.as_str())
        .bind(&record.library_name)
        .bind(&record.src_path)
        .bind(&record.export_path)
        .bind(record.export_type.as_str())
        .bind(record.status.as_str())
        .bind(record.last_exported_on)
        .bind(record.last_error.as_deref())
        .execute(&self.pool)
        .await
        .map_err(db_err("save export record"))?;
        Ok(())
    }

    async fn mark_deleted(
        &self,
        entities: &[EntityId],
        at: DateTime<Utc>,
    ) -> Result<u64> {
        if entities.is_empty() {
            return Ok(0);
        }
        let keys: Vec<&str> = entities.iter().map(EntityId::as_str).collect();
        let result = sqlx::query(
            r#"
            UPDATE export_map
            SET status = 'deleted', last_exported_on = $2
            WHERE drive_entity = ANY($1)
            "#,
        )
        .bind(&keys)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(db_err("flag exports deleted"))?;
        Ok(result.rows_affected())
    }

    async fn list_by_library(&self, library: &str) -> Result<Vec<ExportRecord>> {
        let sql = format!("{SELECT_EXPORTS} WHERE library_name = $1");
        let rows = sqlx::query_as::<_, ExportRow>(&sql)
            .bind(library)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("list library exports"))?;
        into_records(rows)
    }

    async fn list(&self, filter: &ExportFilter) -> Result<Vec<ExportRecord>> {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(SELECT_EXPORTS);
        builder.push(" WHERE TRUE");
        if let Some(library) = filter.library.as_deref() {
            builder.push(" AND library_name = ").push_bind(library);
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        builder.push(" ORDER BY last_exported_on DESC");
        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = builder
            .build_query_as::<ExportRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("list exports"))?;
        into_records(rows)
    }
}
