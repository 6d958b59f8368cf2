use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::{
    database::db_err,
    error::Result,
    tree::{ACTIVE, DriveEntity, EntityStore, NestedSetUpdate, TreeNode},
    types::EntityId,
};

const ENTITY_COLUMNS: &str = "id, title, parent, is_group, is_active, \
     trashed_on, path, file_ext, mime_type, lft, rgt";

#[derive(Debug, FromRow)]
struct EntityRow {
    id: String,
    title: String,
    parent: Option<String>,
    is_group: bool,
    is_active: i32,
    trashed_on: Option<DateTime<Utc>>,
    path: Option<String>,
    file_ext: Option<String>,
    mime_type: Option<String>,
    lft: Option<i64>,
    rgt: Option<i64>,
}

impl From<EntityRow> for DriveEntity {
    fn from(row: EntityRow) -> Self {
        Self {
            id: EntityId(row.id),
            title: row.title,
            parent: row.parent.map(EntityId),
            is_group: row.is_group,
            is_active: row.is_active,
            trashed_on: row.trashed_on,
            path: row.path,
            file_ext: row.file_ext,
            mime_type: row.mime_type,
            lft: row.lft,
            rgt: row.rgt,
        }
    }
}

#[derive(Debug, FromRow)]
struct NodeRow {
    id: String,
    parent: Option<String>,
    lft: Option<i64>,
    rgt: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct PostgresEntityStore {
    pool: PgPool,
}

impl PostgresEntityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntityStore for PostgresEntityStore {
    async fn get(&self, id: &EntityId) -> Result<Option<DriveEntity>> {
        let sql =
            format!("SELECT {ENTITY_COLUMNS} FROM drive_entities WHERE id = $1");
        let row = sqlx::query_as::<_, EntityRow>(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("load drive entity"))?;
        Ok(row.map(DriveEntity::from))
    }

    async fn get_many(&self, ids: &[EntityId]) -> Result<Vec<DriveEntity>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<&str> = ids.iter().map(EntityId::as_str).collect();
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM drive_entities WHERE id = ANY($1)"
        );
        let rows = sqlx::query_as::<_, EntityRow>(&sql)
            .bind(&keys)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("load drive entities"))?;
        Ok(rows.into_iter().map(DriveEntity::from).collect())
    }

    async fn parent_of(&self, id: &EntityId) -> Result<Option<EntityId>> {
        let parent: Option<Option<String>> =
            sqlx::query_scalar("SELECT parent FROM drive_entities WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err("load entity parent"))?;
        Ok(parent.flatten().map(EntityId))
    }

    async fn nested_within(
        &self,
        lft: i64,
        rgt: i64,
    ) -> Result<Vec<DriveEntity>> {
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM drive_entities \
             WHERE lft > $1 AND rgt < $2 ORDER BY lft"
        );
        let rows = sqlx::query_as::<_, EntityRow>(&sql)
            .bind(lft)
            .bind(rgt)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("load nested entities"))?;
        Ok(rows.into_iter().map(DriveEntity::from).collect())
    }

    async fn active_children(
        &self,
        parent: &EntityId,
    ) -> Result<Vec<DriveEntity>> {
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM drive_entities \
             WHERE parent = $1 AND is_active = $2 ORDER BY id"
        );
        let rows = sqlx::query_as::<_, EntityRow>(&sql)
            .bind(parent.as_str())
            .bind(ACTIVE)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("load child entities"))?;
        Ok(rows.into_iter().map(DriveEntity::from).collect())
    }

    async fn tree_nodes(&self) -> Result<Vec<TreeNode>> {
        let rows = sqlx::query_as::<_, NodeRow>(
            "SELECT id, parent, lft, rgt FROM drive_entities",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("load tree nodes"))?;

        Ok(rows
            .into_iter()
            .map(|row| TreeNode {
                id: EntityId(row.id),
                parent: row.parent.map(EntityId),
                lft: row.lft,
                rgt: row.rgt,
            })
            .collect())
    }

    async fn save(&self, entity: &DriveEntity) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO drive_entities
                (id, title, parent, is_group, is_active, trashed_on, path,
                 file_ext, mime_type, lft, rgt)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                parent = EXCLUDED.parent,
                is_group = EXCLUDED.is_group,
                is_active = EXCLUDED.is_active,
                trashed_on = EXCLUDED.trashed_on,
                path = EXCLUDED.path,
                file_ext = EXCLUDED.file_ext,
                mime_type = EXCLUDED.mime_type,
                lft = COALESCE(EXCLUDED.lft, drive_entities.lft),
                rgt = COALESCE(EXCLUDED.rgt, drive_entities.rgt)
            "#,
        )
        .bind(entity.id.as_str())
        .bind(&entity.title)
        .bind(entity.parent.as_ref().map(EntityId::as_str))
        .bind(entity.is_group)
        .bind(entity.is_active)
        .bind(entity.trashed_on)
        .bind(entity.path.as_deref())
        .bind(entity.file_ext.as_deref())
        .bind(entity.mime_type.as_deref())
        .bind(entity.lft)
        .bind(entity.rgt)
        .execute(&self.pool)
        .await
        .map_err(db_err("save drive entity"))?;
        Ok(())
    }

    async fn apply_nested_set(&self, updates: &[NestedSetUpdate]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let ids: Vec<&str> = updates.iter().map(|u| u.id.as_str()).collect();
        let lfts: Vec<i64> = updates.iter().map(|u| u.lft).collect();
        let rgts: Vec<i64> = updates.iter().map(|u| u.rgt).collect();

        sqlx::query(
            r#"
            UPDATE drive_entities AS d
            SET lft = u.lft, rgt = u.rgt
            FROM UNNEST($1::text[], $2::bigint[], $3::bigint[])
                AS u(id, lft, rgt)
            WHERE d.id = u.id
            "#,
        )
        .bind(&ids)
        .bind(&lfts)
        .bind(&rgts)
        .execute(&self.pool)
        .await
        .map_err(db_err("rewrite nested set"))?;
        Ok(())
    }
}
