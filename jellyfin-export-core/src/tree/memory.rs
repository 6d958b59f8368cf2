use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{DriveEntity, EntityStore, NestedSetUpdate, TreeNode};
use crate::{error::Result, types::EntityId};

/// Entity store for tests and database-less runs.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    rows: RwLock<BTreeMap<EntityId, DriveEntity>>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entities(entities: impl IntoIterator<Item = DriveEntity>) -> Self {
        let rows = entities
            .into_iter()
            .map(|entity| (entity.id.clone(), entity))
            .collect();
        Self {
            rows: RwLock::new(rows),
        }
    }

    pub async fn upsert(&self, entity: DriveEntity) {
        self.rows.write().await.insert(entity.id.clone(), entity);
    }

    pub async fn remove(&self, id: &EntityId) -> Option<DriveEntity> {
        self.rows.write().await.remove(id)
    }

    /// Apply `change` to one row; returns false when the row is unknown.
    pub async fn update<F>(&self, id: &EntityId, change: F) -> bool
    where
        F: FnOnce(&mut DriveEntity),
    {
        match self.rows.write().await.get_mut(id) {
            Some(entity) => {
                change(entity);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn get(&self, id: &EntityId) -> Result<Option<DriveEntity>> {
        Ok(self.rows.read().await.get(id).cloned())
    }

    async fn get_many(&self, ids: &[EntityId]) -> Result<Vec<DriveEntity>> {
        let rows = self.rows.read().await;
        Ok(ids.iter().filter_map(|id| rows.get(id).cloned()).collect())
    }

    async fn nested_within(
        &self,
        lft: i64,
        rgt: i64,
    ) -> Result<Vec<DriveEntity>> {
        let rows = self.rows.read().await;
        let mut inside: Vec<DriveEntity> = rows
            .values()
            .filter(|entity| match (entity.lft, entity.rgt) {
                (Some(l), Some(r)) => l > lft && r < rgt,
                _ => false,
            })
            .cloned()
            .collect();
        inside.sort_by_key(|entity| entity.lft);
        Ok(inside)
    }

    async fn active_children(
        &self,
        parent: &EntityId,
    ) -> Result<Vec<DriveEntity>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|entity| {
                entity.parent.as_ref() == Some(parent)
                    && entity.is_active == super::ACTIVE
            })
            .cloned()
            .collect())
    }

    async fn tree_nodes(&self) -> Result<Vec<TreeNode>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .map(|entity| TreeNode {
                id: entity.id.clone(),
                parent: entity.parent.clone(),
                lft: entity.lft,
                rgt: entity.rgt,
            })
            .collect())
    }

    async fn save(&self, entity: &DriveEntity) -> Result<()> {
        self.upsert(entity.clone()).await;
        Ok(())
    }

    async fn apply_nested_set(&self, updates: &[NestedSetUpdate]) -> Result<()> {
        let mut rows = self.rows.write().await;
        for update in updates {
            if let Some(entity) = rows.get_mut(&update.id) {
                entity.lft = Some(update.lft);
                entity.rgt = Some(update.rgt);
            }
        }
        Ok(())
    }
}
