//! Read model of the drive hierarchy.
//!
//! Drive entities form a forest linked by `parent`. Most rows also carry
//! nested-set bounds (`lft`/`rgt`) which make subtree queries a single range
//! scan; [`heal`] repairs those bounds when they drift.

pub mod heal;
pub mod memory;
pub mod walk;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::Result, types::EntityId};

pub use heal::{TreeDiagnosis, diagnose_and_heal_tree};
pub use memory::InMemoryEntityStore;
pub use walk::{
    LibraryTarget, PathCache, build_rel_parts, iter_descendants,
    resolve_library,
};

/// `is_active` value of a live row.
pub const ACTIVE: i32 = 1;
/// `is_active` value written when the trash is emptied.
pub const PURGED: i32 = -1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DriveEntity {
    pub id: EntityId,
    pub title: String,
    pub parent: Option<EntityId>,
    pub is_group: bool,
    /// 1 active, 0 soft-deleted, -1 purged.
    pub is_active: i32,
    pub trashed_on: Option<DateTime<Utc>>,
    /// Absolute path of the stored file on the drive host.
    pub path: Option<String>,
    pub file_ext: Option<String>,
    pub mime_type: Option<String>,
    pub lft: Option<i64>,
    pub rgt: Option<i64>,
}

impl DriveEntity {
    pub fn folder(
        id: impl Into<EntityId>,
        title: impl Into<String>,
        parent: Option<EntityId>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            parent,
            is_group: true,
            is_active: ACTIVE,
            trashed_on: None,
            path: None,
            file_ext: None,
            mime_type: None,
            lft: None,
            rgt: None,
        }
    }

    pub fn file(
        id: impl Into<EntityId>,
        title: impl Into<String>,
        parent: Option<EntityId>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            is_group: false,
            path: Some(path.into()),
            ..Self::folder(id, title, parent)
        }
    }

    /// Active and not sitting in the trash.
    pub fn is_valid(&self) -> bool {
        self.is_active == ACTIVE && self.trashed_on.is_none()
    }

    pub fn is_purged(&self) -> bool {
        self.is_active == PURGED
    }

    /// Nested-set bounds, when they describe a non-empty interval.
    pub fn nested_bounds(&self) -> Option<(i64, i64)> {
        match (self.lft, self.rgt) {
            (Some(lft), Some(rgt)) if lft > 0 && lft < rgt => Some((lft, rgt)),
            _ => None,
        }
    }
}

/// Structural view of one row, used to verify nested-set bounds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeNode {
    pub id: EntityId,
    pub parent: Option<EntityId>,
    pub lft: Option<i64>,
    pub rgt: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NestedSetUpdate {
    pub id: EntityId,
    pub lft: i64,
    pub rgt: i64,
}

/// Read access to drive entities plus the nested-set repair hook.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get(&self, id: &EntityId) -> Result<Option<DriveEntity>>;

    async fn get_many(&self, ids: &[EntityId]) -> Result<Vec<DriveEntity>>;

    async fn parent_of(&self, id: &EntityId) -> Result<Option<EntityId>> {
        Ok(self.get(id).await?.and_then(|entity| entity.parent))
    }

    /// Rows strictly inside `(lft, rgt)` in any state, ordered by `lft`.
    async fn nested_within(&self, lft: i64, rgt: i64)
    -> Result<Vec<DriveEntity>>;

    /// Active direct children of `parent`.
    async fn active_children(
        &self,
        parent: &EntityId,
    ) -> Result<Vec<DriveEntity>>;

    async fn tree_nodes(&self) -> Result<Vec<TreeNode>>;

    /// Insert or replace a row pushed by the drive host.
    async fn save(&self, entity: &DriveEntity) -> Result<()>;

    async fn apply_nested_set(&self, updates: &[NestedSetUpdate]) -> Result<()>;
}
