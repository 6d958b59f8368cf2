use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use super::{DriveEntity, EntityStore};
use crate::{
    error::Result, naming::safe_name, settings::ExportSettings, types::EntityId,
};

/// Active, untrashed descendants of `root` (root excluded).
///
/// Uses the nested-set range when the root carries usable bounds and falls
/// back to a breadth-first walk over parent links otherwise.
pub async fn iter_descendants(
    store: &dyn EntityStore,
    root: &EntityId,
) -> Result<Vec<DriveEntity>> {
    let Some(root_entity) = store.get(root).await? else {
        return Ok(Vec::new());
    };

    if let Some((lft, rgt)) = root_entity.nested_bounds() {
        let rows = store.nested_within(lft, rgt).await?;
        return Ok(rows.into_iter().filter(DriveEntity::is_valid).collect());
    }

    let mut out = Vec::new();
    let mut seen: HashSet<EntityId> = HashSet::from([root.clone()]);
    let mut queue = VecDeque::from([root.clone()]);

    while let Some(parent) = queue.pop_front() {
        for child in store.active_children(&parent).await? {
            if child.trashed_on.is_some() || !seen.insert(child.id.clone()) {
                continue;
            }
            if child.is_group {
                queue.push_back(child.id.clone());
            }
            out.push(child);
        }
    }

    Ok(out)
}

/// Snapshot of a subtree taken at the start of an export run so path
/// building does not hit the store once per ancestor per file.
#[derive(Debug, Default)]
pub struct PathCache {
    entries: HashMap<EntityId, DriveEntity>,
}

impl PathCache {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load `root` and every row inside its nested-set bounds.
    pub async fn build(store: &dyn EntityStore, root: &EntityId) -> Result<Self> {
        let mut entries = HashMap::new();
        let Some(root_entity) = store.get(root).await? else {
            return Ok(Self { entries });
        };

        if let Some((lft, rgt)) = root_entity.nested_bounds() {
            for entity in store.nested_within(lft, rgt).await? {
                entries.insert(entity.id.clone(), entity);
            }
        }
        entries.insert(root_entity.id.clone(), root_entity);

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached row, or a store lookup on a miss (ancestors above the root).
    pub async fn lookup(
        &self,
        store: &dyn EntityStore,
        id: &EntityId,
    ) -> Result<Option<DriveEntity>> {
        match self.entries.get(id) {
            Some(entity) => Ok(Some(entity.clone())),
            None => store.get(id).await,
        }
    }
}

/// Path components from `stop_at` (exclusive) down to `entity`.
///
/// Returns `None` when the entity or any ancestor on the way is missing,
/// inactive or trashed, or when the parent chain never reaches `stop_at`;
/// such entities must not appear in this library's export view.
pub async fn build_rel_parts(
    store: &dyn EntityStore,
    cache: &PathCache,
    entity: &EntityId,
    stop_at: &EntityId,
) -> Result<Option<Vec<String>>> {
    let mut parts = Vec::new();
    let mut seen: HashSet<EntityId> = HashSet::new();
    let mut cursor = Some(entity.clone());

    while let Some(id) = cursor {
        if !seen.insert(id.clone()) {
            return Ok(None);
        }

        let Some(info) = cache.lookup(store, &id).await? else {
            return Ok(None);
        };
        if !info.is_valid() {
            return Ok(None);
        }
        if &info.id == stop_at {
            parts.reverse();
            return Ok(Some(parts));
        }

        parts.push(safe_name(&info.title));
        cursor = info.parent;
    }

    Ok(None)
}

/// Library an entity belongs to, resolved from the settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LibraryTarget {
    pub library_name: String,
    pub root_entity: EntityId,
    pub export_subdir: String,
    pub allowed_exts: Option<BTreeSet<String>>,
}

/// Walk up from `entity` until an enabled library root is met.
pub async fn resolve_library(
    settings: &ExportSettings,
    store: &dyn EntityStore,
    entity: &EntityId,
) -> Result<Option<LibraryTarget>> {
    let mut roots = HashMap::new();
    for lib in settings.libraries.iter().filter(|lib| lib.enabled) {
        if let Some(root) = lib.root_entity.as_ref() {
            roots.entry(root.clone()).or_insert(lib);
        }
    }

    let mut seen: HashSet<EntityId> = HashSet::new();
    let mut cursor = Some(entity.clone());

    while let Some(id) = cursor {
        if !seen.insert(id.clone()) {
            break;
        }
        if let Some(lib) = roots.get(&id) {
            return Ok(Some(LibraryTarget {
                library_name: lib.library_name.clone(),
                root_entity: id,
                export_subdir: lib.effective_subdir(),
                allowed_exts: lib.allowed_exts(),
            }));
        }
        cursor = store.parent_of(&id).await?;
    }

    Ok(None)
}
