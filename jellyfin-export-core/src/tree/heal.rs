//! Nested-set self-healing.
//!
//! Bulk uploads occasionally leave `lft`/`rgt` out of step with the parent
//! links. Exports rely on the bounds for subtree scans, so every export job
//! checks the library subtree first and renumbers the forest when needed.

use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{info, warn};

use super::{EntityStore, NestedSetUpdate, TreeNode};
use crate::{error::Result, types::EntityId};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TreeDiagnosis {
    /// Rows reachable from the checked root.
    pub checked: usize,
    /// Bound violations found in that subtree.
    pub problems: usize,
    /// Rows whose bounds were rewritten.
    pub rewritten: usize,
    pub healed: bool,
}

/// Verify the nested-set bounds below `root` against the parent links and
/// renumber the whole forest when they disagree.
pub async fn diagnose_and_heal_tree(
    store: &dyn EntityStore,
    root: &EntityId,
) -> Result<TreeDiagnosis> {
    let nodes = store.tree_nodes().await?;
    let index: HashMap<&EntityId, &TreeNode> =
        nodes.iter().map(|node| (&node.id, node)).collect();

    if !index.contains_key(root) {
        return Ok(TreeDiagnosis::default());
    }

    let children = child_map(&nodes, &index);
    let scope = subtree(root, &children);
    let problems = count_problems(&scope, &index, &children)
        + count_strays(root, &scope, &nodes, &index);

    let mut diagnosis = TreeDiagnosis {
        checked: scope.len(),
        problems,
        ..TreeDiagnosis::default()
    };

    if problems == 0 {
        return Ok(diagnosis);
    }

    let updates: Vec<NestedSetUpdate> = renumber(&nodes, &index, &children)
        .into_iter()
        .filter(|update| {
            index.get(&update.id).is_some_and(|node| {
                node.lft != Some(update.lft) || node.rgt != Some(update.rgt)
            })
        })
        .collect();

    store.apply_nested_set(&updates).await?;
    diagnosis.rewritten = updates.len();
    diagnosis.healed = true;

    info!(
        target: "export::tree",
        root = %root,
        checked = diagnosis.checked,
        problems = diagnosis.problems,
        rewritten = diagnosis.rewritten,
        "nested set healed"
    );

    Ok(diagnosis)
}

fn child_map<'a>(
    nodes: &'a [TreeNode],
    index: &HashMap<&'a EntityId, &'a TreeNode>,
) -> HashMap<&'a EntityId, Vec<&'a TreeNode>> {
    let mut children: HashMap<&EntityId, Vec<&TreeNode>> = HashMap::new();
    for node in nodes {
        if let Some(parent) = node.parent.as_ref()
            && index.contains_key(parent)
        {
            children.entry(parent).or_default().push(node);
        }
    }
    for siblings in children.values_mut() {
        siblings.sort_by(|a, b| {
            (a.lft.unwrap_or(i64::MAX), &a.id)
                .cmp(&(b.lft.unwrap_or(i64::MAX), &b.id))
        });
    }
    children
}

fn subtree<'a>(
    root: &'a EntityId,
    children: &HashMap<&'a EntityId, Vec<&'a TreeNode>>,
) -> Vec<&'a EntityId> {
    let mut seen: HashSet<&EntityId> = HashSet::new();
    let mut order = Vec::new();
    let mut queue = VecDeque::from([root]);

    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        order.push(id);
        if let Some(kids) = children.get(id) {
            queue.extend(kids.iter().map(|kid| &kid.id));
        }
    }
    order
}

fn count_problems(
    scope: &[&EntityId],
    index: &HashMap<&EntityId, &TreeNode>,
    children: &HashMap<&EntityId, Vec<&TreeNode>>,
) -> usize {
    let mut problems = 0;

    for id in scope {
        let Some(node) = index.get(id) else { continue };

        let bounds = match (node.lft, node.rgt) {
            (Some(lft), Some(rgt)) if lft < rgt => (lft, rgt),
            _ => {
                problems += 1;
                continue;
            }
        };

        if let Some(parent) = node.parent.as_ref().and_then(|p| index.get(p)) {
            let contained = matches!(
                (parent.lft, parent.rgt),
                (Some(pl), Some(pr)) if pl < bounds.0 && bounds.1 < pr
            );
            if !contained {
                problems += 1;
            }
        }

        if let Some(kids) = children.get(id) {
            for pair in kids.windows(2) {
                if let (Some(prev_rgt), Some(next_lft)) = (pair[0].rgt, pair[1].lft)
                    && prev_rgt >= next_lft
                {
                    problems += 1;
                }
            }
        }
    }

    problems
}

/// Rows whose bounds still sit inside `root` although their parent links
/// lead elsewhere, e.g. a file moved to another folder with stale bounds.
fn count_strays(
    root: &EntityId,
    scope: &[&EntityId],
    nodes: &[TreeNode],
    index: &HashMap<&EntityId, &TreeNode>,
) -> usize {
    let Some((root_lft, root_rgt)) = index
        .get(root)
        .and_then(|node| node.lft.zip(node.rgt))
        .filter(|(lft, rgt)| lft < rgt)
    else {
        return 0;
    };
    let reachable: HashSet<&EntityId> = scope.iter().copied().collect();

    nodes
        .iter()
        .filter(|node| !reachable.contains(&node.id))
        .filter(|node| {
            matches!(
                (node.lft, node.rgt),
                (Some(lft), Some(rgt)) if root_lft < lft && rgt < root_rgt
            )
        })
        .count()
}

fn renumber(
    nodes: &[TreeNode],
    index: &HashMap<&EntityId, &TreeNode>,
    children: &HashMap<&EntityId, Vec<&TreeNode>>,
) -> Vec<NestedSetUpdate> {
    let mut roots: Vec<&TreeNode> = nodes
        .iter()
        .filter(|node| {
            node.parent
                .as_ref()
                .is_none_or(|parent| !index.contains_key(parent))
        })
        .collect();
    roots.sort_by(|a, b| {
        (a.lft.unwrap_or(i64::MAX), &a.id).cmp(&(b.lft.unwrap_or(i64::MAX), &b.id))
    });

    let mut counter: i64 = 1;
    let mut lft: HashMap<&EntityId, i64> = HashMap::new();
    let mut updates = Vec::with_capacity(nodes.len());

    for root in roots {
        let mut stack: Vec<(&EntityId, bool)> = vec![(&root.id, false)];
        while let Some((id, entered)) = stack.pop() {
            if entered {
                updates.push(NestedSetUpdate {
                    id: id.clone(),
                    lft: lft[id],
                    rgt: counter,
                });
                counter += 1;
                continue;
            }
            if lft.contains_key(id) {
                continue;
            }
            lft.insert(id, counter);
            counter += 1;
            stack.push((id, true));
            if let Some(kids) = children.get(id) {
                stack.extend(kids.iter().rev().map(|kid| (&kid.id, false)));
            }
        }
    }

    let unreachable = nodes.len() - updates.len();
    if unreachable > 0 {
        warn!(
            target: "export::tree",
            unreachable,
            "entities caught in a parent cycle were left unnumbered"
        );
    }

    updates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{DriveEntity, InMemoryEntityStore};

    fn numbered(
        mut entity: DriveEntity,
        lft: i64,
        rgt: i64,
    ) -> DriveEntity {
        entity.lft = Some(lft);
        entity.rgt = Some(rgt);
        entity
    }

    fn sample(consistent: bool) -> InMemoryEntityStore {
        let root = EntityId::new("root");
        let movies = EntityId::new("movies");
        let (film_l, film_r) = if consistent { (3, 4) } else { (30, 40) };
        InMemoryEntityStore::with_entities([
            numbered(DriveEntity::folder("root", "Drive", None), 1, 8),
            numbered(
                DriveEntity::folder("movies", "Movies", Some(root.clone())),
                2,
                7,
            ),
            numbered(
                DriveEntity::file("film", "Film.mkv", Some(movies.clone()), "/d/f"),
                film_l,
                film_r,
            ),
            numbered(
                DriveEntity::file("sub", "Film.srt", Some(movies), "/d/s"),
                5,
                6,
            ),
        ])
    }

    #[tokio::test]
    async fn consistent_tree_is_left_untouched() {
        let store = sample(true);
        let diagnosis =
            diagnose_and_heal_tree(&store, &EntityId::new("movies"))
                .await
                .unwrap();

        assert_eq!(diagnosis.checked, 3);
        assert_eq!(diagnosis.problems, 0);
        assert!(!diagnosis.healed);
    }

    #[tokio::test]
    async fn escaped_bounds_trigger_renumbering() {
        let store = sample(false);
        let diagnosis =
            diagnose_and_heal_tree(&store, &EntityId::new("movies"))
                .await
                .unwrap();

        assert!(diagnosis.healed);
        assert!(diagnosis.problems >= 1);

        let film = store.get(&EntityId::new("film")).await.unwrap().unwrap();
        let movies =
            store.get(&EntityId::new("movies")).await.unwrap().unwrap();
        let (ml, mr) = movies.nested_bounds().unwrap();
        let (fl, fr) = film.nested_bounds().unwrap();
        assert!(ml < fl && fr < mr);

        let again = diagnose_and_heal_tree(&store, &EntityId::new("movies"))
            .await
            .unwrap();
        assert_eq!(again.problems, 0);
    }

    #[tokio::test]
    async fn moved_row_with_stale_bounds_is_renumbered() {
        let store = InMemoryEntityStore::with_entities([
            DriveEntity::folder("root", "Drive", None),
            DriveEntity::folder("movies", "Movies", Some(EntityId::new("root"))),
            DriveEntity::folder("shows", "Shows", Some(EntityId::new("root"))),
            DriveEntity::file(
                "film",
                "Film.mkv",
                Some(EntityId::new("movies")),
                "/d/f",
            ),
        ]);
        diagnose_and_heal_tree(&store, &EntityId::new("root"))
            .await
            .unwrap();

        store
            .update(&EntityId::new("film"), |e| {
                e.parent = Some(EntityId::new("shows"))
            })
            .await;

        let diagnosis =
            diagnose_and_heal_tree(&store, &EntityId::new("movies"))
                .await
                .unwrap();
        assert_eq!(diagnosis.checked, 1);
        assert_eq!(diagnosis.problems, 1);
        assert!(diagnosis.healed);

        let movies =
            store.get(&EntityId::new("movies")).await.unwrap().unwrap();
        let shows = store.get(&EntityId::new("shows")).await.unwrap().unwrap();
        let film = store.get(&EntityId::new("film")).await.unwrap().unwrap();
        let (ml, mr) = movies.nested_bounds().unwrap();
        let (sl, sr) = shows.nested_bounds().unwrap();
        let (fl, fr) = film.nested_bounds().unwrap();
        assert!(!(ml < fl && fr < mr));
        assert!(sl < fl && fr < sr);
    }

    #[tokio::test]
    async fn missing_bounds_are_filled_in() {
        let store = InMemoryEntityStore::with_entities([
            DriveEntity::folder("root", "Drive", None),
            DriveEntity::folder("shows", "Shows", Some(EntityId::new("root"))),
        ]);

        let diagnosis = diagnose_and_heal_tree(&store, &EntityId::new("root"))
            .await
            .unwrap();
        assert!(diagnosis.healed);
        assert_eq!(diagnosis.rewritten, 2);

        let root = store.get(&EntityId::new("root")).await.unwrap().unwrap();
        assert_eq!((root.lft, root.rgt), (Some(1), Some(4)));
    }

    #[tokio::test]
    async fn unknown_root_reports_nothing() {
        let store = sample(true);
        let diagnosis =
            diagnose_and_heal_tree(&store, &EntityId::new("nope"))
                .await
                .unwrap();
        assert_eq!(diagnosis, TreeDiagnosis::default());
    }
}
