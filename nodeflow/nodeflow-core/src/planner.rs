//! Move planning: validate a drop and compute the resulting tree plus the
//! change-set that persistence has to apply.

use crate::error::ValidationError;
use crate::tree::{Node, NodeId, ParentId, Tree};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One structural update for the backing store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEntry {
    pub id: NodeId,
    pub parent_id: ParentId,
    pub order: u32,
    pub is_container: bool,
}

impl ChangeEntry {
    fn for_node(node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            parent_id: node.parent.clone(),
            order: node.order,
            is_container: node.is_container(),
        }
    }
}

/// Ordered batch of [`ChangeEntry`]s, applied all-or-nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeSet(Vec<ChangeEntry>);

impl ChangeSet {
    pub fn entries(&self) -> &[ChangeEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, id: &NodeId) -> Option<&ChangeEntry> {
        self.0.iter().find(|entry| &entry.id == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChangeEntry> {
        self.0.iter()
    }
}

impl From<Vec<ChangeEntry>> for ChangeSet {
    fn from(entries: Vec<ChangeEntry>) -> Self {
        Self(entries)
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a ChangeEntry;
    type IntoIter = std::slice::Iter<'a, ChangeEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Result of a successful [`plan`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MovePlan {
    /// The tree with the move applied.
    pub tree: Tree,
    pub changes: ChangeSet,
    /// Dragged nodes, deduplicated, in drag order.
    pub moved: Vec<NodeId>,
    pub target: ParentId,
    /// Insertion index the plan was made for.
    pub index: usize,
}

/// Plan dropping `dragged` into `target` at `index`.
///
/// `index` counts positions among the target's children once the dragged
/// nodes have been taken out, and is clamped to the end. Dragged nodes land
/// consecutively from there in drag order. A dragged node whose parent is a
/// dragged group seen earlier in the list stays inside that group.
///
/// Every sibling set the move touches is renumbered `1..N`. The change-set
/// holds every dragged node, even when nothing about it changed, followed by
/// any other node whose parent or order changed.
pub fn plan(
    dragged: &[NodeId],
    target: &ParentId,
    index: usize,
    tree: &Tree,
) -> Result<MovePlan, ValidationError> {
    let mut moved: Vec<NodeId> = Vec::with_capacity(dragged.len());
    for id in dragged {
        if !moved.contains(id) {
            moved.push(id.clone());
        }
    }
    if moved.is_empty() {
        return Err(ValidationError::EmptyDrag);
    }

    if let ParentId::Node(target_id) = target {
        match tree.get(target_id) {
            None => return Err(ValidationError::TargetNotFound(target_id.clone())),
            Some(node) if !node.is_container() => {
                return Err(ValidationError::TargetNotContainer(target_id.clone()))
            }
            Some(_) => {}
        }
    }

    let mut originals: Vec<Node> = Vec::with_capacity(moved.len());
    for id in &moved {
        let node = tree
            .get(id)
            .ok_or_else(|| ValidationError::UnknownNode(id.clone()))?;
        if let ParentId::Node(target_id) = target {
            if target_id == id || tree.descendant_ids(id).contains(target_id) {
                return Err(ValidationError::CyclicDrop {
                    node: id.clone(),
                    target: target_id.clone(),
                });
            }
        }
        originals.push(node.clone());
    }

    let mut working = tree.clone();
    for node in &originals {
        working.remove(&node.id);
    }

    let mut target_sequence = working.child_ids(target);
    let mut dragged_groups: HashSet<NodeId> = HashSet::new();
    let mut affected: Vec<ParentId> = vec![target.clone()];
    let mut offset = 0;
    for mut node in originals {
        let stays_in_group = node
            .parent
            .node()
            .is_some_and(|parent| dragged_groups.contains(parent));
        if node.is_container() {
            dragged_groups.insert(node.id.clone());
        }
        if stays_in_group {
            if !affected.contains(&node.parent) {
                affected.push(node.parent.clone());
            }
            working.insert(node);
            continue;
        }

        if !affected.contains(&node.parent) {
            affected.push(node.parent.clone());
        }
        node.parent = target.clone();
        let at = (index + offset).min(target_sequence.len());
        target_sequence.insert(at, node.id.clone());
        offset += 1;
        working.insert(node);
    }

    working.assign_order(&target_sequence);
    for parent in affected.iter().skip(1) {
        let siblings = working.child_ids(parent);
        working.assign_order(&siblings);
    }

    let mut entries: Vec<ChangeEntry> = moved
        .iter()
        .filter_map(|id| working.get(id))
        .map(ChangeEntry::for_node)
        .collect();
    for parent in &affected {
        for node in working.children(parent) {
            if moved.contains(&node.id) {
                continue;
            }
            let changed = tree
                .get(&node.id)
                .map_or(true, |before| before.parent != node.parent || before.order != node.order);
            if changed {
                entries.push(ChangeEntry::for_node(node));
            }
        }
    }

    Ok(MovePlan {
        tree: working,
        changes: ChangeSet(entries),
        moved,
        target: target.clone(),
        index,
    })
}
