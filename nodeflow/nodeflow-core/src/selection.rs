//! Multi-select state for drag gestures.

use crate::error::TreeError;
use crate::tree::{NodeId, Tree};
use serde::Serialize;
use std::collections::HashSet;

/// Ordered set of selected node ids.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Selection {
    ids: Vec<NodeId>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> &[NodeId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.ids.contains(id)
    }

    /// Flip the membership of `id` and return whether it is now selected.
    ///
    /// A group drags its whole subtree with it: selecting it adds every
    /// descendant, deselecting it removes them again.
    pub fn toggle(&mut self, id: &NodeId, tree: &Tree) -> Result<bool, TreeError> {
        let node = tree
            .get(id)
            .ok_or_else(|| TreeError::NodeNotFound(id.clone()))?;

        if !node.is_container() {
            if let Some(pos) = self.ids.iter().position(|s| s == id) {
                self.ids.remove(pos);
                return Ok(false);
            }
            self.ids.push(id.clone());
            return Ok(true);
        }

        let mut subtree = vec![id.clone()];
        subtree.extend(tree.descendant_ids(id));
        if self.contains(id) {
            let drop: HashSet<&NodeId> = subtree.iter().collect();
            self.ids.retain(|s| !drop.contains(s));
            Ok(false)
        } else {
            for member in subtree {
                if !self.contains(&member) {
                    self.ids.push(member);
                }
            }
            Ok(true)
        }
    }

    /// Nodes a drag starting at `source` should move.
    ///
    /// With a multi-selection, anything inside a selected group is dropped
    /// so it is not moved twice; the group carries it. A skipped group still
    /// counts as moving, so its own children are skipped too. Selection order
    /// is kept. Otherwise the drag moves `source` alone.
    pub fn resolve_for_drag(&self, source: &NodeId, tree: &Tree) -> Vec<NodeId> {
        if self.ids.len() <= 1 {
            return if tree.contains(source) {
                vec![source.clone()]
            } else {
                Vec::new()
            };
        }

        let selected: HashSet<&NodeId> = self.ids.iter().collect();
        let inside_selected_group = |id: &NodeId| {
            let mut current = tree.get(id).and_then(|n| n.parent.node());
            while let Some(parent) = current {
                if selected.contains(parent) {
                    return true;
                }
                current = tree.get(parent).and_then(|n| n.parent.node());
            }
            false
        };

        self.ids
            .iter()
            .filter(|id| tree.contains(id) && !inside_selected_group(id))
            .cloned()
            .collect()
    }

    /// Forget ids that no longer exist in `tree`.
    pub fn retain_existing(&mut self, tree: &Tree) {
        self.ids.retain(|id| tree.contains(id));
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}
