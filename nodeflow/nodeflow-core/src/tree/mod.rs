//! Ordered tree of items and groups.
//!
//! Nodes live in an arena keyed by [`NodeId`]; structure is expressed purely
//! through each node's `parent` reference and its 1-based `order` among
//! siblings. Nothing owns anything else, so groups nested in groups need no
//! special treatment when they are reparented.

use crate::error::TreeError;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;


/// Serialized form of the root parent. No node may use it as its own id.
pub const ROOT_SENTINEL: &str = "0";

/// Opaque, stable identity of a node.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    pub fn new(raw: impl Into<String>) -> Result<Self, TreeError> {
        let raw = raw.into();
        if raw.trim().is_empty() || raw == ROOT_SENTINEL {
            return Err(TreeError::InvalidId(raw));
        }
        Ok(Self(raw))
    }

    /// Fresh random id for a newly created record.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NodeId {
    type Error = TreeError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl FromStr for NodeId {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a node hangs: directly under the root, or inside a group.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ParentId {
    #[default]
    Root,
    Node(NodeId),
}

impl ParentId {
    pub fn node(&self) -> Option<&NodeId> {
        match self {
            ParentId::Root => None,
            ParentId::Node(id) => Some(id),
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, ParentId::Root)
    }
}

impl From<NodeId> for ParentId {
    fn from(id: NodeId) -> Self {
        ParentId::Node(id)
    }
}

impl From<Option<NodeId>> for ParentId {
    fn from(id: Option<NodeId>) -> Self {
        id.map_or(ParentId::Root, ParentId::Node)
    }
}

impl From<ParentId> for Option<NodeId> {
    fn from(parent: ParentId) -> Self {
        match parent {
            ParentId::Root => None,
            ParentId::Node(id) => Some(id),
        }
    }
}

impl FromStr for ParentId {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == ROOT_SENTINEL {
            Ok(ParentId::Root)
        } else {
            NodeId::new(s).map(ParentId::Node)
        }
    }
}

impl fmt::Display for ParentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParentId::Root => f.write_str(ROOT_SENTINEL),
            ParentId::Node(id) => id.fmt(f),
        }
    }
}

// Root is the number 0 on the wire, matching rows persisted before this engine.
impl Serialize for ParentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ParentId::Root => serializer.serialize_u64(0),
            ParentId::Node(id) => serializer.serialize_str(id.as_str()),
        }
    }
}

impl<'de> Deserialize<'de> for ParentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ParentVisitor;

        impl<'de> Visitor<'de> for ParentVisitor {
            type Value = ParentId;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a node id, 0, or null")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<ParentId, E> {
                if v == 0 {
                    Ok(ParentId::Root)
                } else {
                    Err(E::invalid_value(de::Unexpected::Unsigned(v), &self))
                }
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<ParentId, E> {
                if v == 0 {
                    Ok(ParentId::Root)
                } else {
                    Err(E::invalid_value(de::Unexpected::Signed(v), &self))
                }
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ParentId, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_unit<E: de::Error>(self) -> Result<ParentId, E> {
                Ok(ParentId::Root)
            }

            fn visit_none<E: de::Error>(self) -> Result<ParentId, E> {
                Ok(ParentId::Root)
            }

            fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<ParentId, D::Error> {
                d.deserialize_any(self)
            }
        }

        deserializer.deserialize_any(ParentVisitor)
    }
}

/// Groups are containers; items are leaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeKind {
    Folder,
    File,
}

impl NodeKind {
    pub fn is_container(self) -> bool {
        matches!(self, NodeKind::Folder)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Folder => "FOLDER",
            NodeKind::File => "FILE",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub parent: ParentId,
    pub order: u32,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub label: String,
}

impl Node {
    pub fn new(
        id: NodeId,
        parent: impl Into<ParentId>,
        order: u32,
        kind: NodeKind,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id,
            parent: parent.into(),
            order,
            kind,
            label: label.into(),
        }
    }

    pub fn is_container(&self) -> bool {
        self.kind.is_container()
    }
}

/// Arena of nodes. Cloning yields a full structural copy, which is what the
/// optimistic controller keeps as its rollback anchor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tree {
    nodes: HashMap<NodeId, Node>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from persisted nodes.
    ///
    /// Sibling orders are normalized to `1..N`: stored orders keep their
    /// relative sequence and ties fall back to input position, so gaps left
    /// behind by deletes disappear here.
    pub fn from_nodes<I>(nodes: I) -> Result<Self, TreeError>
    where
        I: IntoIterator<Item = Node>,
    {
        let nodes: Vec<Node> = nodes.into_iter().collect();
        let mut tree = Tree::new();
        let mut groups: HashMap<ParentId, Vec<(u32, usize, NodeId)>> = HashMap::new();
        for (position, node) in nodes.into_iter().enumerate() {
            if tree.nodes.contains_key(&node.id) {
                return Err(TreeError::DuplicateId(node.id));
            }
            groups
                .entry(node.parent.clone())
                .or_default()
                .push((node.order, position, node.id.clone()));
            tree.nodes.insert(node.id.clone(), node);
        }
        tree.check_links()?;

        for mut siblings in groups.into_values() {
            siblings.sort();
            let ordered: Vec<NodeId> = siblings.into_iter().map(|(_, _, id)| id).collect();
            tree.assign_order(&ordered);
        }
        Ok(tree)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Children of `parent` in sibling order.
    pub fn children(&self, parent: &ParentId) -> Vec<&Node> {
        let mut children: Vec<&Node> = self
            .nodes
            .values()
            .filter(|node| &node.parent == parent)
            .collect();
        children.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        children
    }

    pub fn child_ids(&self, parent: &ParentId) -> Vec<NodeId> {
        self.children(parent)
            .into_iter()
            .map(|node| node.id.clone())
            .collect()
    }

    /// Every transitive descendant of `id` in pre-order, not including `id`.
    pub fn descendant_ids(&self, id: &NodeId) -> Vec<NodeId> {
        fn gather(index: &HashMap<ParentId, Vec<&Node>>, parent: ParentId, out: &mut Vec<NodeId>) {
            if let Some(children) = index.get(&parent) {
                for child in children {
                    out.push(child.id.clone());
                    if child.is_container() {
                        gather(index, ParentId::Node(child.id.clone()), out);
                    }
                }
            }
        }
        let index = self.child_index();
        let mut ids = Vec::new();
        gather(&index, ParentId::Node(id.clone()), &mut ids);
        ids
    }

    /// Depth-first listing from the root, siblings in order. This is the
    /// shape the presentation layer renders.
    pub fn flatten(&self) -> Vec<&Node> {
        fn walk<'a>(
            index: &HashMap<ParentId, Vec<&'a Node>>,
            parent: ParentId,
            out: &mut Vec<&'a Node>,
        ) {
            if let Some(children) = index.get(&parent) {
                for child in children {
                    out.push(*child);
                    if child.is_container() {
                        walk(index, ParentId::Node(child.id.clone()), out);
                    }
                }
            }
        }
        let index = self.child_index();
        let mut out = Vec::with_capacity(self.nodes.len());
        walk(&index, ParentId::Root, &mut out);
        out
    }

    /// Verify every structural invariant: parents exist and are groups, the
    /// parent graph is acyclic, and each sibling set is numbered `1..N`.
    pub fn check_invariants(&self) -> Result<(), TreeError> {
        self.check_links()?;
        for (parent, siblings) in self.child_index() {
            let dense = siblings
                .iter()
                .enumerate()
                .all(|(rank, node)| node.order as usize == rank + 1);
            if !dense {
                return Err(TreeError::OrderNotDense {
                    parent,
                    expected: siblings.len(),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn insert(&mut self, node: Node) {
        self.nodes.insert(node.id.clone(), node);
    }

    pub(crate) fn remove(&mut self, id: &NodeId) -> Option<Node> {
        self.nodes.remove(id)
    }

    /// Number `ordered` as `1..N` in the given sequence.
    pub(crate) fn assign_order(&mut self, ordered: &[NodeId]) {
        for (rank, id) in ordered.iter().enumerate() {
            if let Some(node) = self.nodes.get_mut(id) {
                node.order = rank as u32 + 1;
            }
        }
    }

    fn child_index(&self) -> HashMap<ParentId, Vec<&Node>> {
        let mut index: HashMap<ParentId, Vec<&Node>> = HashMap::new();
        for node in self.nodes.values() {
            index.entry(node.parent.clone()).or_default().push(node);
        }
        for siblings in index.values_mut() {
            siblings.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        }
        index
    }

    fn check_links(&self) -> Result<(), TreeError> {
        for node in self.nodes.values() {
            let ParentId::Node(parent) = &node.parent else {
                continue;
            };
            match self.nodes.get(parent) {
                None => {
                    return Err(TreeError::MissingParent {
                        node: node.id.clone(),
                        parent: parent.clone(),
                    })
                }
                Some(p) if !p.is_container() => {
                    return Err(TreeError::ParentNotContainer {
                        node: node.id.clone(),
                        parent: parent.clone(),
                    })
                }
                Some(_) => {}
            }
        }

        // a walk longer than the node count must be going round in circles
        for node in self.nodes.values() {
            let mut current = node.parent.node();
            let mut steps = 0;
            while let Some(id) = current {
                if id == &node.id || steps > self.nodes.len() {
                    return Err(TreeError::Cycle(node.id.clone()));
                }
                steps += 1;
                current = self.nodes.get(id).and_then(|n| n.parent.node());
            }
        }
        Ok(())
    }
}
