//! Fixtures shared by the unit tests.

use crate::tree::{Node, NodeId, NodeKind, ParentId, Tree};

pub(crate) fn id(raw: &str) -> NodeId {
    NodeId::new(raw).unwrap()
}

pub(crate) fn under(parent: &str) -> ParentId {
    if parent == "0" {
        ParentId::Root
    } else {
        ParentId::Node(id(parent))
    }
}

pub(crate) fn folder(raw: &str, parent: &str, order: u32) -> Node {
    Node::new(id(raw), under(parent), order, NodeKind::Folder, raw.to_uppercase())
}

pub(crate) fn file(raw: &str, parent: &str, order: u32) -> Node {
    Node::new(id(raw), under(parent), order, NodeKind::File, raw.to_uppercase())
}

/// `{A(folder, root), B(item, root), C(item, parent=A)}`
pub(crate) fn small_tree() -> Tree {
    Tree::from_nodes([folder("a", "0", 1), file("b", "0", 2), file("c", "a", 1)]).unwrap()
}

/// Root: a, d, e. Inside a: b (folder) and c. Inside b: f.
pub(crate) fn nested_tree() -> Tree {
    Tree::from_nodes([
        folder("a", "0", 1),
        folder("b", "a", 1),
        file("c", "a", 2),
        file("f", "b", 1),
        folder("d", "0", 2),
        file("e", "0", 3),
    ])
    .unwrap()
}

pub(crate) fn sequence(tree: &Tree, parent: &str) -> Vec<(String, u32)> {
    tree.children(&under(parent))
        .into_iter()
        .map(|n| (n.id.to_string(), n.order))
        .collect()
}
