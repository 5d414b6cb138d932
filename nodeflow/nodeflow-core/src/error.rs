//! Error types for the tree mutation engine.
//!
//! Structural problems with a tree are [`TreeError`]s, rejected drag gestures
//! are [`ValidationError`]s, and [`MoveError`] is what a caller observes for a
//! whole move once persistence has had its say.

use crate::tree::{NodeId, ParentId};
use thiserror::Error;

/// Problems found while building or checking a [`Tree`](crate::tree::Tree).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("invalid node id '{0}'")]
    InvalidId(String),

    #[error("duplicate node id {0}")]
    DuplicateId(NodeId),

    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("node {node} refers to missing parent {parent}")]
    MissingParent { node: NodeId, parent: NodeId },

    #[error("node {node} has non-container parent {parent}")]
    ParentNotContainer { node: NodeId, parent: NodeId },

    #[error("node {0} is its own ancestor")]
    Cycle(NodeId),

    #[error("children of {parent} are not numbered 1..{expected}")]
    OrderNotDense { parent: ParentId, expected: usize },
}

/// A drag gesture that was rejected before anything was mutated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("drop has no drag source")]
    MissingSource,

    #[error("drop has no target")]
    MissingTarget,

    #[error("drop has no insertion index")]
    MissingIndex,

    #[error("nothing to move")]
    EmptyDrag,

    #[error("dragged node {0} does not exist")]
    UnknownNode(NodeId),

    #[error("drop target {0} does not exist")]
    TargetNotFound(NodeId),

    #[error("drop target {0} is not a group")]
    TargetNotContainer(NodeId),

    #[error("cannot drop {node} into itself or its descendant {target}")]
    CyclicDrop { node: NodeId, target: NodeId },

    #[error("a drag is already in progress")]
    DragInProgress,

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Failure of a move as seen by the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MoveError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("persistence failed: {0}")]
    Persistence(String),
}
