//! Tree mutation engine for an ordered tree of items and groups.
//!
//! Data flows gesture → [`selection`] → [`planner`] → [`tree`] →
//! [`controller`], which installs the move optimistically and rolls it back
//! if the [`persistence`] port rejects it.

pub mod controller;
pub mod error;
pub mod events;
pub mod persistence;
pub mod planner;
pub mod selection;
pub mod storage;
pub mod tree;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{DropGesture, MoveOutcome, PendingMove, TreeController};
pub use error::{MoveError, TreeError, ValidationError};
pub use planner::{plan, ChangeEntry, ChangeSet, MovePlan};
pub use tree::{Node, NodeId, NodeKind, ParentId, Tree, ROOT_SENTINEL};
