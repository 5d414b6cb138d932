//! Optimistic apply/rollback controller.
//!
//! The controller owns the live tree and the selection. A drop is planned
//! and installed synchronously, so the UI sees it at once; the change-set is
//! then submitted in the background and, if the store refuses it, the tree
//! captured for that very move is put back.
//!
//! Moves still awaiting the store are tracked. A [`TreeController::reload`]
//! replays them on top of the reloaded tree, and a move that fails after a
//! reload rebuilds from the last known store state instead of restoring a
//! snapshot the reload has already replaced.

use crate::error::{MoveError, TreeError, ValidationError};
use crate::events::{Event, EventBus};
use crate::persistence::PersistencePort;
use crate::planner::{self, ChangeSet, MovePlan};
use crate::selection::Selection;
use crate::tree::{NodeId, ParentId, Tree};
use anyhow::anyhow;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A drop as reported by the drag-and-drop surface. Any missing field makes
/// the drop invalid.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct DropGesture {
    #[serde(default)]
    pub source: Option<NodeId>,
    #[serde(default)]
    pub target: Option<ParentId>,
    #[serde(default)]
    pub index: Option<usize>,
}

impl DropGesture {
    pub fn new(source: NodeId, target: impl Into<ParentId>, index: usize) -> Self {
        Self {
            source: Some(source),
            target: Some(target.into()),
            index: Some(index),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MoveOutcome {
    Committed { moved: Vec<NodeId> },
    RolledBack { moved: Vec<NodeId>, reason: String },
}

impl MoveOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, MoveOutcome::Committed { .. })
    }

    pub fn into_result(self) -> Result<Vec<NodeId>, MoveError> {
        match self {
            MoveOutcome::Committed { moved } => Ok(moved),
            MoveOutcome::RolledBack { reason, .. } => Err(MoveError::Persistence(reason)),
        }
    }
}

/// Handle on a move that is applied locally and awaiting the store.
pub struct PendingMove {
    moved: Vec<NodeId>,
    handle: JoinHandle<MoveOutcome>,
}

impl PendingMove {
    pub fn moved(&self) -> &[NodeId] {
        &self.moved
    }

    /// Wait for the store's verdict. Dropping the handle instead does not
    /// cancel anything.
    pub async fn outcome(self) -> MoveOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(err) => MoveOutcome::RolledBack {
                moved: self.moved,
                reason: err.to_string(),
            },
        }
    }
}

struct State {
    tree: RwLock<Tree>,
    selection: Mutex<Selection>,
    dragging: Mutex<Option<NodeId>>,
    flight: Mutex<Flight>,
}

/// A move handed to the store and not yet answered.
struct InFlight {
    seq: u64,
    moved: Vec<NodeId>,
    target: ParentId,
    index: usize,
}

#[derive(Clone, Copy)]
struct Ticket {
    seq: u64,
    epoch: u64,
}

/// Bookkeeping for unanswered moves. `base` is the tree as the store holds
/// it: the last reload plus every move committed since. `epoch` counts
/// reloads.
struct Flight {
    epoch: u64,
    next_seq: u64,
    moves: Vec<InFlight>,
    base: Tree,
}

impl Flight {
    fn new(base: Tree) -> Self {
        Self {
            epoch: 0,
            next_seq: 0,
            moves: Vec::new(),
            base,
        }
    }

    fn begin(&mut self, moved: Vec<NodeId>, target: ParentId, index: usize) -> Ticket {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.moves.push(InFlight {
            seq,
            moved,
            target,
            index,
        });
        Ticket {
            seq,
            epoch: self.epoch,
        }
    }

    fn settle(&mut self, seq: u64) -> Option<InFlight> {
        let pos = self.moves.iter().position(|m| m.seq == seq)?;
        Some(self.moves.remove(pos))
    }

    fn commit(&mut self, seq: u64) {
        if let Some(settled) = self.settle(seq) {
            let base = std::mem::take(&mut self.base);
            self.base = replay(base, std::slice::from_ref(&settled));
        }
    }

    /// Start over from `tree` and return it with the unanswered moves on top.
    fn reset(&mut self, tree: Tree) -> Tree {
        self.epoch += 1;
        self.base = tree;
        self.rebuild()
    }

    fn rebuild(&self) -> Tree {
        replay(self.base.clone(), &self.moves)
    }
}

/// Re-plan `moves` in order on `tree`; moves that no longer apply are skipped.
fn replay(tree: Tree, moves: &[InFlight]) -> Tree {
    moves.iter().fold(tree, |tree, m| {
        match planner::plan(&m.moved, &m.target, m.index, &tree) {
            Ok(plan) => plan.tree,
            Err(err) => {
                debug!(seq = m.seq, %err, "pending move no longer applies");
                tree
            }
        }
    })
}

/// The tree mutation port consumed by the presentation layer.
///
/// Applied moves are persisted on a spawned task, so [`on_drop`] and
/// [`apply_move`] must be called from within a Tokio runtime; they panic
/// otherwise.
///
/// [`on_drop`]: TreeController::on_drop
/// [`apply_move`]: TreeController::apply_move
#[derive(Clone)]
pub struct TreeController {
    state: Arc<State>,
    port: Arc<dyn PersistencePort>,
    events: EventBus,
}

impl TreeController {
    pub fn new(tree: Tree, port: Arc<dyn PersistencePort>, events: EventBus) -> Self {
        Self {
            state: Arc::new(State {
                flight: Mutex::new(Flight::new(tree.clone())),
                tree: RwLock::new(tree),
                selection: Mutex::new(Selection::new()),
                dragging: Mutex::new(None),
            }),
            port,
            events,
        }
    }

    /// Current tree by value.
    pub fn tree(&self) -> Tree {
        self.state.tree.read().clone()
    }

    pub fn selection(&self) -> Vec<NodeId> {
        self.state.selection.lock().ids().to_vec()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn is_dragging(&self) -> bool {
        self.state.dragging.lock().is_some()
    }

    pub fn toggle_select(&self, id: &NodeId) -> Result<bool, ValidationError> {
        if self.is_dragging() {
            return Err(ValidationError::DragInProgress);
        }
        let tree = self.state.tree.read();
        let selected = self.state.selection.lock().toggle(id, &tree)?;
        Ok(selected)
    }

    /// Start dragging `source`; returns what a drop would move.
    pub fn on_drag_start(&self, source: NodeId) -> Result<Vec<NodeId>, ValidationError> {
        let tree = self.state.tree.read();
        if !tree.contains(&source) {
            return Err(ValidationError::UnknownNode(source));
        }
        let resolved = self.state.selection.lock().resolve_for_drag(&source, &tree);
        *self.state.dragging.lock() = Some(source);
        Ok(resolved)
    }

    /// Abandon a drag without dropping.
    pub fn on_drag_end(&self) {
        self.state.dragging.lock().take();
    }

    /// Handle a drop: resolve the drag set, plan, install locally and hand
    /// the change-set to the store. Rejected drops change nothing.
    pub fn on_drop(&self, gesture: DropGesture) -> Result<PendingMove, ValidationError> {
        let dragging = self.state.dragging.lock().take();
        let source = gesture
            .source
            .or(dragging)
            .ok_or(ValidationError::MissingSource)?;
        let target = gesture.target.ok_or(ValidationError::MissingTarget)?;
        let index = gesture.index.ok_or(ValidationError::MissingIndex)?;

        let mut tree = self.state.tree.write();
        let dragged = self.state.selection.lock().resolve_for_drag(&source, &tree);
        let plan = planner::plan(&dragged, &target, index, &tree).map_err(|err| {
            debug!(%source, %target, %err, "ignoring drop");
            err
        })?;
        let (snapshot, ticket, moved, changes) = self.install(&mut tree, plan);
        drop(tree);
        Ok(self.persist(snapshot, ticket, moved, changes))
    }

    /// Install an already computed plan and persist it.
    pub fn apply_move(&self, plan: MovePlan) -> PendingMove {
        let mut tree = self.state.tree.write();
        let (snapshot, ticket, moved, changes) = self.install(&mut tree, plan);
        drop(tree);
        self.persist(snapshot, ticket, moved, changes)
    }

    /// Replace the live tree after an external create, update or delete.
    /// Moves still awaiting the store are replayed on top of it.
    pub fn reload(&self, tree: Tree) -> Result<(), TreeError> {
        tree.check_invariants()?;
        let mut live = self.state.tree.write();
        let mut flight = self.state.flight.lock();
        *live = flight.reset(tree);
        self.state.selection.lock().retain_existing(&live);
        debug!(nodes = live.len(), pending = flight.moves.len(), "tree reloaded");
        Ok(())
    }

    fn install(
        &self,
        live: &mut Tree,
        plan: MovePlan,
    ) -> (Tree, Ticket, Vec<NodeId>, ChangeSet) {
        let MovePlan {
            tree,
            changes,
            moved,
            target,
            index,
        } = plan;
        // the displaced tree is this move's rollback anchor; nothing else holds it
        let snapshot = std::mem::replace(live, tree);
        let ticket = self
            .state
            .flight
            .lock()
            .begin(moved.clone(), target, index);
        (snapshot, ticket, moved, changes)
    }

    fn persist(
        &self,
        snapshot: Tree,
        ticket: Ticket,
        moved: Vec<NodeId>,
        changes: ChangeSet,
    ) -> PendingMove {
        self.state.selection.lock().clear();
        debug!(moved = moved.len(), changes = changes.len(), "move applied locally");
        self.events.send(Event::MoveApplied {
            moved: moved.clone(),
        });

        let port = Arc::clone(&self.port);
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let task_moved = moved.clone();
        let handle = tokio::spawn(async move {
            let moved = task_moved;
            // a panicking store counts as a failed submission
            let submit = tokio::spawn(async move { port.submit_moves(&changes).await });
            let result = match submit.await {
                Ok(result) => result,
                Err(err) => Err(anyhow!("persistence task failed: {err}")),
            };
            match result {
                Ok(()) => {
                    state.flight.lock().commit(ticket.seq);
                    info!(moved = moved.len(), "move committed");
                    events.send(Event::MoveCommitted {
                        moved: moved.clone(),
                    });
                    MoveOutcome::Committed { moved }
                }
                Err(err) => {
                    let reason = err.to_string();
                    {
                        let mut tree = state.tree.write();
                        let mut flight = state.flight.lock();
                        flight.settle(ticket.seq);
                        *tree = if flight.epoch == ticket.epoch {
                            snapshot
                        } else {
                            flight.rebuild()
                        };
                    }
                    warn!(%reason, moved = moved.len(), "move rolled back");
                    events.send(Event::MoveFailed {
                        moved: moved.clone(),
                        reason: reason.clone(),
                    });
                    MoveOutcome::RolledBack { moved, reason }
                }
            }
        });

        PendingMove { moved, handle }
    }
}
