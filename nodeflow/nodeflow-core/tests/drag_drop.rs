//! End-to-end drag and drop through the controller with scripted stores.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use nodeflow_core::events::{Event, EventBus};
use nodeflow_core::persistence::PersistencePort;
use nodeflow_core::{
    ChangeSet, DropGesture, Node, NodeId, NodeKind, ParentId, Tree, TreeController,
    ValidationError,
};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

/// Records every submission and answers from a script of gates.
#[derive(Default)]
struct ScriptedPort {
    submitted: Mutex<Vec<ChangeSet>>,
    gates: Mutex<VecDeque<oneshot::Receiver<Result<(), String>>>>,
}

impl ScriptedPort {
    async fn gate(&self) -> oneshot::Sender<Result<(), String>> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().await.push_back(rx);
        tx
    }
}

#[async_trait]
impl PersistencePort for ScriptedPort {
    async fn submit_moves(&self, changes: &ChangeSet) -> Result<()> {
        self.submitted.lock().await.push(changes.clone());
        let gate = self.gates.lock().await.pop_front();
        match gate {
            Some(rx) => match rx.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(reason)) => Err(anyhow!(reason)),
                Err(_) => Err(anyhow!("gate dropped")),
            },
            None => Ok(()),
        }
    }
}

fn id(raw: &str) -> NodeId {
    NodeId::new(raw).unwrap()
}

fn node(raw: &str, parent: Option<&str>, order: u32, kind: NodeKind) -> Node {
    Node::new(id(raw), parent.map(id), order, kind, raw.to_uppercase())
}

/// `{A(folder, root), B(item, root), C(item, parent=A)}`
fn scenario_tree() -> Tree {
    Tree::from_nodes([
        node("a", None, 1, NodeKind::Folder),
        node("b", None, 2, NodeKind::File),
        node("c", Some("a"), 1, NodeKind::File),
    ])
    .unwrap()
}

fn setup() -> (TreeController, Arc<ScriptedPort>) {
    let port = Arc::new(ScriptedPort::default());
    let ctl = TreeController::new(scenario_tree(), port.clone(), EventBus::new());
    (ctl, port)
}

#[tokio::test]
async fn drag_item_into_group() {
    let (ctl, port) = setup();
    let outcome = ctl
        .on_drop(DropGesture::new(id("b"), id("a"), 0))
        .unwrap()
        .outcome()
        .await;
    assert!(outcome.is_committed());

    let tree = ctl.tree();
    assert_eq!(tree.get(&id("b")).unwrap().parent, ParentId::Node(id("a")));
    let children: Vec<(String, u32)> = tree
        .children(&ParentId::Node(id("a")))
        .iter()
        .map(|n| (n.id.to_string(), n.order))
        .collect();
    assert_eq!(children, vec![("b".into(), 1), ("c".into(), 2)]);

    let submitted = port.submitted.lock().await;
    assert_eq!(submitted.len(), 1);
    let ids: Vec<&str> = submitted[0].iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "c"]);
}

#[tokio::test]
async fn cyclic_drops_are_ignored() {
    let (ctl, port) = setup();
    let before = ctl.tree();

    let onto_self = ctl.on_drop(DropGesture::new(id("a"), id("a"), 0));
    assert!(matches!(onto_self, Err(ValidationError::CyclicDrop { .. })));
    let onto_child = ctl.on_drop(DropGesture::new(id("a"), id("c"), 0));
    assert!(onto_child.is_err());

    assert_eq!(ctl.tree(), before);
    assert!(port.submitted.lock().await.is_empty());
}

#[tokio::test]
async fn selected_group_carries_its_selected_child() {
    let (ctl, port) = setup();
    ctl.toggle_select(&id("a")).unwrap();
    assert_eq!(ctl.selection(), vec![id("a"), id("c")]);

    let pending = ctl
        .on_drop(DropGesture::new(id("a"), ParentId::Root, 1))
        .unwrap();
    assert_eq!(pending.moved(), &[id("a")]);
    assert!(pending.outcome().await.is_committed());

    let tree = ctl.tree();
    assert_eq!(tree.get(&id("c")).unwrap().parent, ParentId::Node(id("a")));
    assert_eq!(tree.get(&id("a")).unwrap().order, 2);
    assert_eq!(tree.get(&id("b")).unwrap().order, 1);
    assert!(ctl.selection().is_empty());

    let submitted = port.submitted.lock().await;
    assert!(submitted[0].get(&id("c")).is_none());
}

#[tokio::test]
async fn network_failure_rolls_back() {
    let (ctl, port) = setup();
    let mut events = ctl.events().subscribe();
    let gate = port.gate().await;
    let before = ctl.tree();

    ctl.toggle_select(&id("b")).unwrap();
    ctl.toggle_select(&id("c")).unwrap();
    let pending = ctl
        .on_drop(DropGesture::new(id("b"), id("a"), 0))
        .unwrap();

    // optimistic state is visible before the store answers
    let optimistic = ctl.tree();
    assert_eq!(
        optimistic.get(&id("b")).unwrap().parent,
        ParentId::Node(id("a"))
    );
    assert!(ctl.selection().is_empty());

    gate.send(Err("network error".into())).unwrap();
    let outcome = pending.outcome().await;
    assert!(!outcome.is_committed());

    assert_eq!(ctl.tree(), before);
    assert!(ctl.selection().is_empty());

    assert_eq!(
        events.recv().await.unwrap(),
        Event::MoveApplied {
            moved: vec![id("b"), id("c")]
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        Event::MoveFailed {
            moved: vec![id("b"), id("c")],
            reason: "network error".into()
        }
    );
}

#[tokio::test]
async fn success_notifies_subscribers() {
    let (ctl, _port) = setup();
    let mut events = ctl.events().subscribe();
    ctl.on_drop(DropGesture::new(id("c"), ParentId::Root, 0))
        .unwrap()
        .outcome()
        .await;
    assert!(matches!(events.recv().await.unwrap(), Event::MoveApplied { .. }));
    assert_eq!(
        events.recv().await.unwrap(),
        Event::MoveCommitted {
            moved: vec![id("c")]
        }
    );
}

#[tokio::test]
async fn rollback_restores_the_snapshot_of_its_own_move() {
    let (ctl, port) = setup();
    let original = ctl.tree();
    let first_gate = port.gate().await;
    let second_gate = port.gate().await;

    let first = ctl
        .on_drop(DropGesture::new(id("b"), id("a"), 0))
        .unwrap();
    let after_first = ctl.tree();
    let second = ctl
        .on_drop(DropGesture::new(id("c"), ParentId::Root, 0))
        .unwrap();
    assert_ne!(ctl.tree(), after_first);

    second_gate.send(Ok(())).unwrap();
    assert!(second.outcome().await.is_committed());
    first_gate.send(Err("conflict".into())).unwrap();
    assert!(!first.outcome().await.is_committed());

    assert_eq!(ctl.tree(), original);
}

#[tokio::test]
async fn reads_during_flight_see_the_optimistic_tree() {
    let (ctl, port) = setup();
    let gate = port.gate().await;
    let pending = ctl
        .on_drop(DropGesture::new(id("b"), id("a"), 1))
        .unwrap();

    let reader = ctl.clone();
    let seen = tokio::spawn(async move { reader.tree() }).await.unwrap();
    assert_eq!(seen.get(&id("b")).unwrap().order, 2);

    gate.send(Ok(())).unwrap();
    assert!(pending.outcome().await.is_committed());
    assert_eq!(ctl.tree(), seen);
}

/// `{A(folder), B(item), D(item)}` at root, `C` in `A`: the scenario tree
/// after another client added `D`.
fn tree_with_new_item() -> Tree {
    Tree::from_nodes([
        node("a", None, 1, NodeKind::Folder),
        node("b", None, 2, NodeKind::File),
        node("c", Some("a"), 1, NodeKind::File),
        node("d", None, 3, NodeKind::File),
    ])
    .unwrap()
}

#[tokio::test]
async fn reload_keeps_the_pending_move_visible() {
    let (ctl, port) = setup();
    let gate = port.gate().await;
    let pending = ctl
        .on_drop(DropGesture::new(id("b"), id("a"), 0))
        .unwrap();

    ctl.reload(tree_with_new_item()).unwrap();
    let tree = ctl.tree();
    assert_eq!(tree.get(&id("b")).unwrap().parent, ParentId::Node(id("a")));
    assert_eq!(tree.get(&id("d")).unwrap().order, 2);
    tree.check_invariants().unwrap();

    gate.send(Ok(())).unwrap();
    assert!(pending.outcome().await.is_committed());
    assert_eq!(ctl.tree(), tree);
}

#[tokio::test]
async fn failure_after_reload_keeps_the_reloaded_items() {
    let (ctl, port) = setup();
    let gate = port.gate().await;
    let pending = ctl
        .on_drop(DropGesture::new(id("b"), id("a"), 0))
        .unwrap();

    ctl.reload(tree_with_new_item()).unwrap();
    gate.send(Err("conflict".into())).unwrap();
    assert!(!pending.outcome().await.is_committed());

    assert_eq!(ctl.tree(), tree_with_new_item());
}

#[tokio::test]
async fn failure_after_target_was_deleted_does_not_resurrect_it() {
    let (ctl, port) = setup();
    let gate = port.gate().await;
    let pending = ctl
        .on_drop(DropGesture::new(id("b"), id("a"), 0))
        .unwrap();

    // A and its child were deleted elsewhere
    let without_a = Tree::from_nodes([node("b", None, 1, NodeKind::File)]).unwrap();
    ctl.reload(without_a.clone()).unwrap();
    assert_eq!(ctl.tree(), without_a);

    gate.send(Err("parent a not found".into())).unwrap();
    assert!(!pending.outcome().await.is_committed());
    assert_eq!(ctl.tree(), without_a);
    assert!(!ctl.tree().contains(&id("a")));
}

#[tokio::test]
async fn committed_moves_survive_a_later_rollback_across_reload() {
    let (ctl, port) = setup();
    let first_gate = port.gate().await;
    let second_gate = port.gate().await;

    let first = ctl
        .on_drop(DropGesture::new(id("b"), id("a"), 0))
        .unwrap();
    ctl.reload(tree_with_new_item()).unwrap();
    let second = ctl
        .on_drop(DropGesture::new(id("d"), ParentId::Root, 0))
        .unwrap();

    second_gate.send(Ok(())).unwrap();
    assert!(second.outcome().await.is_committed());
    first_gate.send(Err("conflict".into())).unwrap();
    assert!(!first.outcome().await.is_committed());

    // the store holds the reloaded tree plus the committed second move
    let tree = ctl.tree();
    assert_eq!(tree.get(&id("b")).unwrap().parent, ParentId::Root);
    assert_eq!(tree.get(&id("d")).unwrap().order, 1);
    tree.check_invariants().unwrap();
}
