use crate::tree::NodeId;
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Notifications for the presentation layer. `MoveCommitted` and
/// `MoveFailed` are the success and error toasts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    MoveApplied { moved: Vec<NodeId> },
    MoveCommitted { moved: Vec<NodeId> },
    MoveFailed { moved: Vec<NodeId>, reason: String },
    Created { id: NodeId },
    Updated { id: NodeId },
    Deleted { id: NodeId },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Subscribe as a stream. Lagged receivers skip what they missed.
    pub fn stream(&self) -> impl Stream<Item = Event> + Send + 'static {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|res| async move { res.ok() })
    }

    pub fn send(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}
