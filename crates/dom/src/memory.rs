//! In-memory document for tests and simulation.
//!
//! Nodes are created pending (or already loaded) and driven by explicit
//! `fire_load`/`fire_error` calls. Listener and observer counts are exposed so
//! callers can check that nothing outlives its round.

use std::sync::Arc;

use foundation::ids::NodeId;
use parking_lot::Mutex;
use tracing::trace;

use crate::document::{Document, InsertionNotifier, InsertionObserver, ReadyState};
use crate::element::{Element, MutationRecord};
use crate::node::{
    CompletionProbe, LoadEvent, LoadListener, LoadNotifier, ResourceKind, TrackableNode,
};

#[derive(Debug)]
struct NodeState {
    probe: CompletionProbe,
    fired: Option<LoadEvent>,
    listeners: Vec<LoadNotifier>,
}

#[derive(Debug)]
pub struct MemoryNode {
    id: NodeId,
    kind: ResourceKind,
    state: Mutex<NodeState>,
}

impl MemoryNode {
    fn new(id: NodeId, kind: ResourceKind, probe: CompletionProbe) -> Self {
        let fired = probe.is_complete().then_some(LoadEvent::Loaded);
        Self {
            id,
            kind,
            state: Mutex::new(NodeState {
                probe,
                fired,
                listeners: Vec::new(),
            }),
        }
    }

    /// Emits the load event. Returns `false` if the node had already emitted.
    pub fn fire_load(&self) -> bool {
        self.fire(LoadEvent::Loaded)
    }

    /// Emits the error event. Returns `false` if the node had already emitted.
    pub fn fire_error(&self) -> bool {
        self.fire(LoadEvent::Failed)
    }

    fn fire(&self, event: LoadEvent) -> bool {
        let mut state = self.state.lock();
        if state.fired.is_some() {
            return false;
        }
        state.fired = Some(event);
        state.probe = match event {
            LoadEvent::Loaded => CompletionProbe::loaded(self.kind),
            LoadEvent::Failed => match self.kind {
                // Broken images still flip `complete`.
                ResourceKind::Image => CompletionProbe::Image {
                    complete: true,
                    natural_width: 0,
                    natural_height: 0,
                },
                kind => CompletionProbe::pending(kind),
            },
        };
        let delivered = state
            .listeners
            .drain(..)
            .filter(|notifier| !notifier.is_detached())
            .map(|notifier| notifier.notify(event))
            .filter(|ok| *ok)
            .count();
        trace!(node = %self.id, ?event, delivered, "memory node fired");
        true
    }

    pub fn fired(&self) -> Option<LoadEvent> {
        self.state.lock().fired
    }

    /// Live (not yet detached) listeners.
    pub fn listener_count(&self) -> usize {
        let mut state = self.state.lock();
        state.listeners.retain(|n| !n.is_detached());
        state.listeners.len()
    }
}

impl TrackableNode for MemoryNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn probe(&self) -> CompletionProbe {
        self.state.lock().probe
    }

    fn listen(&self) -> LoadListener {
        let mut state = self.state.lock();
        if let Some(event) = state.fired {
            return LoadListener::fired(event);
        }
        let (notifier, listener) = LoadListener::channel();
        state.listeners.push(notifier);
        listener
    }
}

#[derive(Debug)]
struct DocumentInner {
    ready_state: ReadyState,
    next_node: u64,
    nodes: Vec<Arc<MemoryNode>>,
    observers: Vec<InsertionNotifier>,
}

#[derive(Debug)]
pub struct MemoryDocument {
    inner: Mutex<DocumentInner>,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    /// A fully parsed, empty document.
    pub fn new() -> Self {
        Self::with_ready_state(ReadyState::Complete)
    }

    pub fn with_ready_state(ready_state: ReadyState) -> Self {
        Self {
            inner: Mutex::new(DocumentInner {
                ready_state,
                next_node: 1,
                nodes: Vec::new(),
                observers: Vec::new(),
            }),
        }
    }

    pub fn set_ready_state(&self, ready_state: ReadyState) {
        self.inner.lock().ready_state = ready_state;
    }

    /// Adds a node whose load has not finished yet.
    pub fn add_pending(&self, kind: ResourceKind) -> Arc<MemoryNode> {
        self.add_node(kind, CompletionProbe::pending(kind))
    }

    /// Adds a node that finished loading before anyone looked at it.
    pub fn add_loaded(&self, kind: ResourceKind) -> Arc<MemoryNode> {
        self.add_node(kind, CompletionProbe::loaded(kind))
    }

    fn add_node(&self, kind: ResourceKind, probe: CompletionProbe) -> Arc<MemoryNode> {
        let mut inner = self.inner.lock();
        Self::push_node(&mut inner, kind, probe)
    }

    fn push_node(
        inner: &mut DocumentInner,
        kind: ResourceKind,
        probe: CompletionProbe,
    ) -> Arc<MemoryNode> {
        let id = NodeId::new(inner.next_node);
        inner.next_node += 1;
        let node = Arc::new(MemoryNode::new(id, kind, probe));
        inner.nodes.push(node.clone());
        node
    }

    /// Inserts a rendered subtree.
    ///
    /// Every trackable element in it becomes a pending node, then observers
    /// are notified with a single record.
    pub fn insert(&self, element: Element) -> Vec<Arc<MemoryNode>> {
        let mut inner = self.inner.lock();
        let created: Vec<_> = element
            .trackable_kinds()
            .into_iter()
            .map(|kind| Self::push_node(&mut inner, kind, CompletionProbe::pending(kind)))
            .collect();

        let record = MutationRecord::new(vec![element]);
        inner.observers.retain(|o| o.notify(record.clone()));
        created
    }

    /// Removes a node from the tree. Existing handles stay usable.
    pub fn remove(&self, id: NodeId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.nodes.len();
        inner.nodes.retain(|n| n.id != id);
        inner.nodes.len() != before
    }

    pub fn nodes(&self) -> Vec<Arc<MemoryNode>> {
        self.inner.lock().nodes.clone()
    }

    /// Live insertion observers.
    pub fn observer_count(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.observers.retain(|o| !o.is_closed());
        inner.observers.len()
    }

    /// Live load listeners across all nodes.
    pub fn listener_count(&self) -> usize {
        self.nodes().iter().map(|n| n.listener_count()).sum()
    }
}

impl Document for MemoryDocument {
    fn ready_state(&self) -> ReadyState {
        self.inner.lock().ready_state
    }

    fn trackable_nodes(&self) -> Vec<Arc<dyn TrackableNode>> {
        self.inner
            .lock()
            .nodes
            .iter()
            .map(|n| n.clone() as Arc<dyn TrackableNode>)
            .collect()
    }

    fn observe_insertions(&self) -> InsertionObserver {
        let (notifier, observer) = InsertionObserver::channel();
        self.inner.lock().observers.push(notifier);
        observer
    }
}
