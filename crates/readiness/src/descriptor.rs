use std::sync::Arc;

use dom::{ResourceKind, TrackableNode};
use foundation::ids::NodeId;
use serde::Serialize;

/// Lifecycle of one tracked load.
///
/// `Pending` is the only non-terminal state; the first terminal transition
/// sticks.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Pending,
    Loaded,
    Failed,
    TimedOut,
}

impl ResourceState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ResourceState::Pending)
    }
}

/// A node the current round waits on. The node stays owned by the document.
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    node: Arc<dyn TrackableNode>,
    kind: ResourceKind,
    state: ResourceState,
}

impl ResourceDescriptor {
    pub fn new(node: Arc<dyn TrackableNode>) -> Self {
        let kind = node.kind();
        Self {
            node,
            kind,
            state: ResourceState::Pending,
        }
    }

    pub fn id(&self) -> NodeId {
        self.node.id()
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn node(&self) -> &Arc<dyn TrackableNode> {
        &self.node
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    /// Moves a pending resource to `terminal`.
    ///
    /// Returns `false` (and changes nothing) if the resource already left
    /// `Pending` or `terminal` is not a terminal state.
    pub fn settle(&mut self, terminal: ResourceState) -> bool {
        if self.state.is_terminal() || !terminal.is_terminal() {
            return false;
        }
        self.state = terminal;
        true
    }
}

/// Per-state tallies of a [`ResourceSet`].
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SetCounts {
    pub loaded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub pending: usize,
}

impl SetCounts {
    pub fn total(&self) -> usize {
        self.resolved() + self.pending
    }

    pub fn resolved(&self) -> usize {
        self.loaded + self.failed + self.timed_out
    }

    pub fn is_resolved(&self) -> bool {
        self.pending == 0
    }
}

/// Resources captured by one scan. Membership never changes afterwards;
/// anything discovered later belongs to a later round.
#[derive(Debug, Default)]
pub struct ResourceSet {
    members: Vec<ResourceDescriptor>,
    counts: SetCounts,
}

impl ResourceSet {
    pub fn new(nodes: Vec<Arc<dyn TrackableNode>>) -> Self {
        let members: Vec<_> = nodes.into_iter().map(ResourceDescriptor::new).collect();
        let counts = SetCounts {
            pending: members.len(),
            ..SetCounts::default()
        };
        Self { members, counts }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &[ResourceDescriptor] {
        &self.members
    }

    pub fn get(&self, index: usize) -> Option<&ResourceDescriptor> {
        self.members.get(index)
    }

    pub fn counts(&self) -> SetCounts {
        self.counts
    }

    /// Settles member `index`, keeping the tallies in step.
    pub fn settle(&mut self, index: usize, terminal: ResourceState) -> bool {
        let Some(member) = self.members.get_mut(index) else {
            return false;
        };
        if !member.settle(terminal) {
            return false;
        }
        self.counts.pending -= 1;
        match terminal {
            ResourceState::Loaded => self.counts.loaded += 1,
            ResourceState::Failed => self.counts.failed += 1,
            ResourceState::TimedOut => self.counts.timed_out += 1,
            ResourceState::Pending => unreachable!("settle rejects non-terminal states"),
        }
        true
    }
}
