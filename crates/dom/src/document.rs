use std::sync::Arc;

use tokio::sync::mpsc;

use crate::element::MutationRecord;
use crate::node::TrackableNode;

/// Parse progress of the document.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ReadyState {
    Loading,
    Interactive,
    #[default]
    Complete,
}

impl ReadyState {
    /// True once the initial parse has finished and the tree can be scanned.
    pub fn is_parsed(self) -> bool {
        !matches!(self, ReadyState::Loading)
    }
}

/// Document-side half of an insertion subscription.
#[derive(Debug, Clone)]
pub struct InsertionNotifier {
    tx: mpsc::UnboundedSender<MutationRecord>,
}

impl InsertionNotifier {
    /// Returns `false` once the observer has been dropped.
    pub fn notify(&self, record: MutationRecord) -> bool {
        self.tx.send(record).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Stream of subtree insertions. Dropping it unsubscribes.
#[derive(Debug)]
pub struct InsertionObserver {
    rx: mpsc::UnboundedReceiver<MutationRecord>,
}

impl InsertionObserver {
    pub fn channel() -> (InsertionNotifier, InsertionObserver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (InsertionNotifier { tx }, InsertionObserver { rx })
    }

    /// Waits for the next record; `None` when the document stops notifying.
    pub async fn next(&mut self) -> Option<MutationRecord> {
        self.rx.recv().await
    }
}

/// Capability the tracker needs from the rendering layer.
///
/// Implementations must be `Send + Sync` so scans and watchers can run on
/// spawned tasks.
pub trait Document: Send + Sync {
    fn ready_state(&self) -> ReadyState;

    /// Every asset-bearing node currently in the tree, complete or not.
    fn trackable_nodes(&self) -> Vec<Arc<dyn TrackableNode>>;

    /// Subscribes to subtree insertions on the document root.
    fn observe_insertions(&self) -> InsertionObserver;
}

#[cfg(test)]
mod tests {
    use super::{InsertionObserver, ReadyState};
    use crate::element::{Element, MutationRecord};

    #[test]
    fn only_loading_is_unparsed() {
        assert!(!ReadyState::Loading.is_parsed());
        assert!(ReadyState::Interactive.is_parsed());
        assert!(ReadyState::Complete.is_parsed());
    }

    #[tokio::test]
    async fn observer_receives_records_in_order() {
        let (notifier, mut observer) = InsertionObserver::channel();
        notifier.notify(MutationRecord::new(vec![Element::new("a")]));
        notifier.notify(MutationRecord::new(vec![Element::new("b")]));
        drop(notifier);

        assert_eq!(observer.next().await.unwrap().added[0].tag, "a");
        assert_eq!(observer.next().await.unwrap().added[0].tag, "b");
        assert!(observer.next().await.is_none());
    }

    #[test]
    fn dropping_observer_closes_notifier() {
        let (notifier, observer) = InsertionObserver::channel();
        drop(observer);
        assert!(notifier.is_closed());
        assert!(!notifier.notify(MutationRecord::default()));
    }
}
