use dom::InsertionObserver;
use foundation::ids::EpochId;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Watches for resource-bearing content inserted after a round settled.
///
/// Armed only between rounds, on an observer opened when the previous round
/// settled. The orchestrator drops it before starting a new round, so the
/// tracker's own activity can never re-trigger itself. Fires at most once.
#[derive(Debug)]
pub struct MutationWatcher {
    after: EpochId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl MutationWatcher {
    /// Calls `on_content` on the first insertion that references a trackable
    /// resource. Records already buffered in `observer` count.
    pub fn arm<F>(mut observer: InsertionObserver, after: EpochId, on_content: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            loop {
                let record = tokio::select! {
                    biased;
                    () = token.cancelled() => return,
                    record = observer.next() => record,
                };
                let Some(record) = record else {
                    return;
                };
                if record.references_resource() {
                    debug!(%after, added = record.added.len(), "new resources inserted");
                    on_content();
                    return;
                }
                trace!(%after, "ignoring insertion without resources");
            }
        });

        debug!(%after, "mutation watcher armed");
        Self {
            after,
            cancel,
            task,
        }
    }

    /// Round whose settlement armed this watcher.
    pub fn after(&self) -> EpochId {
        self.after
    }

    pub fn is_armed(&self) -> bool {
        !self.cancel.is_cancelled() && !self.task.is_finished()
    }
}

impl Drop for MutationWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
