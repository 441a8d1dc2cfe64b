use std::sync::{Arc, Weak};

use dom::{Document, InsertionObserver};
use foundation::ids::EpochId;
use parking_lot::Mutex;
use runtime::event_bus::Event;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span};

use crate::config::ReadinessConfig;
use crate::epoch::{Epoch, EpochOutcome, EpochRun, EpochTrigger};
use crate::metrics::ReadinessMetrics;
use crate::signal::{ProgressSignal, ProgressStore, TraceEvent};
use crate::watcher::MutationWatcher;

/// A navigation reported by the routing layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteChange {
    pub path: String,
}

impl RouteChange {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Debug)]
struct ActiveEpoch {
    id: EpochId,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct Control {
    last_issued: EpochId,
    active: Option<ActiveEpoch>,
    watcher: Option<MutationWatcher>,
}

struct Inner {
    document: Arc<dyn Document>,
    config: ReadinessConfig,
    store: ProgressStore,
    metrics: Mutex<ReadinessMetrics>,
    control: Mutex<Control>,
    closed: CancellationToken,
}

/// Sequences readiness rounds and owns the [`ProgressSignal`].
///
/// At most one round is active at a time. Starting a round cancels the
/// active one first. Insertions are observed from the moment a round enters
/// `Settled` and acted on once it is ready; never during scanning or loading.
/// Cheap to clone; clones share state.
///
/// Must be used from within a tokio runtime: rounds run on spawned tasks.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("signal", &self.signal())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Orchestrator {
    pub fn new(document: Arc<dyn Document>, config: ReadinessConfig) -> Self {
        let store = ProgressStore::new(config.trace_capacity);
        Self {
            inner: Arc::new(Inner {
                document,
                config,
                store,
                metrics: Mutex::new(ReadinessMetrics::new()),
                control: Mutex::new(Control::default()),
                closed: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &ReadinessConfig {
        &self.inner.config
    }

    /// Starts a round for a navigation and returns immediately.
    ///
    /// When this returns, the signal already shows the new round's baseline.
    pub fn start_epoch(&self) -> EpochId {
        self.begin(EpochTrigger::Navigation)
    }

    fn begin(&self, trigger: EpochTrigger) -> EpochId {
        let mut control = self.inner.control.lock();
        if self.inner.closed.is_cancelled() {
            debug!(?trigger, "ignoring epoch start after shutdown");
            return control.last_issued;
        }
        if let Some(watcher) = control.watcher.take() {
            debug!(after = %watcher.after(), "disarming mutation watcher");
        }
        if let Some(active) = control.active.take() {
            debug!(epoch = %active.id, "cancelling active epoch");
            active.cancel.cancel();
        }

        let id = control.last_issued.next();
        control.last_issued = id;
        let cancel = CancellationToken::new();
        let mut epoch = Epoch::new(id, trigger, cancel.clone());
        epoch.prepare(&self.inner.store, &self.inner.config);
        control.active = Some(ActiveEpoch { id, cancel });
        drop(control);

        self.inner.metrics.lock().record_start(trigger);
        let span = info_span!("epoch", epoch_id = id.get(), trigger = ?epoch.trigger());
        let this = self.clone();
        tokio::spawn(async move { this.drive(epoch).await }.instrument(span));
        id
    }

    async fn drive(self, epoch: Epoch) {
        let id = epoch.id();
        let inner = &self.inner;
        let EpochRun {
            outcome,
            insertions,
        } = epoch
            .run(&*inner.document, &inner.config, &inner.store)
            .await;
        inner.metrics.lock().record_outcome(&outcome);
        if let (EpochOutcome::Ready(summary), Some(insertions)) = (&outcome, insertions) {
            info!(
                loaded = summary.counts.loaded,
                failed = summary.counts.failed,
                timed_out = summary.counts.timed_out,
                "page ready"
            );
            self.arm_watcher(id, insertions);
        }
    }

    fn arm_watcher(&self, settled: EpochId, insertions: InsertionObserver) {
        let mut control = self.inner.control.lock();
        if control.active.as_ref().map(|a| a.id) != Some(settled) {
            // A newer round started while this one was finishing.
            return;
        }
        control.active = None;

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        control.watcher = Some(MutationWatcher::arm(insertions, settled, move || {
            if let Some(inner) = weak.upgrade() {
                Orchestrator { inner }.begin(EpochTrigger::ContentInserted);
            }
        }));
    }

    /// Starts a round for every route change until the sender goes away or
    /// the orchestrator shuts down.
    pub fn follow_routes(&self, mut routes: mpsc::Receiver<RouteChange>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                let route = tokio::select! {
                    biased;
                    () = this.inner.closed.cancelled() => return,
                    route = routes.recv() => route,
                };
                let Some(route) = route else {
                    return;
                };
                let epoch = this.start_epoch();
                info!(path = %route.path, %epoch, "navigation");
            }
        })
    }

    pub fn signal(&self) -> ProgressSignal {
        self.inner.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressSignal> {
        self.inner.store.subscribe()
    }

    pub fn current_epoch(&self) -> EpochId {
        self.inner.store.current_epoch()
    }

    /// True while a round is between `Preparing` and its ready flip.
    pub fn is_busy(&self) -> bool {
        self.inner.control.lock().active.is_some()
    }

    pub fn is_watching(&self) -> bool {
        self.inner
            .control
            .lock()
            .watcher
            .as_ref()
            .is_some_and(MutationWatcher::is_armed)
    }

    /// Resolves once the signal reports ready.
    ///
    /// After [`shutdown`](Self::shutdown) this resolves immediately with the
    /// last published signal, which may not be ready.
    pub async fn wait_ready(&self) -> ProgressSignal {
        let mut rx = self.subscribe();
        let closed = self.inner.closed.cancelled();
        tokio::select! {
            biased;
            ready = rx.wait_for(|s| s.ready) => match ready {
                Ok(signal) => signal.clone(),
                Err(_) => self.signal(),
            },
            () = closed => self.signal(),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    pub fn metrics(&self) -> ReadinessMetrics {
        self.inner.metrics.lock().clone()
    }

    pub fn trace(&self) -> Vec<Event<TraceEvent>> {
        self.inner.store.trace()
    }

    /// Cancels the active round and disarms the watcher for good.
    ///
    /// Later [`start_epoch`](Self::start_epoch) calls are ignored, route
    /// following stops and pending [`wait_ready`](Self::wait_ready) calls
    /// return.
    pub fn shutdown(&self) {
        let mut control = self.inner.control.lock();
        self.inner.closed.cancel();
        control.watcher = None;
        if let Some(active) = control.active.take() {
            active.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Orchestrator, RouteChange};
    use crate::config::ReadinessConfig;
    use dom::ResourceKind;
    use dom::memory::MemoryDocument;
    use foundation::ids::EpochId;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn start_returns_with_baseline_published() {
        let doc = Arc::new(MemoryDocument::new());
        doc.add_pending(ResourceKind::Image);
        let orch = Orchestrator::new(doc, ReadinessConfig::default());

        assert!(orch.signal().ready);
        let id = orch.start_epoch();
        let signal = orch.signal();
        assert_eq!(signal.epoch, id);
        assert!(!signal.ready);
        assert_eq!(signal.percentage, 10.0);
        assert!(orch.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn route_changes_start_epochs() {
        let doc = Arc::new(MemoryDocument::new());
        let orch = Orchestrator::new(doc, ReadinessConfig::default());
        let (tx, rx) = mpsc::channel(4);
        let follower = orch.follow_routes(rx);

        tx.send(RouteChange::new("/work")).await.unwrap();
        tx.send(RouteChange::new("/blog")).await.unwrap();
        drop(tx);
        follower.await.unwrap();

        assert_eq!(orch.current_epoch(), EpochId::new(2));
        let ready = orch.wait_ready().await;
        assert_eq!(ready.epoch, EpochId::new(2));
        assert_eq!(orch.metrics().started_by_navigation, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_everything() {
        let doc = Arc::new(MemoryDocument::new());
        doc.add_pending(ResourceKind::Script);
        let orch = Orchestrator::new(doc.clone(), ReadinessConfig::default());

        orch.start_epoch();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(doc.listener_count(), 1);

        orch.shutdown();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(doc.listener_count(), 0);
        assert!(!orch.is_busy());
        assert!(!orch.is_watching());
        assert_eq!(orch.metrics().epochs_cancelled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_releases_waiters_and_ignores_new_epochs() {
        let doc = Arc::new(MemoryDocument::new());
        doc.add_pending(ResourceKind::Script);
        let orch = Orchestrator::new(doc.clone(), ReadinessConfig::default());

        let id = orch.start_epoch();
        let waiter = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.wait_ready().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        orch.shutdown();
        let last = waiter.await.unwrap();
        assert_eq!(last.epoch, id);
        assert!(!last.ready);

        assert_eq!(orch.start_epoch(), id);
        assert_eq!(orch.current_epoch(), id);
        assert!(orch.is_shut_down());
        assert!(!orch.wait_ready().await.ready);
    }
}
