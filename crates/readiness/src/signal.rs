use dom::ResourceKind;
use foundation::ids::{EpochId, NodeId};
use parking_lot::Mutex;
use runtime::event_bus::{Event, EventBus};
use serde::Serialize;
use tokio::sync::watch;
use tracing::trace;

use crate::descriptor::ResourceState;
use crate::epoch::{EpochPhase, EpochTrigger};

/// What the UI layer observes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSignal {
    /// Round that produced this value.
    pub epoch: EpochId,
    /// True only while no round is active.
    pub ready: bool,
    /// In `[0, 100]`, non-decreasing within one round.
    pub percentage: f64,
    /// Informational label.
    pub message: String,
}

impl ProgressSignal {
    /// Value before the first round.
    pub fn idle() -> Self {
        Self {
            epoch: EpochId::ZERO,
            ready: true,
            percentage: 100.0,
            message: String::from("Ready"),
        }
    }
}

/// Diagnostic trace of everything that happened to the signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEvent {
    Started {
        trigger: EpochTrigger,
    },
    Phase {
        phase: EpochPhase,
    },
    Resource {
        node: NodeId,
        kind: ResourceKind,
        state: ResourceState,
    },
    Published {
        ready: bool,
        percentage: f64,
    },
    /// A write from a superseded round was ignored.
    StaleWrite {
        current: EpochId,
    },
}

#[derive(Debug)]
struct StoreState {
    current: EpochId,
    trace: EventBus<TraceEvent>,
}

/// Process-scoped holder of the [`ProgressSignal`].
///
/// Only the current round may write. Every write carries the writer's epoch
/// id and is dropped silently when it no longer matches; that comparison is
/// what keeps late callbacks of a cancelled round from leaking into the
/// signal.
#[derive(Debug)]
pub struct ProgressStore {
    state: Mutex<StoreState>,
    tx: watch::Sender<ProgressSignal>,
}

impl ProgressStore {
    pub fn new(trace_capacity: usize) -> Self {
        let (tx, _) = watch::channel(ProgressSignal::idle());
        Self {
            state: Mutex::new(StoreState {
                current: EpochId::ZERO,
                trace: EventBus::with_capacity(trace_capacity),
            }),
            tx,
        }
    }

    pub fn current_epoch(&self) -> EpochId {
        self.state.lock().current
    }

    pub fn snapshot(&self) -> ProgressSignal {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressSignal> {
        self.tx.subscribe()
    }

    /// Hands the signal to `epoch` and overwrites it with `percentage`,
    /// regardless of what the previous round last wrote.
    pub fn begin(&self, epoch: EpochId, trigger: EpochTrigger, percentage: f64, message: &str) {
        let mut state = self.state.lock();
        debug_assert!(epoch > state.current, "epoch ids must increase");
        state.current = epoch;
        state.trace.emit(epoch, TraceEvent::Started { trigger });

        let signal = ProgressSignal {
            epoch,
            ready: false,
            percentage: percentage.clamp(0.0, 100.0),
            message: message.to_string(),
        };
        state.trace.emit(
            epoch,
            TraceEvent::Published {
                ready: signal.ready,
                percentage: signal.percentage,
            },
        );
        self.tx.send_replace(signal);
    }

    /// Writes on behalf of `epoch`. Returns `false` if `epoch` is stale.
    ///
    /// The percentage is clamped to `[0, 100]` and never moves backwards
    /// within a round.
    pub fn publish(&self, epoch: EpochId, percentage: f64, ready: bool, message: &str) -> bool {
        let mut state = self.state.lock();
        if epoch != state.current {
            let current = state.current;
            trace!(%epoch, %current, "dropping stale progress write");
            state.trace.emit(epoch, TraceEvent::StaleWrite { current });
            return false;
        }

        let previous = self.tx.borrow().percentage;
        let signal = ProgressSignal {
            epoch,
            ready,
            percentage: percentage.clamp(0.0, 100.0).max(previous),
            message: message.to_string(),
        };
        state.trace.emit(
            epoch,
            TraceEvent::Published {
                ready: signal.ready,
                percentage: signal.percentage,
            },
        );
        self.tx.send_replace(signal);
        true
    }

    /// Appends to the trace without touching the signal.
    pub fn record(&self, epoch: EpochId, event: TraceEvent) {
        self.state.lock().trace.emit(epoch, event);
    }

    pub fn trace(&self) -> Vec<Event<TraceEvent>> {
        self.state.lock().trace.events().cloned().collect()
    }
}
