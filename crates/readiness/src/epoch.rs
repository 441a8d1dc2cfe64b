use std::future::Future;
use std::time::Duration;

use dom::{Document, InsertionObserver};
use foundation::ids::EpochId;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ReadinessConfig;
use crate::descriptor::SetCounts;
use crate::scanner::Scanner;
use crate::signal::{ProgressStore, TraceEvent};
use crate::tracker::CompletionTracker;

/// Phases of one readiness round.
///
/// ```text
/// Preparing -> Scanning -> Loading -> Settled
///                  \________________/
/// Preparing | Scanning | Loading -> Cancelled
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EpochPhase {
    Preparing,
    Scanning,
    Loading,
    Settled,
    Cancelled,
}

impl EpochPhase {
    pub fn is_active(self) -> bool {
        matches!(
            self,
            EpochPhase::Preparing | EpochPhase::Scanning | EpochPhase::Loading
        )
    }

    pub fn can_transition_to(self, next: EpochPhase) -> bool {
        use EpochPhase::*;
        match (self, next) {
            (Preparing, Scanning) | (Scanning, Loading) | (Scanning, Settled) => true,
            (Loading, Settled) => true,
            (from, Cancelled) => from.is_active(),
            _ => false,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EpochPhase::Preparing => "Preparing page",
            EpochPhase::Scanning => "Checking resources",
            EpochPhase::Loading => "Loading resources",
            EpochPhase::Settled => "Finishing",
            EpochPhase::Cancelled => "Cancelled",
        }
    }
}

/// What started a round.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EpochTrigger {
    Navigation,
    ContentInserted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EpochSummary {
    pub counts: SetCounts,
    pub discovered: usize,
    pub already_complete: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpochOutcome {
    /// Settled and flipped the signal to ready.
    Ready(EpochSummary),
    /// Settled, but a newer round started during the settle hold.
    Superseded(EpochSummary),
    /// Stopped before settling.
    Cancelled { during: EpochPhase },
}

/// What [`Epoch::run`] hands back.
#[derive(Debug)]
pub struct EpochRun {
    pub outcome: EpochOutcome,
    /// Insertions observed since the round entered `Settled`. Only present
    /// when the round is `Ready`.
    pub insertions: Option<InsertionObserver>,
}

/// One readiness round: a single scan, a single tracker, one outcome.
#[derive(Debug)]
pub struct Epoch {
    id: EpochId,
    trigger: EpochTrigger,
    phase: EpochPhase,
    cancel: CancellationToken,
    started: Instant,
}

impl Epoch {
    pub fn new(id: EpochId, trigger: EpochTrigger, cancel: CancellationToken) -> Self {
        Self {
            id,
            trigger,
            phase: EpochPhase::Preparing,
            cancel,
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> EpochId {
        self.id
    }

    pub fn trigger(&self) -> EpochTrigger {
        self.trigger
    }

    pub fn phase(&self) -> EpochPhase {
        self.phase
    }

    /// Takes over the signal: baseline percentage, not ready.
    ///
    /// Runs synchronously so the caller observes the new baseline as soon as
    /// the round is created.
    pub fn prepare(&mut self, store: &ProgressStore, config: &ReadinessConfig) {
        store.begin(
            self.id,
            self.trigger,
            config.baseline_percentage,
            EpochPhase::Preparing.label(),
        );
        store.record(
            self.id,
            TraceEvent::Phase {
                phase: EpochPhase::Preparing,
            },
        );
    }

    /// Runs the round to completion or cancellation.
    pub async fn run(
        mut self,
        document: &dyn Document,
        config: &ReadinessConfig,
        store: &ProgressStore,
    ) -> EpochRun {
        let id = self.id;
        let cancel = self.cancel.clone();

        self.enter(store, EpochPhase::Scanning);
        store.publish(
            id,
            config.baseline_percentage,
            false,
            EpochPhase::Scanning.label(),
        );
        let scanner = Scanner::new(document, config);
        let Some(report) = until_cancelled(&cancel, scanner.scan()).await else {
            return self.cancelled(store);
        };

        let mut summary = EpochSummary {
            discovered: report.discovered,
            already_complete: report.already_complete,
            ..EpochSummary::default()
        };
        let mut set = report.set;
        if set.is_empty() {
            return self.settle(document, store, config, summary).await;
        }

        store.publish(
            id,
            config.after_scan_percentage,
            false,
            EpochPhase::Loading.label(),
        );
        self.enter(store, EpochPhase::Loading);
        debug!(
            epoch = %id,
            members = set.len(),
            max_wait_ms = config.max_timeout().as_millis() as u64,
            "tracking resources"
        );

        let tracker = CompletionTracker::new(config);
        let loading = tracker.run(&mut set, |member, counts| {
            store.record(
                id,
                TraceEvent::Resource {
                    node: member.id(),
                    kind: member.kind(),
                    state: member.state(),
                },
            );
            let percentage = config.loading_percentage(counts.resolved(), counts.total());
            // 100 is published on settle.
            store.publish(
                id,
                percentage.min(99.9),
                false,
                &format!("Loading resources ({}/{})", counts.resolved(), counts.total()),
            );
        });
        let Some(counts) = until_cancelled(&cancel, loading).await else {
            return self.cancelled(store);
        };

        summary.counts = counts;
        self.settle(document, store, config, summary).await
    }

    async fn settle(
        mut self,
        document: &dyn Document,
        store: &ProgressStore,
        config: &ReadinessConfig,
        mut summary: EpochSummary,
    ) -> EpochRun {
        self.enter(store, EpochPhase::Settled);
        // Scanning is over; anything inserted from here on belongs to the next round.
        let insertions = document.observe_insertions();
        store.publish(self.id, 100.0, false, EpochPhase::Settled.label());
        summary.elapsed = self.started.elapsed();

        let hold = tokio::time::sleep(config.settle_delay());
        if until_cancelled(&self.cancel, hold).await.is_none() {
            debug!(epoch = %self.id, "superseded during settle hold");
            return EpochRun::finished(EpochOutcome::Superseded(summary));
        }
        if !store.publish(self.id, 100.0, true, "Ready") {
            return EpochRun::finished(EpochOutcome::Superseded(summary));
        }
        debug!(
            epoch = %self.id,
            loaded = summary.counts.loaded,
            failed = summary.counts.failed,
            timed_out = summary.counts.timed_out,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "epoch ready"
        );
        EpochRun {
            outcome: EpochOutcome::Ready(summary),
            insertions: Some(insertions),
        }
    }

    fn cancelled(mut self, store: &ProgressStore) -> EpochRun {
        let during = self.phase;
        self.enter(store, EpochPhase::Cancelled);
        EpochRun::finished(EpochOutcome::Cancelled { during })
    }

    fn enter(&mut self, store: &ProgressStore, next: EpochPhase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "invalid epoch transition {:?} -> {:?}",
            self.phase,
            next
        );
        debug!(epoch = %self.id, from = ?self.phase, to = next.label(), "epoch phase");
        self.phase = next;
        store.record(self.id, TraceEvent::Phase { phase: next });
    }
}

impl EpochRun {
    fn finished(outcome: EpochOutcome) -> Self {
        Self {
            outcome,
            insertions: None,
        }
    }
}

async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}
