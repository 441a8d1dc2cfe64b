use runtime::histogram::Histogram;
use serde::Serialize;

use crate::epoch::{EpochOutcome, EpochTrigger};

/// Counters over the page lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReadinessMetrics {
    pub epochs_started: u64,
    pub started_by_navigation: u64,
    pub started_by_insertion: u64,
    pub epochs_ready: u64,
    pub epochs_superseded: u64,
    pub epochs_cancelled: u64,

    pub resources_loaded: u64,
    pub resources_failed: u64,
    pub resources_timed_out: u64,
    /// Complete before any listener was needed.
    pub resources_already_complete: u64,

    /// Trigger to settle, in milliseconds.
    pub settle_ms: Histogram,
    /// Resources waited on per round.
    pub set_size: Histogram,
}

impl ReadinessMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_start(&mut self, trigger: EpochTrigger) {
        self.epochs_started += 1;
        match trigger {
            EpochTrigger::Navigation => self.started_by_navigation += 1,
            EpochTrigger::ContentInserted => self.started_by_insertion += 1,
        }
    }

    pub fn record_outcome(&mut self, outcome: &EpochOutcome) {
        let summary = match outcome {
            EpochOutcome::Ready(summary) => {
                self.epochs_ready += 1;
                summary
            }
            EpochOutcome::Superseded(summary) => {
                self.epochs_superseded += 1;
                summary
            }
            EpochOutcome::Cancelled { .. } => {
                self.epochs_cancelled += 1;
                return;
            }
        };

        let counts = summary.counts;
        self.resources_loaded += counts.loaded as u64;
        self.resources_failed += counts.failed as u64;
        self.resources_timed_out += counts.timed_out as u64;
        self.resources_already_complete += summary.already_complete as u64;
        self.settle_ms.record(summary.elapsed.as_millis() as u64);
        self.set_size.record(counts.total() as u64);
    }
}
