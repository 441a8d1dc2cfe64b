use std::time::Duration;

use dom::Document;
use tracing::{debug, warn};

use crate::config::ReadinessConfig;
use crate::descriptor::ResourceSet;

/// Result of one scan pass.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Incomplete resources the round has to wait on.
    pub set: ResourceSet,
    /// All trackable nodes seen, complete or not.
    pub discovered: usize,
    /// Nodes skipped because they were already complete.
    pub already_complete: usize,
    /// Re-checks spent waiting for the document to finish parsing.
    pub ready_polls: u32,
}

/// Enumerates the incomplete resources currently in the document.
pub struct Scanner<'a> {
    document: &'a dyn Document,
    poll_interval: Duration,
    max_polls: u32,
}

impl<'a> Scanner<'a> {
    pub fn new(document: &'a dyn Document, config: &ReadinessConfig) -> Self {
        Self {
            document,
            poll_interval: config.ready_poll_interval(),
            max_polls: config.max_ready_polls,
        }
    }

    /// Waits for the document to be parsed, then snapshots it.
    ///
    /// Never fails: the worst case is an empty set.
    pub async fn scan(&self) -> ScanReport {
        let ready_polls = self.wait_until_parsed().await;
        ScanReport {
            ready_polls,
            ..self.scan_now()
        }
    }

    /// Re-checks the ready state every poll interval, sleeping in between so
    /// the rest of the event loop keeps running. Gives up after `max_polls`.
    pub async fn wait_until_parsed(&self) -> u32 {
        let mut polls = 0;
        while !self.document.ready_state().is_parsed() {
            if polls >= self.max_polls {
                warn!(polls, "document still parsing; scanning anyway");
                break;
            }
            tokio::time::sleep(self.poll_interval).await;
            polls += 1;
        }
        polls
    }

    /// Snapshots the document without waiting.
    pub fn scan_now(&self) -> ScanReport {
        let nodes = self.document.trackable_nodes();
        let discovered = nodes.len();
        let pending: Vec<_> = nodes.into_iter().filter(|n| !n.is_complete()).collect();
        let already_complete = discovered - pending.len();
        debug!(discovered, already_complete, pending = pending.len(), "scanned document");

        ScanReport {
            set: ResourceSet::new(pending),
            discovered,
            already_complete,
            ready_polls: 0,
        }
    }
}
