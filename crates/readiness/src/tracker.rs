use std::time::Duration;

use dom::{LoadEvent, LoadListener, ResourceKind};
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tracing::{debug, warn};

use crate::config::ReadinessConfig;
use crate::descriptor::{ResourceDescriptor, ResourceSet, ResourceState, SetCounts};
use crate::error::ResourceFault;

/// Drives every member of a [`ResourceSet`] to a terminal state.
///
/// Each pending member gets a load listener and a kind-specific timeout; the
/// first of load, error or timeout wins and the other two are dropped. All
/// timeouts run concurrently, so a full run takes at most the largest
/// timeout. The tracker itself never fails.
#[derive(Debug, Clone)]
pub struct CompletionTracker {
    image_timeout: Duration,
    stylesheet_timeout: Duration,
    script_timeout: Duration,
}

impl CompletionTracker {
    pub fn new(config: &ReadinessConfig) -> Self {
        Self {
            image_timeout: config.timeout_for(ResourceKind::Image),
            stylesheet_timeout: config.timeout_for(ResourceKind::Stylesheet),
            script_timeout: config.timeout_for(ResourceKind::Script),
        }
    }

    pub fn timeout_for(&self, kind: ResourceKind) -> Duration {
        match kind {
            ResourceKind::Image => self.image_timeout,
            ResourceKind::Stylesheet => self.stylesheet_timeout,
            ResourceKind::Script => self.script_timeout,
        }
    }

    /// Runs until every member is resolved, calling `on_transition` once per
    /// terminal transition with the updated tallies.
    ///
    /// Dropping the returned future detaches all outstanding listeners and
    /// timers.
    pub async fn run<F>(&self, set: &mut ResourceSet, mut on_transition: F) -> SetCounts
    where
        F: FnMut(&ResourceDescriptor, SetCounts),
    {
        let mut watches = FuturesUnordered::new();
        let mut already_complete = Vec::new();

        for (index, member) in set.members().iter().enumerate() {
            if member.state().is_terminal() {
                continue;
            }
            if member.node().is_complete() {
                // Finished between scan and registration.
                already_complete.push(index);
                continue;
            }
            let listener = member.node().listen();
            watches.push(watch(index, listener, self.timeout_for(member.kind())));
        }

        for index in already_complete {
            self.record(set, index, ResourceState::Loaded, &mut on_transition);
        }

        while let Some((index, state)) = watches.next().await {
            self.record(set, index, state, &mut on_transition);
        }

        set.counts()
    }

    fn record<F>(
        &self,
        set: &mut ResourceSet,
        index: usize,
        state: ResourceState,
        on_transition: &mut F,
    ) where
        F: FnMut(&ResourceDescriptor, SetCounts),
    {
        if !set.settle(index, state) {
            return;
        }
        let Some(member) = set.get(index) else {
            return;
        };

        match state {
            ResourceState::Failed => {
                let fault = ResourceFault::LoadFailed {
                    node: member.id(),
                    kind: member.kind(),
                };
                debug!(%fault, "resource failed");
            }
            ResourceState::TimedOut => {
                let fault = ResourceFault::TimedOut {
                    node: member.id(),
                    kind: member.kind(),
                    after: self.timeout_for(member.kind()),
                };
                warn!(%fault, "resource timed out");
            }
            _ => debug!(node = %member.id(), kind = %member.kind(), "resource loaded"),
        }

        on_transition(member, set.counts());
    }
}

async fn watch(index: usize, listener: LoadListener, timeout: Duration) -> (usize, ResourceState) {
    let state = tokio::select! {
        biased;
        event = listener => match event {
            LoadEvent::Loaded => ResourceState::Loaded,
            LoadEvent::Failed => ResourceState::Failed,
        },
        () = tokio::time::sleep(timeout) => ResourceState::TimedOut,
    };
    (index, state)
}
