use std::sync::Arc;
use std::time::Duration;

use dom::memory::{MemoryDocument, MemoryNode};
use dom::{ReadyState, ResourceKind};
use tokio::task::JoinHandle;
use tracing::debug;

/// How the simulated page's resources behave once a round starts.
#[derive(Debug, Clone)]
pub struct PagePlan {
    pub images: usize,
    pub stylesheets: usize,
    pub scripts: usize,
    /// Images complete before the first round.
    pub preloaded: usize,
    /// Pending resources (in document order) that emit `error` instead of `load`.
    pub failing: usize,
    /// Pending resources (from the end) that never emit anything.
    pub stalled: usize,
    /// Gap between consecutive completions.
    pub step: Duration,
    /// Document stays `loading` this long before becoming interactive.
    pub parse_delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fate {
    Load,
    Fail,
    Stall,
}

/// Builds the document and returns the pending nodes with their fates.
pub fn build(plan: &PagePlan) -> (Arc<MemoryDocument>, Vec<(Arc<MemoryNode>, Fate)>) {
    let ready_state = if plan.parse_delay.is_zero() {
        ReadyState::Complete
    } else {
        ReadyState::Loading
    };
    let doc = Arc::new(MemoryDocument::with_ready_state(ready_state));
    for _ in 0..plan.preloaded {
        doc.add_loaded(ResourceKind::Image);
    }

    let kinds = std::iter::repeat_n(ResourceKind::Stylesheet, plan.stylesheets)
        .chain(std::iter::repeat_n(ResourceKind::Script, plan.scripts))
        .chain(std::iter::repeat_n(ResourceKind::Image, plan.images));
    let pending: Vec<_> = kinds.map(|kind| doc.add_pending(kind)).collect();

    let total = pending.len();
    let stall_from = total.saturating_sub(plan.stalled);
    let nodes = pending
        .into_iter()
        .enumerate()
        .map(|(i, node)| {
            let fate = if i >= stall_from {
                Fate::Stall
            } else if i < plan.failing {
                Fate::Fail
            } else {
                Fate::Load
            };
            (node, fate)
        })
        .collect();
    (doc, nodes)
}

/// Drives parsing and resource completion on a background task.
pub fn schedule(
    plan: &PagePlan,
    doc: Arc<MemoryDocument>,
    nodes: Vec<(Arc<MemoryNode>, Fate)>,
) -> JoinHandle<()> {
    let step = plan.step;
    let parse_delay = plan.parse_delay;
    tokio::spawn(async move {
        if !parse_delay.is_zero() {
            tokio::time::sleep(parse_delay).await;
            doc.set_ready_state(ReadyState::Interactive);
            debug!("document interactive");
        }
        for (node, fate) in nodes {
            let fire: fn(&MemoryNode) -> bool = match fate {
                Fate::Load => MemoryNode::fire_load,
                Fate::Fail => MemoryNode::fire_error,
                Fate::Stall => continue,
            };
            tokio::time::sleep(step).await;
            fire(&node);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::{Fate, PagePlan, build};
    use dom::TrackableNode;
    use std::time::Duration;

    fn plan() -> PagePlan {
        PagePlan {
            images: 2,
            stylesheets: 1,
            scripts: 1,
            preloaded: 1,
            failing: 1,
            stalled: 1,
            step: Duration::from_millis(100),
            parse_delay: Duration::ZERO,
        }
    }

    #[test]
    fn assigns_fates_in_document_order() {
        let (doc, nodes) = build(&plan());
        assert_eq!(doc.nodes().len(), 5);
        let fates: Vec<Fate> = nodes.iter().map(|(_, f)| *f).collect();
        assert_eq!(fates, vec![Fate::Fail, Fate::Load, Fate::Load, Fate::Stall]);
        assert!(nodes.iter().all(|(n, _)| !n.is_complete()));
    }

    #[test]
    fn stalled_wins_over_failing() {
        let plan = PagePlan {
            failing: 4,
            stalled: 4,
            ..plan()
        };
        let (_, nodes) = build(&plan);
        assert!(nodes.iter().all(|(_, f)| *f == Fate::Stall));
    }
}
