use std::sync::Arc;
use std::time::Duration;

use dom::ResourceKind;
use dom::memory::MemoryDocument;
use foundation::ids::EpochId;
use pretty_assertions::assert_eq;
use readiness::{
    EpochPhase, Orchestrator, ProgressSignal, ReadinessConfig, ResourceState, TraceEvent,
};
use tokio::time::{Instant, sleep};

fn orchestrator(doc: &Arc<MemoryDocument>) -> Orchestrator {
    Orchestrator::new(doc.clone(), ReadinessConfig::default())
}

/// Collects every signal value the receiver observes until ready.
fn record_until_ready(orch: &Orchestrator) -> tokio::task::JoinHandle<Vec<ProgressSignal>> {
    let mut rx = orch.subscribe();
    tokio::spawn(async move {
        let mut seen = vec![rx.borrow_and_update().clone()];
        while rx.changed().await.is_ok() {
            let signal = rx.borrow_and_update().clone();
            let done = signal.ready;
            seen.push(signal);
            if done {
                break;
            }
        }
        seen
    })
}

#[tokio::test(start_paused = true)]
async fn preloaded_page_is_ready_without_listeners() {
    let doc = Arc::new(MemoryDocument::new());
    for _ in 0..3 {
        doc.add_loaded(ResourceKind::Image);
    }
    let orch = orchestrator(&doc);
    let t0 = Instant::now();

    let id = orch.start_epoch();
    let signal = orch.wait_ready().await;

    assert_eq!(signal.epoch, id);
    assert_eq!(signal.percentage, 100.0);
    assert_eq!(signal.message, "Ready");
    assert!(t0.elapsed() >= Duration::from_millis(250));
    assert_eq!(doc.listener_count(), 0);

    let metrics = orch.metrics();
    assert_eq!(metrics.epochs_ready, 1);
    assert_eq!(metrics.resources_already_complete, 3);
    assert_eq!(metrics.set_size.sum, 0);
}

#[tokio::test(start_paused = true)]
async fn stalled_script_holds_progress_until_timeout() {
    let doc = Arc::new(MemoryDocument::new());
    let image = doc.add_pending(ResourceKind::Image);
    doc.add_pending(ResourceKind::Script);
    let orch = orchestrator(&doc);

    orch.start_epoch();
    assert_eq!(orch.signal().percentage, 10.0);

    sleep(Duration::from_millis(100)).await;
    assert_eq!(orch.signal().percentage, 30.0);
    assert_eq!(doc.listener_count(), 2);

    sleep(Duration::from_millis(100)).await;
    image.fire_load();
    sleep(Duration::from_millis(10)).await;
    let signal = orch.signal();
    assert_eq!(signal.percentage, 50.0);
    assert_eq!(signal.message, "Loading resources (1/2)");

    sleep(Duration::from_millis(3700)).await;
    assert_eq!(orch.signal().percentage, 50.0);
    assert!(!orch.signal().ready);

    // Script timeout is 4000ms; the settle hold follows.
    sleep(Duration::from_millis(150)).await;
    let signal = orch.signal();
    assert_eq!(signal.percentage, 100.0);
    assert!(!signal.ready);
    assert_eq!(doc.listener_count(), 0);

    sleep(Duration::from_millis(300)).await;
    assert!(orch.signal().ready);
    let metrics = orch.metrics();
    assert_eq!(metrics.resources_loaded, 1);
    assert_eq!(metrics.resources_timed_out, 1);
}

#[tokio::test(start_paused = true)]
async fn rapid_navigation_only_reports_the_latest_epoch() {
    let doc = Arc::new(MemoryDocument::new());
    let image = doc.add_pending(ResourceKind::Image);
    let orch = orchestrator(&doc);

    let first = orch.start_epoch();
    let second = orch.start_epoch();
    assert_eq!(second, EpochId::new(2));

    let signal = orch.signal();
    assert_eq!(signal.epoch, second);
    assert_eq!(signal.percentage, 10.0);
    assert!(!signal.ready);

    let recorder = record_until_ready(&orch);
    sleep(Duration::from_millis(50)).await;
    assert_eq!(doc.listener_count(), 1);
    image.fire_load();

    let seen = recorder.await.unwrap();
    assert!(seen.iter().all(|s| s.epoch == second));
    assert!(seen.last().is_some_and(|s| s.ready));

    let trace = orch.trace();
    let first_published = trace
        .iter()
        .filter(|e| e.epoch == first)
        .filter(|e| matches!(e.payload, TraceEvent::Published { .. }))
        .count();
    // Only the baseline from `begin`; everything after is stale.
    assert_eq!(first_published, 1);
    assert!(
        trace
            .iter()
            .any(|e| e.epoch == first && matches!(e.payload, TraceEvent::StaleWrite { .. }))
    );
    assert_eq!(orch.metrics().epochs_cancelled, 1);
    assert_eq!(orch.metrics().epochs_ready, 1);
}

#[tokio::test(start_paused = true)]
async fn superseded_loading_epoch_cannot_touch_the_signal() {
    let doc = Arc::new(MemoryDocument::new());
    let early = doc.add_pending(ResourceKind::Image);
    let late = doc.add_pending(ResourceKind::Image);
    let orch = orchestrator(&doc);

    let first = orch.start_epoch();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(doc.listener_count(), 2);

    let second = orch.start_epoch();
    early.fire_load();
    let signal = orch.signal();
    assert_eq!(signal.epoch, second);
    assert_eq!(signal.percentage, 10.0);
    assert_eq!(signal.message, "Preparing page");
    assert!(!signal.ready);

    sleep(Duration::from_millis(50)).await;
    // The second round only waits on what is still loading.
    assert_eq!(doc.listener_count(), 1);
    assert_eq!(orch.signal().epoch, second);

    let first_events: Vec<TraceEvent> = orch
        .trace()
        .into_iter()
        .filter(|e| e.epoch == first)
        .map(|e| e.payload)
        .collect();
    let loading = first_events
        .iter()
        .position(|e| {
            matches!(
                e,
                TraceEvent::Phase {
                    phase: EpochPhase::Loading
                }
            )
        })
        .unwrap();
    assert_eq!(
        first_events[loading + 1..].to_vec(),
        vec![TraceEvent::Phase {
            phase: EpochPhase::Cancelled
        }]
    );

    late.fire_load();
    let ready = orch.wait_ready().await;
    assert_eq!(ready.epoch, second);
    assert_eq!(orch.metrics().resources_loaded, 1);
}

#[tokio::test(start_paused = true)]
async fn progress_never_moves_backwards() {
    let doc = Arc::new(MemoryDocument::new());
    let nodes: Vec<_> = (0..4).map(|_| doc.add_pending(ResourceKind::Image)).collect();
    let orch = orchestrator(&doc);

    orch.start_epoch();
    let recorder = record_until_ready(&orch);
    for (i, node) in nodes.iter().enumerate() {
        sleep(Duration::from_millis(40)).await;
        if i == 2 {
            node.fire_error();
        } else {
            node.fire_load();
        }
    }

    let seen = recorder.await.unwrap();
    assert!(
        seen.windows(2).all(|w| w[0].percentage <= w[1].percentage),
        "{seen:?}"
    );
    assert!(seen.iter().all(|s| (0.0..=100.0).contains(&s.percentage)));
    assert_eq!(orch.metrics().resources_failed, 1);
}

#[tokio::test(start_paused = true)]
async fn every_stalled_resource_times_out() {
    let doc = Arc::new(MemoryDocument::new());
    doc.add_pending(ResourceKind::Image);
    doc.add_pending(ResourceKind::Stylesheet);
    doc.add_pending(ResourceKind::Script);
    let orch = orchestrator(&doc);
    let t0 = Instant::now();

    orch.start_epoch();
    orch.wait_ready().await;
    let elapsed = t0.elapsed();
    assert!(elapsed >= Duration::from_millis(5250), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(5400), "{elapsed:?}");

    let timed_out: Vec<ResourceKind> = orch
        .trace()
        .into_iter()
        .filter_map(|e| match e.payload {
            TraceEvent::Resource {
                kind,
                state: ResourceState::TimedOut,
                ..
            } => Some(kind),
            _ => None,
        })
        .collect();
    assert_eq!(
        timed_out,
        vec![
            ResourceKind::Stylesheet,
            ResourceKind::Script,
            ResourceKind::Image
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn unparsed_document_is_polled_before_scanning() {
    let doc = Arc::new(MemoryDocument::with_ready_state(dom::ReadyState::Loading));
    let script = doc.add_pending(ResourceKind::Script);
    let orch = orchestrator(&doc);

    orch.start_epoch();
    sleep(Duration::from_millis(120)).await;
    assert_eq!(orch.signal().percentage, 10.0);
    assert_eq!(doc.listener_count(), 0);

    doc.set_ready_state(dom::ReadyState::Interactive);
    sleep(Duration::from_millis(60)).await;
    assert_eq!(doc.listener_count(), 1);
    script.fire_load();

    let signal = orch.wait_ready().await;
    assert_eq!(signal.percentage, 100.0);
}
