//! Runs the readiness orchestrator against a simulated page and prints every
//! signal change as a JSON line.

mod scenario;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use dom::Element;
use readiness::{Orchestrator, ProgressSignal, ReadinessConfig};
use serde::Serialize;
use serde_json::json;
use tokio::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::scenario::PagePlan;

#[derive(Parser, Debug)]
#[command(author, version, about = "Simulate page transitions and report readiness")]
struct Args {
    /// JSON config file; READINESS_* env vars override it
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 3)]
    images: usize,

    #[arg(long, default_value_t = 1)]
    stylesheets: usize,

    #[arg(long, default_value_t = 1)]
    scripts: usize,

    /// Images already complete before the first navigation
    #[arg(long, default_value_t = 0)]
    preloaded: usize,

    /// Resources that fail instead of loading
    #[arg(long, default_value_t = 0)]
    failing: usize,

    /// Resources that never finish (they time out)
    #[arg(long, default_value_t = 0)]
    stalled: usize,

    /// Milliseconds between consecutive resource completions
    #[arg(long, default_value_t = 200)]
    step_ms: u64,

    /// Milliseconds the document stays in the `loading` state
    #[arg(long, default_value_t = 0)]
    parse_delay_ms: u64,

    /// Navigations to fire back to back
    #[arg(long, default_value_t = 1)]
    navigations: u32,

    /// Milliseconds between navigations
    #[arg(long, default_value_t = 0)]
    navigation_gap_ms: u64,

    /// Insert a new image after the page settles
    #[arg(long)]
    inject: bool,

    /// Dump the event trace at the end
    #[arg(long)]
    trace: bool,
}

#[derive(Serialize)]
struct Line<'a> {
    t_ms: u128,
    #[serde(flatten)]
    signal: &'a ProgressSignal,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ReadinessConfig::from_path(path)?,
        None => ReadinessConfig::default(),
    }
    .apply_env()?;
    info!(?config, "effective config");

    let plan = PagePlan {
        images: args.images,
        stylesheets: args.stylesheets,
        scripts: args.scripts,
        preloaded: args.preloaded,
        failing: args.failing,
        stalled: args.stalled,
        step: Duration::from_millis(args.step_ms),
        parse_delay: Duration::from_millis(args.parse_delay_ms),
    };
    let (doc, nodes) = scenario::build(&plan);
    let orch = Orchestrator::new(doc.clone(), config);

    let started = Instant::now();
    let mut rx = orch.subscribe();
    let printer = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let signal = rx.borrow_and_update().clone();
            let line = Line {
                t_ms: started.elapsed().as_millis(),
                signal: &signal,
            };
            if let Ok(text) = serde_json::to_string(&line) {
                println!("{text}");
            }
        }
    });

    for n in 0..args.navigations {
        if n > 0 && args.navigation_gap_ms > 0 {
            tokio::time::sleep(Duration::from_millis(args.navigation_gap_ms)).await;
        }
        orch.start_epoch();
    }
    let driver = scenario::schedule(&plan, doc.clone(), nodes);
    orch.wait_ready().await;

    if args.inject {
        // Let the settled round arm its watcher.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let before = orch.current_epoch();
        let added = doc.insert(
            Element::new("figure").with_child(Element::new("img").with_attr("src", "/late.png")),
        );
        while orch.current_epoch() == before {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        tokio::time::sleep(Duration::from_millis(args.step_ms)).await;
        for node in &added {
            node.fire_load();
        }
        orch.wait_ready().await;
    }

    orch.shutdown();
    driver.abort();
    printer.abort();

    println!("{}", json!({ "metrics": orch.metrics() }));
    if args.trace {
        for event in orch.trace() {
            println!("{}", serde_json::to_string(&event)?);
        }
    }
    Ok(())
}
