//! Page-transition readiness tracking.
//!
//! On every navigation the [`Orchestrator`] starts a new [`Epoch`]: the
//! [`Scanner`] snapshots the incomplete images, stylesheets and scripts in the
//! document, the [`CompletionTracker`] waits for each of them (bounded by a
//! per-kind timeout), and the aggregate progress is published as a
//! [`ProgressSignal`]. Once a round settles, a [`MutationWatcher`] re-arms the
//! orchestrator for content inserted later.

pub mod config;
pub mod descriptor;
pub mod epoch;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod scanner;
pub mod signal;
pub mod tracker;
pub mod watcher;

pub use config::*;
pub use descriptor::*;
pub use epoch::*;
pub use error::*;
pub use metrics::*;
pub use orchestrator::*;
pub use scanner::*;
pub use signal::*;
pub use tracker::*;
pub use watcher::*;
