use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use foundation::ids::NodeId;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Asset kinds whose loads gate a page transition.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Image,
    Stylesheet,
    Script,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::Image,
        ResourceKind::Stylesheet,
        ResourceKind::Script,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ResourceKind::Image => "image",
            ResourceKind::Stylesheet => "stylesheet",
            ResourceKind::Script => "script",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Completion evidence a node exposes without any listener attached.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CompletionProbe {
    Image {
        complete: bool,
        natural_width: u32,
        natural_height: u32,
    },
    Stylesheet {
        rules_parsed: bool,
    },
    Script {
        loaded_marker: bool,
    },
}

impl CompletionProbe {
    pub fn pending(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Image => CompletionProbe::Image {
                complete: false,
                natural_width: 0,
                natural_height: 0,
            },
            ResourceKind::Stylesheet => CompletionProbe::Stylesheet {
                rules_parsed: false,
            },
            ResourceKind::Script => CompletionProbe::Script {
                loaded_marker: false,
            },
        }
    }

    pub fn loaded(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Image => CompletionProbe::Image {
                complete: true,
                natural_width: 1,
                natural_height: 1,
            },
            ResourceKind::Stylesheet => CompletionProbe::Stylesheet { rules_parsed: true },
            ResourceKind::Script => CompletionProbe::Script {
                loaded_marker: true,
            },
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            CompletionProbe::Image { .. } => ResourceKind::Image,
            CompletionProbe::Stylesheet { .. } => ResourceKind::Stylesheet,
            CompletionProbe::Script { .. } => ResourceKind::Script,
        }
    }

    /// Whether the asset is usable right now.
    ///
    /// A broken image reports `complete` with zero natural dimensions, so both
    /// are required.
    pub fn is_complete(&self) -> bool {
        match *self {
            CompletionProbe::Image {
                complete,
                natural_width,
                natural_height,
            } => complete && natural_width > 0 && natural_height > 0,
            CompletionProbe::Stylesheet { rules_parsed } => rules_parsed,
            CompletionProbe::Script { loaded_marker } => loaded_marker,
        }
    }
}

/// Terminal event a node emits for its load.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadEvent {
    Loaded,
    Failed,
}

/// Node-side half of a load listener.
#[derive(Debug)]
pub struct LoadNotifier {
    tx: oneshot::Sender<LoadEvent>,
}

impl LoadNotifier {
    /// Delivers `event`; returns `false` if the listener was already detached.
    pub fn notify(self, event: LoadEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn is_detached(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Resolves with the first load event of a node.
///
/// Dropping the listener detaches it. If the node goes away without ever
/// emitting, the listener stays pending forever; callers bound it with a
/// timeout.
#[derive(Debug)]
pub struct LoadListener {
    rx: Option<oneshot::Receiver<LoadEvent>>,
}

impl LoadListener {
    pub fn channel() -> (LoadNotifier, LoadListener) {
        let (tx, rx) = oneshot::channel();
        (LoadNotifier { tx }, LoadListener { rx: Some(rx) })
    }

    /// A listener for a node that has already emitted `event`.
    pub fn fired(event: LoadEvent) -> Self {
        let (notifier, listener) = Self::channel();
        notifier.notify(event);
        listener
    }
}

impl Future for LoadListener {
    type Output = LoadEvent;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<LoadEvent> {
        let Some(rx) = self.rx.as_mut() else {
            return Poll::Pending;
        };
        match Pin::new(rx).poll(cx) {
            Poll::Ready(Ok(event)) => {
                self.rx = None;
                Poll::Ready(event)
            }
            Poll::Ready(Err(_)) => {
                // Node dropped without emitting.
                self.rx = None;
                Poll::Pending
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// An asset-bearing node the tracker may observe.
pub trait TrackableNode: Send + Sync + std::fmt::Debug {
    fn id(&self) -> NodeId;

    fn kind(&self) -> ResourceKind;

    fn probe(&self) -> CompletionProbe;

    fn is_complete(&self) -> bool {
        self.probe().is_complete()
    }

    /// Attaches a listener for the node's load/error events.
    fn listen(&self) -> LoadListener;
}
