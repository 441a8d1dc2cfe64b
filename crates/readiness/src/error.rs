use std::path::PathBuf;
use std::time::Duration;

use dom::ResourceKind;
use foundation::ids::NodeId;

/// Why a single resource stopped counting as pending without loading.
///
/// Faults are recovered locally: they are logged and counted toward
/// completion, never returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceFault {
    #[error("{kind} {node} reported a load error")]
    LoadFailed { node: NodeId, kind: ResourceKind },
    #[error("{kind} {node} did not finish within {}ms", .after.as_millis())]
    TimedOut {
        node: NodeId,
        kind: ResourceKind,
        after: Duration,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("environment variable {var}={value:?} is not a valid {expected}")]
    Env {
        var: String,
        value: String,
        expected: &'static str,
    },
    #[error("invalid config: {field} {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}
