use serde::{Deserialize, Serialize};

/// Identifies one readiness round.
///
/// Ids are handed out in strictly increasing order, so comparing a captured
/// id against the current one is enough to detect a superseded round.
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EpochId(u64);

impl EpochId {
    /// The id observed before any round has started.
    pub const ZERO: EpochId = EpochId(0);

    pub fn new(n: u64) -> Self {
        EpochId(n)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        EpochId(self.0.wrapping_add(1))
    }
}

impl std::fmt::Display for EpochId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "epoch#{}", self.0)
    }
}

/// Opaque handle to a node owned by the rendering layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    pub fn new(n: u64) -> Self {
        NodeId(n)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}", self.0)
    }
}
