//! Topology error types

use hostmap_core::HostId;
use thiserror::Error;

/// Errors raised by the topology store and merge engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    /// A graph invariant was violated (for example an edge to a host that
    /// does not exist). Fatal: discovery must stop.
    #[error("Store corruption: {0}")]
    StoreCorruption(String),

    /// A candidate matched several hosts. Recovered by collapsing them;
    /// only constructed for logging.
    #[error("Merge conflict: candidate matched {hosts:?}, collapsed into {canonical}")]
    MergeConflict {
        canonical: HostId,
        hosts: Vec<HostId>,
    },

    /// The host id is neither live nor an alias of a live host
    #[error("Unknown host: {0}")]
    UnknownHost(HostId),

    /// The candidate carries no usable identity
    #[error("Invalid candidate: {0}")]
    InvalidCandidate(String),
}

impl TopologyError {
    /// Whether this error must halt discovery
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StoreCorruption(_))
    }
}

/// Result type for topology operations
pub type TopologyResult<T> = Result<T, TopologyError>;
