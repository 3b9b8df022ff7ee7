//! Topology change events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::HostAddress;
use crate::host::HostId;

/// Events emitted when the topology graph changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiscoveryEvent {
    /// A host was observed for the first time
    HostDiscovered {
        host: HostId,
        /// The address it was first seen with
        address: Option<HostAddress>,
        /// The observer that reported it (`None` for seeds)
        source: Option<HostId>,
        timestamp: DateTime<Utc>,
    },

    /// Probing gave up on a host
    HostUnreachable {
        host: HostId,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },

    /// A stale or unreachable host answered a probe again
    HostRecovered {
        host: HostId,
        timestamp: DateTime<Utc>,
    },

    /// An edge was recorded for the first time or reported again after going stale
    EdgeObserved {
        observer: HostId,
        observed: HostId,
        interface: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// An edge is no longer reported by its observer
    EdgeStale {
        observer: HostId,
        observed: HostId,
        timestamp: DateTime<Utc>,
    },

    /// Two hosts were found to be the same device and collapsed into one
    HostsMerged {
        canonical: HostId,
        absorbed: HostId,
        timestamp: DateTime<Utc>,
    },
}

impl DiscoveryEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::HostDiscovered { timestamp, .. } => *timestamp,
            Self::HostUnreachable { timestamp, .. } => *timestamp,
            Self::HostRecovered { timestamp, .. } => *timestamp,
            Self::EdgeObserved { timestamp, .. } => *timestamp,
            Self::EdgeStale { timestamp, .. } => *timestamp,
            Self::HostsMerged { timestamp, .. } => *timestamp,
        }
    }

    /// Short name of the event kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::HostDiscovered { .. } => "host_discovered",
            Self::HostUnreachable { .. } => "host_unreachable",
            Self::HostRecovered { .. } => "host_recovered",
            Self::EdgeObserved { .. } => "edge_observed",
            Self::EdgeStale { .. } => "edge_stale",
            Self::HostsMerged { .. } => "hosts_merged",
        }
    }

    /// The primary host this event is about
    pub fn host(&self) -> HostId {
        match self {
            Self::HostDiscovered { host, .. }
            | Self::HostUnreachable { host, .. }
            | Self::HostRecovered { host, .. } => *host,
            Self::EdgeObserved { observed, .. } | Self::EdgeStale { observed, .. } => *observed,
            Self::HostsMerged { canonical, .. } => *canonical,
        }
    }

    /// Create a host discovered event
    pub fn host_discovered(
        host: HostId,
        address: Option<HostAddress>,
        source: Option<HostId>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::HostDiscovered {
            host,
            address,
            source,
            timestamp,
        }
    }

    /// Create a host unreachable event
    pub fn host_unreachable(host: HostId, attempts: u32, timestamp: DateTime<Utc>) -> Self {
        Self::HostUnreachable {
            host,
            attempts,
            timestamp,
        }
    }

    /// Create a host recovered event
    pub fn host_recovered(host: HostId, timestamp: DateTime<Utc>) -> Self {
        Self::HostRecovered { host, timestamp }
    }

    /// Create an edge observed event
    pub fn edge_observed(
        observer: HostId,
        observed: HostId,
        interface: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::EdgeObserved {
            observer,
            observed,
            interface,
            timestamp,
        }
    }

    /// Create an edge stale event
    pub fn edge_stale(observer: HostId, observed: HostId, timestamp: DateTime<Utc>) -> Self {
        Self::EdgeStale {
            observer,
            observed,
            timestamp,
        }
    }

    /// Create a hosts merged event
    pub fn hosts_merged(canonical: HostId, absorbed: HostId, timestamp: DateTime<Utc>) -> Self {
        Self::HostsMerged {
            canonical,
            absorbed,
            timestamp,
        }
    }
}

/// An event stamped with its position in the store's commit order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencedEvent {
    /// Commit sequence number, starting at 1
    pub sequence: u64,
    /// The event
    pub event: DiscoveryEvent,
}
