//! Read-only views of the topology
//!
//! A [`TopologySnapshot`] shares the graph that was live when it was
//! taken. Later commits replace the store's graph rather than mutating
//! it, so a snapshot stays internally consistent for as long as it is
//! held.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hostmap_core::{Edge, Host, HostAddress, HostId, Liveness};
use serde::{Deserialize, Serialize};

use crate::error::TopologyResult;
use crate::graph::TopologyGraph;

/// A consistent read-only view of the topology graph
#[derive(Debug, Clone)]
pub struct TopologySnapshot {
    graph: Arc<TopologyGraph>,
    taken_at: DateTime<Utc>,
}

impl TopologySnapshot {
    pub(crate) fn new(graph: Arc<TopologyGraph>) -> Self {
        Self {
            graph,
            taken_at: Utc::now(),
        }
    }

    /// Hosts in id order
    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.graph.hosts()
    }

    /// Look up a host, following merge aliases
    pub fn host(&self, id: HostId) -> Option<&Host> {
        self.graph.resolve(id).and_then(|id| self.graph.host(id))
    }

    /// Look up the host owning an IP or MAC address
    pub fn host_by_address(&self, address: &HostAddress) -> Option<&Host> {
        self.graph.host_by_address(address)
    }

    /// Look up the host with a device id
    pub fn host_by_device(&self, device_id: &str) -> Option<&Host> {
        self.graph.host_by_device(device_id)
    }

    /// Follow merge aliases to the live host
    pub fn resolve(&self, id: HostId) -> Option<HostId> {
        self.graph.resolve(id)
    }

    /// Get the edge `observer -> observed`, stale or not
    pub fn edge(&self, observer: HostId, observed: HostId) -> Option<&Edge> {
        self.graph.edge(observer, observed)
    }

    /// All edges, stale ones included
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.graph.edges()
    }

    /// Edges reported by their observer's most recent probe
    pub fn active_edges(&self) -> impl Iterator<Item = &Edge> {
        self.graph.edges().filter(|edge| edge.is_active())
    }

    /// Hosts `id` currently reports as direct neighbors
    pub fn neighbors(&self, id: HostId) -> Vec<HostId> {
        match self.graph.resolve(id) {
            Some(id) => self
                .graph
                .outgoing(id)
                .filter(|edge| edge.is_active())
                .map(|edge| edge.observed)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Number of live hosts
    pub fn host_count(&self) -> usize {
        self.graph.host_count()
    }

    /// Number of edges, stale ones included
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Hosts in a given liveness state
    pub fn hosts_with_liveness(&self, liveness: Liveness) -> Vec<&Host> {
        self.graph
            .hosts()
            .filter(|host| host.liveness == liveness)
            .collect()
    }

    /// When the snapshot was taken
    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// Check the graph invariants
    pub fn verify(&self) -> TopologyResult<()> {
        self.graph.verify()
    }

    /// Owned, serializable copy of the graph
    pub fn export(&self) -> TopologyExport {
        TopologyExport {
            taken_at: self.taken_at,
            hosts: self.graph.hosts().cloned().collect(),
            edges: self.graph.edges().cloned().collect(),
            aliases: self
                .graph
                .aliases()
                .map(|(absorbed, canonical)| AliasRecord {
                    absorbed,
                    canonical,
                })
                .collect(),
        }
    }

    /// The export as pretty-printed JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.export())
    }
}

/// Serializable form of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyExport {
    pub taken_at: DateTime<Utc>,
    pub hosts: Vec<Host>,
    pub edges: Vec<Edge>,
    pub aliases: Vec<AliasRecord>,
}

/// A host id that was absorbed by a split-brain collapse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRecord {
    pub absorbed: HostId,
    pub canonical: HostId,
}
