//! In-memory topology graph
//!
//! [`TopologyGraph`] is the plain data behind the store: hosts, the
//! identity index that maps addresses and device ids to hosts, directed
//! edges, and the aliases left behind by split-brain collapses. It is
//! cheap to clone relative to a probe round trip, which lets the store
//! mutate a private draft and publish it atomically.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use hostmap_core::{Edge, Host, HostAddress, HostId, IdentityKey, NeighborCandidate};

use crate::error::{TopologyError, TopologyResult};

/// Hosts, edges and identity index
#[derive(Debug, Clone, Default)]
pub struct TopologyGraph {
    /// Live hosts by id
    pub(crate) hosts: BTreeMap<HostId, Host>,
    /// Identity key to owning host
    pub(crate) index: HashMap<IdentityKey, HostId>,
    /// Edges keyed by (observer, observed)
    pub(crate) edges: BTreeMap<(HostId, HostId), Edge>,
    /// Absorbed host id to canonical host id
    pub(crate) aliases: BTreeMap<HostId, HostId>,
    /// Infrastructure addresses that are never treated as hosts
    pub(crate) ignored: BTreeSet<HostAddress>,
    /// Last allocated id
    pub(crate) last_id: u64,
}

impl TopologyGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a live host by id
    pub fn host(&self, id: HostId) -> Option<&Host> {
        self.hosts.get(&id)
    }

    /// Iterate over live hosts in id order
    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    /// Find the host owning an address
    pub fn host_by_address(&self, address: &HostAddress) -> Option<&Host> {
        self.index
            .get(&IdentityKey::Address(*address))
            .and_then(|id| self.hosts.get(id))
    }

    /// Find the host with a device id
    pub fn host_by_device(&self, device_id: &str) -> Option<&Host> {
        self.index
            .get(&IdentityKey::Device(device_id.to_string()))
            .and_then(|id| self.hosts.get(id))
    }

    /// Get an edge
    pub fn edge(&self, observer: HostId, observed: HostId) -> Option<&Edge> {
        self.edges.get(&(observer, observed))
    }

    /// Iterate over edges ordered by (observer, observed)
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// Iterate over edges whose observer is `observer`
    pub fn outgoing(&self, observer: HostId) -> impl Iterator<Item = &Edge> {
        self.edges
            .range((observer, HostId(0))..=(observer, HostId(u64::MAX)))
            .map(|(_, edge)| edge)
    }

    /// Follow aliases to the live host
    pub fn resolve(&self, id: HostId) -> Option<HostId> {
        if self.hosts.contains_key(&id) {
            return Some(id);
        }
        self.aliases
            .get(&id)
            .copied()
            .filter(|canonical| self.hosts.contains_key(canonical))
    }

    /// Alias records as (absorbed, canonical)
    pub fn aliases(&self) -> impl Iterator<Item = (HostId, HostId)> + '_ {
        self.aliases.iter().map(|(a, c)| (*a, *c))
    }

    /// Check whether an address is on the ignore list
    pub fn is_ignored(&self, address: &HostAddress) -> bool {
        self.ignored.contains(address)
    }

    /// Whether every address of the candidate is ignored
    ///
    /// Candidates identified only by a device id are never ignored.
    pub fn ignores_candidate(&self, candidate: &NeighborCandidate) -> bool {
        !candidate.addresses.is_empty()
            && candidate.device_id.is_none()
            && candidate.addresses.iter().all(|a| self.is_ignored(a))
    }

    /// Number of live hosts
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    /// Number of edges, stale ones included
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Distinct hosts owning any of `keys`, in id order
    pub(crate) fn matching_hosts(&self, keys: &[IdentityKey]) -> BTreeSet<HostId> {
        keys.iter()
            .filter_map(|key| self.index.get(key).copied())
            .collect()
    }

    pub(crate) fn allocate_id(&mut self) -> HostId {
        self.last_id += 1;
        HostId(self.last_id)
    }

    pub(crate) fn host_mut(&mut self, id: HostId) -> TopologyResult<&mut Host> {
        self.hosts.get_mut(&id).ok_or(TopologyError::UnknownHost(id))
    }

    /// Check the graph invariants
    ///
    /// Every edge endpoint and every index entry must name a live host,
    /// every key a host carries must be indexed to it, and every alias
    /// must point at a live host.
    pub fn verify(&self) -> TopologyResult<()> {
        for (observer, observed) in self.edges.keys() {
            if !self.hosts.contains_key(observer) || !self.hosts.contains_key(observed) {
                return Err(TopologyError::StoreCorruption(format!(
                    "edge {} -> {} references a missing host",
                    observer, observed
                )));
            }
        }
        for (key, id) in &self.index {
            if !self.hosts.contains_key(id) {
                return Err(TopologyError::StoreCorruption(format!(
                    "identity {:?} indexed to missing {}",
                    key, id
                )));
            }
        }
        for host in self.hosts.values() {
            for key in host.identity_keys() {
                if self.index.get(&key) != Some(&host.id) {
                    return Err(TopologyError::StoreCorruption(format!(
                        "identity {:?} of {} is not indexed to it",
                        key, host.id
                    )));
                }
            }
        }
        for (absorbed, canonical) in &self.aliases {
            if !self.hosts.contains_key(canonical) {
                return Err(TopologyError::StoreCorruption(format!(
                    "alias {} points at missing {}",
                    absorbed, canonical
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hostmap_core::LinkInfo;

    fn addr(s: &str) -> HostAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_allocate_ids_in_order() {
        let mut graph = TopologyGraph::new();
        assert_eq!(graph.allocate_id(), HostId(1));
        assert_eq!(graph.allocate_id(), HostId(2));
    }

    #[test]
    fn test_outgoing_range() {
        let mut graph = TopologyGraph::new();
        let now = Utc::now();
        for id in 1..=3 {
            graph.hosts.insert(HostId(id), Host::new(HostId(id), now));
        }
        for (o, d) in [(1, 2), (1, 3), (2, 3)] {
            graph.edges.insert(
                (HostId(o), HostId(d)),
                Edge::new(HostId(o), HostId(d), LinkInfo::default(), now),
            );
        }

        let out: Vec<_> = graph.outgoing(HostId(1)).map(|e| e.observed).collect();
        assert_eq!(out, vec![HostId(2), HostId(3)]);
        assert_eq!(graph.outgoing(HostId(3)).count(), 0);
    }

    #[test]
    fn test_resolve_through_alias() {
        let mut graph = TopologyGraph::new();
        graph.hosts.insert(HostId(1), Host::new(HostId(1), Utc::now()));
        graph.aliases.insert(HostId(2), HostId(1));

        assert_eq!(graph.resolve(HostId(1)), Some(HostId(1)));
        assert_eq!(graph.resolve(HostId(2)), Some(HostId(1)));
        assert_eq!(graph.resolve(HostId(3)), None);
    }

    #[test]
    fn test_ignores_candidate() {
        let mut graph = TopologyGraph::new();
        graph.ignored.insert(addr("02:00:00:00:00:aa"));

        assert!(graph.ignores_candidate(&NeighborCandidate::new(addr("02:00:00:00:00:aa"))));
        assert!(!graph.ignores_candidate(
            &NeighborCandidate::new(addr("02:00:00:00:00:aa")).and_address(addr("10.0.0.1"))
        ));
        assert!(!graph.ignores_candidate(
            &NeighborCandidate::new(addr("02:00:00:00:00:aa")).with_device_id("sw1")
        ));
    }

    #[test]
    fn test_verify_detects_dangling_edge() {
        let mut graph = TopologyGraph::new();
        let now = Utc::now();
        graph.hosts.insert(HostId(1), Host::new(HostId(1), now));
        assert!(graph.verify().is_ok());

        graph.edges.insert(
            (HostId(1), HostId(5)),
            Edge::new(HostId(1), HostId(5), LinkInfo::default(), now),
        );
        assert!(matches!(
            graph.verify(),
            Err(TopologyError::StoreCorruption(_))
        ));
    }

    #[test]
    fn test_verify_detects_unindexed_address() {
        let mut graph = TopologyGraph::new();
        let mut host = Host::new(HostId(1), Utc::now());
        host.addresses.insert(addr("10.0.0.1"));
        graph.hosts.insert(HostId(1), host);
        assert!(graph.verify().is_err());

        graph
            .index
            .insert(IdentityKey::Address(addr("10.0.0.1")), HostId(1));
        assert!(graph.verify().is_ok());
    }
}
