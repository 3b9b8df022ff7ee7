//! Topology store
//!
//! The single source of truth for what is known about the network.
//!
//! Writers are serialized by a commit lock. Each write runs against a
//! private copy of the graph (a [`Transaction`]); on success the copy is
//! swapped in with one pointer store and its events are handed to the
//! notifier before the commit lock is released. Readers take a
//! [`TopologySnapshot`], which is just a shared reference to the current
//! graph, so they can never observe a partially applied merge.
//!
//! Every write clones the whole graph, so a write costs O(graph size) and
//! a sweep O(hosts x graph size). Group related changes into one
//! [`TopologyStore::transaction`] rather than calling the single-step
//! methods in a row; the merge engine applies a whole probe result that way.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hostmap_core::{
    Attachment, Clock, DiscoveryEvent, Edge, EdgeState, Host, HostAddress, HostId, IdentityKey,
    LinkInfo, Liveness, NeighborCandidate, SystemClock,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{TopologyError, TopologyResult};
use crate::graph::TopologyGraph;
use crate::notifier::{ChangeNotifier, EventStream};
use crate::snapshot::TopologySnapshot;

/// In-memory topology graph with atomic multi-step updates
pub struct TopologyStore {
    graph: RwLock<Arc<TopologyGraph>>,
    commit: Mutex<()>,
    notifier: Arc<ChangeNotifier>,
    clock: Arc<dyn Clock>,
}

impl Default for TopologyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TopologyStore {
    /// Create an empty store stamped by the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store stamped by `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            graph: RwLock::new(Arc::new(TopologyGraph::new())),
            commit: Mutex::new(()),
            notifier: Arc::new(ChangeNotifier::new()),
            clock,
        }
    }

    /// The notifier that receives this store's events
    pub fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.notifier
    }

    /// Subscribe to committed events
    pub fn subscribe(&self) -> EventStream {
        self.notifier.subscribe()
    }

    /// A consistent read-only view of the current graph
    pub fn snapshot(&self) -> TopologySnapshot {
        TopologySnapshot::new(self.graph.read().clone())
    }

    /// Apply a multi-step change as one atomic unit
    ///
    /// `f` runs against a private draft of the graph. If it returns `Ok`
    /// the draft replaces the live graph and the events it produced are
    /// published; if it returns `Err` the draft and its events are
    /// discarded and the live graph is untouched.
    pub fn transaction<T, F>(&self, f: F) -> TopologyResult<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> TopologyResult<T>,
    {
        let _commit = self.commit.lock();
        let mut draft = TopologyGraph::clone(&self.graph.read());

        let mut txn = Transaction {
            graph: &mut draft,
            events: Vec::new(),
            collapsed: Vec::new(),
            now: self.clock.now_utc(),
        };
        let value = f(&mut txn)?;
        let events = std::mem::take(&mut txn.events);

        *self.graph.write() = Arc::new(draft);
        self.notifier.publish(events);
        Ok(value)
    }

    /// Resolve a candidate to a host, creating it if unseen
    pub fn upsert_host(
        &self,
        candidate: &NeighborCandidate,
        source: Option<HostId>,
    ) -> TopologyResult<(HostId, bool)> {
        self.transaction(|txn| txn.upsert_host(candidate, source))
    }

    /// Add a seed address
    pub fn seed(&self, address: HostAddress) -> TopologyResult<(HostId, bool)> {
        self.transaction(|txn| txn.seed(address))
    }

    /// Record that `observer` saw `observed` as a direct neighbor
    pub fn record_edge(
        &self,
        observer: HostId,
        observed: HostId,
        link: LinkInfo,
    ) -> TopologyResult<bool> {
        self.transaction(|txn| txn.record_edge(observer, observed, link))
    }

    /// Mark a host unreachable after `attempts` failed probes
    pub fn mark_unreachable(&self, id: HostId, attempts: u32) -> TopologyResult<bool> {
        self.transaction(|txn| txn.mark_unreachable(id, attempts))
    }

    /// Mark a host stale after a failed probe
    pub fn mark_stale(&self, id: HostId) -> TopologyResult<bool> {
        self.transaction(|txn| txn.mark_stale(id))
    }

    /// Mark a host active after a successful probe
    pub fn mark_active(&self, id: HostId) -> TopologyResult<bool> {
        self.transaction(|txn| txn.mark_active(id))
    }

    /// Add an infrastructure address that must never become a host
    pub fn ignore_address(&self, address: HostAddress) {
        let _commit = self.commit.lock();
        let mut graph = self.graph.write();
        Arc::make_mut(&mut graph).ignored.insert(address);
    }

    /// Follow merge aliases to the live host
    pub fn resolve(&self, id: HostId) -> Option<HostId> {
        self.graph.read().resolve(id)
    }

    /// Get a copy of a live host
    pub fn host(&self, id: HostId) -> Option<Host> {
        let graph = self.graph.read();
        graph.resolve(id).and_then(|id| graph.host(id).cloned())
    }

    /// Number of live hosts
    pub fn host_count(&self) -> usize {
        self.graph.read().host_count()
    }
}

/// A draft of the graph being modified inside [`TopologyStore::transaction`]
pub struct Transaction<'a> {
    graph: &'a mut TopologyGraph,
    events: Vec<DiscoveryEvent>,
    collapsed: Vec<(HostId, HostId)>,
    now: DateTime<Utc>,
}

impl Transaction<'_> {
    /// Timestamp applied to everything this transaction touches
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Read access to the draft
    pub fn graph(&self) -> &TopologyGraph {
        self.graph
    }

    /// Hosts absorbed so far, as (absorbed, canonical)
    pub fn collapsed(&self) -> &[(HostId, HostId)] {
        &self.collapsed
    }

    /// Follow merge aliases to the live host
    pub fn resolve(&self, id: HostId) -> Option<HostId> {
        self.graph.resolve(id)
    }

    /// Get a live host from the draft
    pub fn host(&self, id: HostId) -> Option<&Host> {
        self.graph.host(id)
    }

    /// Resolve a candidate to a host, creating it if unseen
    ///
    /// A candidate matches a host when any of its specified addresses or
    /// its device id is already known. Matching is idempotent: the same
    /// candidate always yields the same id. When the candidate matches
    /// more than one host they are collapsed into the one seen first.
    pub fn upsert_host(
        &mut self,
        candidate: &NeighborCandidate,
        source: Option<HostId>,
    ) -> TopologyResult<(HostId, bool)> {
        let addresses: BTreeSet<HostAddress> = candidate
            .addresses
            .iter()
            .filter(|a| !a.is_unspecified() && !self.graph.is_ignored(a))
            .copied()
            .collect();
        let device_id = candidate.device_id.clone().filter(|d| !d.is_empty());

        let mut keys: Vec<IdentityKey> =
            addresses.iter().map(|a| IdentityKey::Address(*a)).collect();
        if let Some(device) = &device_id {
            keys.push(IdentityKey::Device(device.clone()));
        }
        if keys.is_empty() {
            return Err(TopologyError::InvalidCandidate(
                "no usable address or device id".to_string(),
            ));
        }

        let matches = self.graph.matching_hosts(&keys);
        let (id, is_new) = match matches.len() {
            0 => {
                let id = self.graph.allocate_id();
                let source = source.and_then(|s| self.graph.resolve(s));
                let mut host = Host::new(id, self.now);
                host.source = source;
                self.graph.hosts.insert(id, host);

                let address = addresses.iter().next().copied();
                info!(host = %id, address = ?address, source = ?source, "Discovered host");
                self.events.push(DiscoveryEvent::host_discovered(
                    id, address, source, self.now,
                ));
                (id, true)
            }
            1 => {
                let id = *matches.iter().next().ok_or_else(|| {
                    TopologyError::StoreCorruption("identity match vanished".to_string())
                })?;
                (id, false)
            }
            _ => (self.collapse(&matches)?, false),
        };

        let host = self.graph.host_mut(id)?;
        host.addresses.extend(addresses.iter().copied());
        host.last_seen = self.now;
        if host.device_id.is_none() {
            host.device_id = device_id;
        }
        for key in keys {
            self.graph.index.insert(key, id);
        }

        Ok((id, is_new))
    }

    /// Add a seed address
    pub fn seed(&mut self, address: HostAddress) -> TopologyResult<(HostId, bool)> {
        self.upsert_host(&NeighborCandidate::new(address), None)
    }

    /// Record that `observer` saw `observed` as a direct neighbor
    ///
    /// Returns `true` when the edge is new or was stale and has been
    /// re-activated; those two cases emit `EdgeObserved`.
    pub fn record_edge(
        &mut self,
        observer: HostId,
        observed: HostId,
        link: LinkInfo,
    ) -> TopologyResult<bool> {
        for endpoint in [observer, observed] {
            if self.graph.host(endpoint).is_none() {
                return Err(TopologyError::StoreCorruption(format!(
                    "edge {} -> {} references missing {}",
                    observer, observed, endpoint
                )));
            }
        }

        let now = self.now;
        let interface = link.interface.clone();
        let observed_now = match self.graph.edges.get_mut(&(observer, observed)) {
            Some(edge) => {
                let reactivated = edge.state == EdgeState::Stale;
                edge.state = EdgeState::Active;
                edge.last_seen = now;
                edge.link = link;
                reactivated
            }
            None => {
                self.graph
                    .edges
                    .insert((observer, observed), Edge::new(observer, observed, link, now));
                true
            }
        };

        self.graph.host_mut(observed)?.attachment = Some(Attachment {
            observer,
            interface: interface.clone(),
        });

        if observed_now {
            debug!(%observer, %observed, interface = ?interface, "Edge observed");
            self.events.push(DiscoveryEvent::edge_observed(
                observer, observed, interface, now,
            ));
        }
        Ok(observed_now)
    }

    /// Mark active outgoing edges of `observer` not in `keep` as stale
    ///
    /// Returns the observed ends of the superseded edges.
    pub fn supersede_edges(
        &mut self,
        observer: HostId,
        keep: &BTreeSet<HostId>,
    ) -> TopologyResult<Vec<HostId>> {
        if self.graph.host(observer).is_none() {
            return Err(TopologyError::UnknownHost(observer));
        }

        let stale: Vec<HostId> = self
            .graph
            .outgoing(observer)
            .filter(|edge| edge.is_active() && !keep.contains(&edge.observed))
            .map(|edge| edge.observed)
            .collect();

        for observed in &stale {
            if let Some(edge) = self.graph.edges.get_mut(&(observer, *observed)) {
                edge.state = EdgeState::Stale;
            }
            debug!(%observer, observed = %observed, "Edge superseded");
            self.events
                .push(DiscoveryEvent::edge_stale(observer, *observed, self.now));
        }
        Ok(stale)
    }

    /// Mark a host unreachable after `attempts` failed probes
    ///
    /// Its outgoing edges are superseded, since nothing vouches for them any
    /// more. Returns `false` if the host was already unreachable.
    pub fn mark_unreachable(&mut self, id: HostId, attempts: u32) -> TopologyResult<bool> {
        let id = self.resolve(id).ok_or(TopologyError::UnknownHost(id))?;
        let host = self.graph.host_mut(id)?;
        if host.liveness == Liveness::Unreachable {
            return Ok(false);
        }
        host.liveness = Liveness::Unreachable;

        info!(host = %id, attempts, "Host unreachable");
        self.events
            .push(DiscoveryEvent::host_unreachable(id, attempts, self.now));
        self.supersede_edges(id, &BTreeSet::new())?;
        Ok(true)
    }

    /// Mark a host stale after a failed probe
    ///
    /// Only active hosts become stale. No event is emitted.
    pub fn mark_stale(&mut self, id: HostId) -> TopologyResult<bool> {
        let id = self.resolve(id).ok_or(TopologyError::UnknownHost(id))?;
        let host = self.graph.host_mut(id)?;
        if host.liveness != Liveness::Active {
            return Ok(false);
        }
        host.liveness = Liveness::Stale;
        Ok(true)
    }

    /// Mark a host active after a successful probe
    ///
    /// Emits `HostRecovered` when the host was stale or unreachable.
    pub fn mark_active(&mut self, id: HostId) -> TopologyResult<bool> {
        let id = self.resolve(id).ok_or(TopologyError::UnknownHost(id))?;
        let now = self.now;
        let host = self.graph.host_mut(id)?;
        host.last_seen = now;
        if host.liveness == Liveness::Active {
            return Ok(false);
        }

        let previous = host.liveness;
        host.liveness = Liveness::Active;
        info!(host = %id, %previous, "Host recovered");
        self.events.push(DiscoveryEvent::host_recovered(id, now));
        Ok(true)
    }

    /// Collapse several hosts that turned out to be one device
    ///
    /// The host seen first is canonical. Returns its id.
    fn collapse(&mut self, hosts: &BTreeSet<HostId>) -> TopologyResult<HostId> {
        let canonical = hosts
            .iter()
            .filter_map(|id| self.graph.host(*id))
            .reduce(|best, host| if host.predates(best) { host } else { best })
            .map(|host| host.id)
            .ok_or_else(|| {
                TopologyError::StoreCorruption("collapse over missing hosts".to_string())
            })?;

        let conflict = TopologyError::MergeConflict {
            canonical,
            hosts: hosts.iter().copied().collect(),
        };
        warn!(error = %conflict, "Split-brain collapse");

        for absorbed in hosts.iter().copied().filter(|id| *id != canonical) {
            self.absorb(canonical, absorbed)?;
        }
        Ok(canonical)
    }

    /// Fold `absorbed` into `canonical` and leave an alias behind
    fn absorb(&mut self, canonical: HostId, absorbed: HostId) -> TopologyResult<()> {
        let gone = self
            .graph
            .hosts
            .remove(&absorbed)
            .ok_or(TopologyError::UnknownHost(absorbed))?;

        // The index may hold keys the host never recorded, such as a second
        // device id reported after its first.
        for target in self.graph.index.values_mut() {
            if *target == absorbed {
                *target = canonical;
            }
        }

        let host = self.graph.host_mut(canonical)?;
        host.addresses.extend(gone.addresses.iter().copied());
        host.first_seen = host.first_seen.min(gone.first_seen);
        host.last_seen = host.last_seen.max(gone.last_seen);
        if host.device_id.is_none() {
            host.device_id = gone.device_id.clone();
        }
        if gone.liveness == Liveness::Active {
            host.liveness = Liveness::Active;
        }
        if host.attachment.is_none() {
            host.attachment = gone.attachment.clone();
        }

        self.repoint_edges(canonical, absorbed);

        for other in self.graph.hosts.values_mut() {
            if other.source == Some(absorbed) {
                other.source = Some(canonical);
            }
            if let Some(attachment) = other.attachment.as_mut() {
                if attachment.observer == absorbed {
                    attachment.observer = canonical;
                }
            }
        }

        for target in self.graph.aliases.values_mut() {
            if *target == absorbed {
                *target = canonical;
            }
        }
        self.graph.aliases.insert(absorbed, canonical);

        self.collapsed.push((absorbed, canonical));
        self.events
            .push(DiscoveryEvent::hosts_merged(canonical, absorbed, self.now));
        Ok(())
    }

    /// Move every edge touching `absorbed` onto `canonical`
    ///
    /// Edges that collide with an existing edge are folded into it; edges
    /// that would become self-loops are dropped.
    fn repoint_edges(&mut self, canonical: HostId, absorbed: HostId) {
        let touching: Vec<(HostId, HostId)> = self
            .graph
            .edges
            .keys()
            .filter(|(o, d)| *o == absorbed || *d == absorbed)
            .copied()
            .collect();

        for key in touching {
            let Some(mut edge) = self.graph.edges.remove(&key) else {
                continue;
            };
            if edge.observer == absorbed {
                edge.observer = canonical;
            }
            if edge.observed == absorbed {
                edge.observed = canonical;
            }
            if edge.observer == edge.observed {
                continue;
            }

            let new_key = (edge.observer, edge.observed);
            match self.graph.edges.get_mut(&new_key) {
                Some(existing) => fold_edge(existing, edge),
                None => {
                    self.graph.edges.insert(new_key, edge);
                }
            }
        }
    }
}

/// Fold a duplicate edge into `existing`
fn fold_edge(existing: &mut Edge, other: Edge) {
    existing.first_seen = existing.first_seen.min(other.first_seen);
    if other.last_seen > existing.last_seen {
        existing.last_seen = other.last_seen;
        existing.link = other.link;
    }
    if other.state == EdgeState::Active {
        existing.state = EdgeState::Active;
    }
}
