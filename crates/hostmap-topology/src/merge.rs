//! Merge engine
//!
//! Turns one probe result (an observer and the neighbors it reported)
//! into store operations, applied as a single transaction, and works out
//! which hosts have become eligible for probing of their own.

use std::collections::BTreeSet;
use std::sync::Arc;

use hostmap_core::{HostId, Liveness, NeighborCandidate};
use tracing::{debug, instrument};

use crate::error::{TopologyError, TopologyResult};
use crate::store::{TopologyStore, Transaction};

/// What one merge changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The observer as it resolved after the merge
    pub observer: HostId,
    /// Hosts created by this merge
    pub discovered: Vec<HostId>,
    /// Hosts that should enter the frontier: new ones plus known hosts
    /// that were unreachable and have been seen again
    pub promoted: Vec<HostId>,
    /// Edges recorded or refreshed
    pub edges_recorded: usize,
    /// Observed ends of edges the observer stopped reporting
    pub edges_superseded: Vec<HostId>,
    /// Split-brain collapses as (absorbed, canonical)
    pub collapsed: Vec<(HostId, HostId)>,
    /// Candidates dropped because all their addresses are ignored
    pub ignored: usize,
}

/// Reconciles probe results into the topology store
#[derive(Clone)]
pub struct MergeEngine {
    store: Arc<TopologyStore>,
}

impl MergeEngine {
    /// Create a merge engine over a store
    pub fn new(store: Arc<TopologyStore>) -> Self {
        Self { store }
    }

    /// The store this engine writes to
    pub fn store(&self) -> &Arc<TopologyStore> {
        &self.store
    }

    /// Merge the neighbors `observer` reported
    ///
    /// Either every change lands or none does. The observer is marked
    /// active, and any of its edges missing from `candidates` are marked
    /// stale.
    ///
    /// # Errors
    ///
    /// [`TopologyError::UnknownHost`] if the observer is gone,
    /// [`TopologyError::StoreCorruption`] if a graph invariant breaks.
    #[instrument(skip(self, candidates), fields(candidates = candidates.len()))]
    pub fn apply(
        &self,
        observer: HostId,
        candidates: &[NeighborCandidate],
    ) -> TopologyResult<MergeOutcome> {
        self.store.transaction(|txn| {
            let mut observer = txn
                .resolve(observer)
                .ok_or(TopologyError::UnknownHost(observer))?;

            let mut outcome = MergeOutcome::default();
            let mut reported = BTreeSet::new();
            let mut promoted = BTreeSet::new();

            for candidate in candidates {
                if txn.graph().ignores_candidate(candidate) {
                    debug!(addresses = ?candidate.addresses, "Skipping infrastructure address");
                    outcome.ignored += 1;
                    continue;
                }

                let (id, is_new) = txn.upsert_host(candidate, Some(observer))?;

                // The observer may itself have been absorbed by a collapse.
                observer = txn
                    .resolve(observer)
                    .ok_or(TopologyError::UnknownHost(observer))?;
                if id == observer {
                    debug!(%observer, "Observer reported its own address");
                    continue;
                }

                txn.record_edge(observer, id, candidate.link.clone())?;
                outcome.edges_recorded += 1;
                reported.insert(id);

                if is_new {
                    outcome.discovered.push(id);
                    promoted.insert(id);
                } else if txn
                    .host(id)
                    .is_some_and(|host| host.liveness == Liveness::Unreachable)
                {
                    promoted.insert(id);
                }
            }

            let reported = resolve_all(txn, reported, observer);
            let promoted = resolve_all(txn, promoted, observer);

            outcome.edges_superseded = txn.supersede_edges(observer, &reported)?;
            txn.mark_active(observer)?;

            outcome.observer = observer;
            outcome.discovered = resolve_all(txn, std::mem::take(&mut outcome.discovered), observer)
                .into_iter()
                .collect();
            outcome.promoted = promoted.into_iter().collect();
            outcome.collapsed = txn.collapsed().to_vec();
            Ok(outcome)
        })
    }
}

/// Map ids through aliases, dropping the observer and duplicates
fn resolve_all(
    txn: &Transaction<'_>,
    ids: impl IntoIterator<Item = HostId>,
    observer: HostId,
) -> BTreeSet<HostId> {
    ids.into_iter()
        .filter_map(|id| txn.resolve(id))
        .filter(|id| *id != observer)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostmap_core::{DiscoveryEvent, HostAddress, LinkInfo};

    fn addr(s: &str) -> HostAddress {
        s.parse().unwrap()
    }

    fn setup() -> (Arc<TopologyStore>, MergeEngine) {
        let store = Arc::new(TopologyStore::new());
        let engine = MergeEngine::new(store.clone());
        (store, engine)
    }

    #[test]
    fn test_apply_discovers_and_records_edges() {
        let (store, engine) = setup();
        let (a, _) = store.seed(addr("10.0.0.1")).unwrap();

        let outcome = engine
            .apply(
                a,
                &[
                    NeighborCandidate::new(addr("10.0.0.2"))
                        .with_link(LinkInfo::on_interface("eth0")),
                    NeighborCandidate::new(addr("10.0.0.3")),
                ],
            )
            .unwrap();

        assert_eq!(outcome.observer, a);
        assert_eq!(outcome.discovered.len(), 2);
        assert_eq!(outcome.promoted, outcome.discovered);
        assert_eq!(outcome.edges_recorded, 2);
        assert!(outcome.edges_superseded.is_empty());

        let snapshot = store.snapshot();
        assert_eq!(snapshot.host_count(), 3);
        assert_eq!(snapshot.neighbors(a).len(), 2);
        let b = snapshot.host_by_address(&addr("10.0.0.2")).unwrap();
        assert_eq!(b.source, Some(a));
    }

    #[test]
    fn test_reapply_is_quiet() {
        let (store, engine) = setup();
        let (a, _) = store.seed(addr("10.0.0.1")).unwrap();
        let candidates = [NeighborCandidate::new(addr("10.0.0.2"))];
        engine.apply(a, &candidates).unwrap();

        let mut events = store.subscribe();
        let outcome = engine.apply(a, &candidates).unwrap();

        assert!(outcome.discovered.is_empty());
        assert!(outcome.promoted.is_empty());
        assert_eq!(outcome.edges_recorded, 1);
        assert!(events.drain().is_empty());
        assert_eq!(store.host_count(), 2);
    }

    #[test]
    fn test_missing_neighbor_is_superseded() {
        let (store, engine) = setup();
        let (a, _) = store.seed(addr("10.0.0.1")).unwrap();
        engine
            .apply(
                a,
                &[
                    NeighborCandidate::new(addr("10.0.0.2")),
                    NeighborCandidate::new(addr("10.0.0.3")),
                ],
            )
            .unwrap();
        let c = store.snapshot().host_by_address(&addr("10.0.0.3")).unwrap().id;

        let mut events = store.subscribe();
        let outcome = engine
            .apply(a, &[NeighborCandidate::new(addr("10.0.0.2"))])
            .unwrap();
        assert_eq!(outcome.edges_superseded, vec![c]);

        let events = events.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].event,
            DiscoveryEvent::edge_stale(a, c, events[0].event.timestamp())
        );
        // History is kept
        assert_eq!(store.snapshot().edge_count(), 2);
    }

    #[test]
    fn test_self_report_records_no_loop() {
        let (store, engine) = setup();
        let (a, _) = store.seed(addr("10.0.0.1")).unwrap();

        let outcome = engine
            .apply(
                a,
                &[NeighborCandidate::new(addr("10.0.0.1")).and_address(addr("192.168.0.1"))],
            )
            .unwrap();

        assert_eq!(outcome.edges_recorded, 0);
        assert_eq!(store.snapshot().edge_count(), 0);
        assert!(store.host(a).unwrap().has_address(&addr("192.168.0.1")));
    }

    #[test]
    fn test_unreachable_host_is_promoted_again() {
        let (store, engine) = setup();
        let (a, _) = store.seed(addr("10.0.0.1")).unwrap();
        let (b, _) = store.seed(addr("10.0.0.2")).unwrap();
        store.mark_unreachable(b, 3).unwrap();

        let outcome = engine
            .apply(a, &[NeighborCandidate::new(addr("10.0.0.2"))])
            .unwrap();
        assert!(outcome.discovered.is_empty());
        assert_eq!(outcome.promoted, vec![b]);
    }

    #[test]
    fn test_ignored_candidates_are_skipped() {
        let (store, engine) = setup();
        let (a, _) = store.seed(addr("10.0.0.1")).unwrap();
        store.ignore_address(addr("02:00:00:00:00:ff"));

        let outcome = engine
            .apply(a, &[NeighborCandidate::new(addr("02:00:00:00:00:ff"))])
            .unwrap();
        assert_eq!(outcome.ignored, 1);
        assert_eq!(store.host_count(), 1);
    }

    #[test]
    fn test_unknown_observer() {
        let (_store, engine) = setup();
        let result = engine.apply(HostId(9), &[NeighborCandidate::new(addr("10.0.0.2"))]);
        assert_eq!(result, Err(TopologyError::UnknownHost(HostId(9))));
    }

    #[test]
    fn test_malformed_candidate_discards_whole_result() {
        let (store, engine) = setup();
        let (a, _) = store.seed(addr("10.0.0.1")).unwrap();

        let result = engine.apply(
            a,
            &[
                NeighborCandidate::new(addr("10.0.0.2")),
                NeighborCandidate::default(),
            ],
        );
        assert!(matches!(result, Err(TopologyError::InvalidCandidate(_))));
        assert_eq!(store.host_count(), 1);
    }

    #[test]
    fn test_observer_absorbed_mid_merge() {
        let (store, engine) = setup();
        let (x, _) = store.seed(addr("10.0.0.1")).unwrap();
        let (a, _) = store.seed(addr("10.0.0.9")).unwrap();

        // The observer reports a device that owns both its own address and x's.
        let outcome = engine
            .apply(
                a,
                &[
                    NeighborCandidate::new(addr("10.0.0.9")).and_address(addr("10.0.0.1")),
                    NeighborCandidate::new(addr("10.0.0.5")),
                ],
            )
            .unwrap();

        assert_eq!(outcome.observer, x);
        assert_eq!(outcome.collapsed, vec![(a, x)]);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.host_count(), 2);
        assert_eq!(snapshot.neighbors(x).len(), 1);
        assert!(snapshot.verify().is_ok());
    }
}
