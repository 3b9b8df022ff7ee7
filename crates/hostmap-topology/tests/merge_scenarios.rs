//! Merge scenarios for hostmap-topology
//!
//! These tests drive the merge engine the way the scheduler does and check
//! the resulting graph and event stream.

use std::sync::Arc;
use std::thread;

use chrono::Duration;
use hostmap_core::{
    DiscoveryEvent, HostAddress, HostId, LinkInfo, ManualClock, NeighborCandidate,
};
use hostmap_topology::{MergeEngine, TopologyStore};

fn addr(s: &str) -> HostAddress {
    s.parse().unwrap()
}

fn kinds(events: &[hostmap_core::SequencedEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.event.kind()).collect()
}

#[test]
fn test_duplicate_observations_keep_host_count() {
    let store = Arc::new(TopologyStore::new());
    let merge = MergeEngine::new(store.clone());
    let (a, _) = store.seed(addr("10.0.0.1")).unwrap();
    let (b, _) = store.seed(addr("10.0.0.2")).unwrap();

    let d = NeighborCandidate::new(addr("10.0.0.4")).with_device_id("d");
    merge.apply(a, &[d.clone()]).unwrap();
    let once = store.host_count();

    merge.apply(a, &[d.clone()]).unwrap();
    merge.apply(b, &[d]).unwrap();
    assert_eq!(store.host_count(), once);
}

#[test]
fn test_diamond_discovers_shared_neighbor_once() {
    let store = Arc::new(TopologyStore::new());
    let merge = MergeEngine::new(store.clone());
    let mut events = store.subscribe();

    let (a, _) = store.seed(addr("10.0.0.1")).unwrap();
    let outcome = merge
        .apply(
            a,
            &[
                NeighborCandidate::new(addr("10.0.0.2")),
                NeighborCandidate::new(addr("10.0.0.3")),
            ],
        )
        .unwrap();
    let (b, c) = (outcome.discovered[0], outcome.discovered[1]);

    let from_b = merge
        .apply(b, &[NeighborCandidate::new(addr("10.0.0.4"))])
        .unwrap();
    let from_c = merge
        .apply(c, &[NeighborCandidate::new(addr("10.0.0.4"))])
        .unwrap();
    assert_eq!(from_b.promoted.len(), 1);
    assert!(from_c.promoted.is_empty());
    let d = from_b.promoted[0];

    let snapshot = store.snapshot();
    assert_eq!(snapshot.host_count(), 4);
    let edges: Vec<(HostId, HostId)> = snapshot
        .edges()
        .map(|e| (e.observer, e.observed))
        .collect();
    assert_eq!(edges, vec![(a, b), (a, c), (b, d), (c, d)]);

    let events = events.drain();
    let discovered = events
        .iter()
        .filter(|e| e.event.kind() == "host_discovered")
        .count();
    assert_eq!(discovered, 4);
}

#[test]
fn test_split_brain_collapse_emits_one_merge_event() {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(TopologyStore::with_clock(clock.clone()));
    let merge = MergeEngine::new(store.clone());

    // Two independent seeds that later turn out to be the same router.
    let (first, _) = store.seed(addr("10.1.0.1")).unwrap();
    clock.advance(Duration::seconds(5));
    let (second, _) = store.seed(addr("10.2.0.1")).unwrap();
    let (observer, _) = store.seed(addr("10.9.0.1")).unwrap();

    merge
        .apply(observer, &[NeighborCandidate::new(addr("10.2.0.1"))])
        .unwrap();
    merge
        .apply(second, &[NeighborCandidate::new(addr("10.9.0.1"))])
        .unwrap();

    let mut events = store.subscribe();
    clock.advance(Duration::seconds(5));
    let both = NeighborCandidate::new(addr("10.1.0.1"))
        .and_address(addr("10.2.0.1"))
        .with_device_id("core-router");
    let outcome = merge.apply(observer, &[both.clone()]).unwrap();
    assert_eq!(outcome.collapsed, vec![(second, first)]);

    // Reporting the same device again is a no-op.
    merge.apply(observer, &[both]).unwrap();

    let events = events.drain();
    let merged: Vec<&DiscoveryEvent> = events
        .iter()
        .map(|e| &e.event)
        .filter(|e| e.kind() == "hosts_merged")
        .collect();
    assert_eq!(merged.len(), 1);
    assert!(matches!(
        merged[0],
        DiscoveryEvent::HostsMerged { canonical, absorbed, .. }
            if *canonical == first && *absorbed == second
    ));

    let snapshot = store.snapshot();
    assert_eq!(snapshot.host_count(), 2);
    assert!(snapshot.verify().is_ok());
    assert_eq!(snapshot.resolve(second), Some(first));
    assert!(snapshot.edge(observer, first).is_some_and(|e| e.is_active()));
    assert!(snapshot.edge(first, observer).is_some());
    assert!(snapshot.edges().all(|e| e.observer != second && e.observed != second));

    let canonical = snapshot.host(first).unwrap();
    assert_eq!(canonical.addresses.len(), 2);
    assert_eq!(canonical.device_id.as_deref(), Some("core-router"));
}

#[test]
fn test_events_follow_commit_order() {
    let store = Arc::new(TopologyStore::new());
    let merge = MergeEngine::new(store.clone());
    let mut events = store.subscribe();

    let (a, _) = store.seed(addr("10.0.0.1")).unwrap();
    merge
        .apply(
            a,
            &[NeighborCandidate::new(addr("10.0.0.2")).with_link(LinkInfo::on_interface("p1"))],
        )
        .unwrap();
    store.mark_unreachable(a, 3).unwrap();

    let events = events.drain();
    assert_eq!(
        kinds(&events),
        vec![
            "host_discovered",
            "host_discovered",
            "edge_observed",
            "host_unreachable",
            "edge_stale"
        ]
    );
    let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, (1..=5).collect::<Vec<_>>());
}

#[test]
fn test_concurrent_merges_stay_consistent() {
    const OBSERVERS: u8 = 8;

    let store = Arc::new(TopologyStore::new());
    let merge = MergeEngine::new(store.clone());
    let mut events = store.subscribe();

    let observers: Vec<HostId> = (0..OBSERVERS)
        .map(|i| store.seed(addr(&format!("10.0.0.{}", i + 1))).unwrap().0)
        .collect();

    // Every observer reports the same shared switch plus a private leaf.
    let handles: Vec<_> = observers
        .iter()
        .enumerate()
        .map(|(i, observer)| {
            let merge = merge.clone();
            let observer = *observer;
            thread::spawn(move || {
                let candidates = [
                    NeighborCandidate::new(addr("10.255.0.1")).with_device_id("switch"),
                    NeighborCandidate::new(addr(&format!("10.1.0.{}", i + 1))),
                ];
                merge.apply(observer, &candidates).unwrap()
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = store.snapshot();
    assert_eq!(snapshot.host_count(), OBSERVERS as usize * 2 + 1);
    assert_eq!(snapshot.edge_count(), OBSERVERS as usize * 2);
    assert!(snapshot.verify().is_ok());

    let events = events.drain();
    let switch_discoveries = events
        .iter()
        .filter(|e| {
            matches!(&e.event, DiscoveryEvent::HostDiscovered { address: Some(a), .. }
                if *a == addr("10.255.0.1"))
        })
        .count();
    assert_eq!(switch_discoveries, 1);
    assert!(events.windows(2).all(|w| w[0].sequence + 1 == w[1].sequence));
}
