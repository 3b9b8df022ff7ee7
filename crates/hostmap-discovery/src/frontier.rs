//! The discovery frontier
//!
//! The set of hosts scheduled for (re)probing, ordered by when each
//! becomes eligible. A host appears at most once: scheduling a host that
//! is already present is a no-op.
//!
//! The heap is lazily invalidated. Rescheduling pushes a fresh heap item
//! and bumps the entry's version; items whose version no longer matches
//! are skipped when they reach the top.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use hostmap_core::HostId;
use tokio::time::Instant;

/// Where a frontier entry is in its probe cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Waiting for its eligible time
    Pending,
    /// A probe is in flight
    Probing,
}

/// One scheduled host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub host: HostId,
    /// Earliest time the next probe may start
    pub due: Instant,
    /// Consecutive failed attempts
    pub attempts: u32,
    pub state: EntryState,
    version: u64,
}

/// Time-ordered scheduling queue with one entry per host
#[derive(Debug, Default)]
pub struct Frontier {
    entries: HashMap<HostId, FrontierEntry>,
    heap: BinaryHeap<Reverse<(Instant, u64, HostId)>>,
    next_version: u64,
}

impl Frontier {
    /// Create an empty frontier
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a host to be probed at `at`
    ///
    /// Returns `false` (and changes nothing) if the host is already present.
    pub fn schedule(&mut self, host: HostId, at: Instant) -> bool {
        if self.entries.contains_key(&host) {
            return false;
        }
        let version = self.bump();
        self.entries.insert(
            host,
            FrontierEntry {
                host,
                due: at,
                attempts: 0,
                state: EntryState::Pending,
                version,
            },
        );
        self.heap.push(Reverse((at, version, host)));
        true
    }

    /// Take the earliest entry due at or before `now` and mark it probing
    pub fn pop_due(&mut self, now: Instant) -> Option<FrontierEntry> {
        loop {
            let Reverse((due, version, host)) = *self.heap.peek()?;
            if !self.is_current(host, version) {
                self.heap.pop();
                continue;
            }
            if due > now {
                return None;
            }
            self.heap.pop();
            let entry = self.entries.get_mut(&host)?;
            entry.state = EntryState::Probing;
            return Some(entry.clone());
        }
    }

    /// When the earliest pending entry becomes due
    pub fn next_due(&mut self) -> Option<Instant> {
        while let Some(Reverse((due, version, host))) = self.heap.peek().copied() {
            if self.is_current(host, version) {
                return Some(due);
            }
            self.heap.pop();
        }
        None
    }

    /// Retire a host whose probe finished and needs no follow-up
    ///
    /// Returns `false` if the host was not being probed.
    pub fn complete(&mut self, host: HostId) -> bool {
        match self.entries.get(&host) {
            Some(entry) if entry.state == EntryState::Probing => {
                self.entries.remove(&host);
                true
            }
            _ => false,
        }
    }

    /// Put a present host back to pending at `at` with `attempts` failures
    ///
    /// Returns `false` if the host is not in the frontier.
    pub fn reschedule(&mut self, host: HostId, at: Instant, attempts: u32) -> bool {
        if !self.entries.contains_key(&host) {
            return false;
        }
        let version = self.bump();
        if let Some(entry) = self.entries.get_mut(&host) {
            entry.due = at;
            entry.attempts = attempts;
            entry.state = EntryState::Pending;
            entry.version = version;
        }
        self.heap.push(Reverse((at, version, host)));
        self.compact();
        true
    }

    /// Drop a host from the frontier
    pub fn remove(&mut self, host: HostId) -> Option<FrontierEntry> {
        self.entries.remove(&host)
    }

    /// Check whether a host is scheduled or being probed
    pub fn contains(&self, host: HostId) -> bool {
        self.entries.contains_key(&host)
    }

    /// State of a host's entry
    pub fn state(&self, host: HostId) -> Option<EntryState> {
        self.entries.get(&host).map(|e| e.state)
    }

    /// Failed attempts recorded for a host
    pub fn attempts(&self, host: HostId) -> Option<u32> {
        self.entries.get(&host).map(|e| e.attempts)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the frontier is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries waiting for their eligible time
    pub fn pending_count(&self) -> usize {
        self.count_in(EntryState::Pending)
    }

    /// Entries with a probe in flight
    pub fn probing_count(&self) -> usize {
        self.count_in(EntryState::Probing)
    }

    /// Hosts in the frontier, sorted
    pub fn host_ids(&self) -> Vec<HostId> {
        let mut ids: Vec<HostId> = self.entries.keys().copied().collect();
        ids.sort();
        ids
    }

    fn count_in(&self, state: EntryState) -> usize {
        self.entries.values().filter(|e| e.state == state).count()
    }

    fn bump(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }

    fn is_current(&self, host: HostId, version: u64) -> bool {
        self.entries
            .get(&host)
            .is_some_and(|e| e.state == EntryState::Pending && e.version == version)
    }

    /// Rebuild the heap once dead items dominate it
    fn compact(&mut self) {
        if self.heap.len() <= self.entries.len() * 2 + 64 {
            return;
        }
        self.heap = self
            .entries
            .values()
            .filter(|e| e.state == EntryState::Pending)
            .map(|e| Reverse((e.due, e.version, e.host)))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_schedule_is_idempotent() {
        let mut frontier = Frontier::new();
        let now = Instant::now();

        assert!(frontier.schedule(HostId(1), now));
        assert!(!frontier.schedule(HostId(1), now + Duration::from_secs(5)));
        assert_eq!(frontier.len(), 1);
        assert_eq!(frontier.next_due(), Some(now));
    }

    #[test]
    fn test_pop_due_in_time_order() {
        let mut frontier = Frontier::new();
        let now = Instant::now();
        frontier.schedule(HostId(1), now + Duration::from_secs(2));
        frontier.schedule(HostId(2), now);
        frontier.schedule(HostId(3), now + Duration::from_secs(10));

        let later = now + Duration::from_secs(3);
        assert_eq!(frontier.pop_due(later).unwrap().host, HostId(2));
        assert_eq!(frontier.pop_due(later).unwrap().host, HostId(1));
        assert!(frontier.pop_due(later).is_none());

        assert_eq!(frontier.probing_count(), 2);
        assert_eq!(frontier.pending_count(), 1);
        assert_eq!(frontier.state(HostId(1)), Some(EntryState::Probing));
    }

    #[test]
    fn test_probing_entry_is_not_popped_again() {
        let mut frontier = Frontier::new();
        let now = Instant::now();
        frontier.schedule(HostId(1), now);

        assert!(frontier.pop_due(now).is_some());
        assert!(frontier.pop_due(now).is_none());
        assert!(!frontier.schedule(HostId(1), now));
        assert_eq!(frontier.next_due(), None);
    }

    #[test]
    fn test_reschedule_replaces_heap_position() {
        let mut frontier = Frontier::new();
        let now = Instant::now();
        frontier.schedule(HostId(1), now);
        frontier.pop_due(now);

        assert!(frontier.reschedule(HostId(1), now + Duration::from_secs(4), 2));
        assert_eq!(frontier.attempts(HostId(1)), Some(2));
        assert_eq!(frontier.state(HostId(1)), Some(EntryState::Pending));
        assert!(frontier.pop_due(now).is_none());
        assert_eq!(frontier.next_due(), Some(now + Duration::from_secs(4)));

        // Moving a pending entry earlier leaves a dead heap item behind
        assert!(frontier.reschedule(HostId(1), now, 2));
        assert_eq!(frontier.pop_due(now).unwrap().attempts, 2);
        assert!(frontier.pop_due(now + Duration::from_secs(5)).is_none());

        assert!(!frontier.reschedule(HostId(9), now, 0));
    }

    #[test]
    fn test_complete_and_remove() {
        let mut frontier = Frontier::new();
        let now = Instant::now();
        frontier.schedule(HostId(1), now);
        frontier.schedule(HostId(2), now);

        assert!(!frontier.complete(HostId(1)));
        let probing = frontier.pop_due(now).unwrap().host;
        assert!(frontier.complete(probing));
        assert!(!frontier.contains(probing));

        let other = frontier.host_ids()[0];
        assert!(frontier.remove(other).is_some());
        assert!(frontier.is_empty());
        assert_eq!(frontier.next_due(), None);
    }

    #[test]
    fn test_host_ids_never_duplicate() {
        let mut frontier = Frontier::new();
        let now = Instant::now();
        for round in 0..200u64 {
            let host = HostId(round % 7);
            frontier.schedule(host, now);
            if let Some(entry) = frontier.pop_due(now) {
                frontier.reschedule(entry.host, now, 0);
            }
        }

        let ids = frontier.host_ids();
        let mut deduped = ids.clone();
        deduped.dedup();
        assert_eq!(ids, deduped);
        assert_eq!(ids.len(), 7);
        assert!(frontier.heap.len() <= frontier.len() * 2 + 64 + 1);
    }
}
