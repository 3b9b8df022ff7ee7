//! Scripted prober for testing
//!
//! Provides an in-memory [`NeighborProber`] whose answers are set up in
//! advance, so scheduling and merge logic can be tested without touching
//! a real network.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hostmap_core::{MockProber, NeighborCandidate, ProbeError};
//!
//! let prober = MockProber::new();
//! prober.respond(a, vec![NeighborCandidate::new(b), NeighborCandidate::new(c)]);
//! prober.fail_times(b, 2, ProbeError::Unreachable("refused".into()));
//!
//! // ... run discovery ...
//! assert_eq!(prober.calls(&b), 3);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::address::HostAddress;
use crate::error::ProbeError;
use crate::host::NeighborCandidate;
use crate::traits::NeighborProber;

/// One scripted answer
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Report these neighbors
    Neighbors(Vec<NeighborCandidate>),
    /// Fail with this error
    Fail(ProbeError),
    /// Never answer (the caller's deadline fires)
    Hang,
}

/// Scripted behavior for one address
#[derive(Debug, Clone)]
struct Script {
    /// Answers consumed in order before falling back to `steady`
    queued: VecDeque<MockResponse>,
    /// Answer once the queue is empty
    steady: MockResponse,
}

impl Script {
    fn steady(response: MockResponse) -> Self {
        Self {
            queued: VecDeque::new(),
            steady: response,
        }
    }

    fn next(&mut self) -> MockResponse {
        self.queued
            .pop_front()
            .unwrap_or_else(|| self.steady.clone())
    }
}

/// A prober with scripted answers
///
/// Addresses without a script answer with an empty neighbor list, which
/// models a leaf device. Call counts and in-flight probes are tracked so
/// tests can assert retry bounds and concurrency limits.
pub struct MockProber {
    scripts: DashMap<HostAddress, Script>,
    calls: DashMap<HostAddress, u32>,
    in_flight_per_address: DashMap<HostAddress, usize>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    max_in_flight_per_address: AtomicUsize,
    latency: Duration,
}

impl Default for MockProber {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProber {
    /// Create a prober with no scripts and no latency
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    /// Create a prober that waits `latency` before every answer
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            scripts: DashMap::new(),
            calls: DashMap::new(),
            in_flight_per_address: DashMap::new(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            max_in_flight_per_address: AtomicUsize::new(0),
            latency,
        }
    }

    /// Always report `neighbors` for `address`
    pub fn respond(&self, address: HostAddress, neighbors: Vec<NeighborCandidate>) {
        self.scripts.insert(
            address,
            Script::steady(MockResponse::Neighbors(neighbors)),
        );
    }

    /// Always fail probes of `address`
    pub fn fail(&self, address: HostAddress, error: ProbeError) {
        self.scripts
            .insert(address, Script::steady(MockResponse::Fail(error)));
    }

    /// Never answer probes of `address`
    pub fn hang(&self, address: HostAddress) {
        self.scripts
            .insert(address, Script::steady(MockResponse::Hang));
    }

    /// Fail the next `times` probes of `address`, then answer as before
    pub fn fail_times(&self, address: HostAddress, times: u32, error: ProbeError) {
        let mut script = self
            .scripts
            .entry(address)
            .or_insert_with(|| Script::steady(MockResponse::Neighbors(Vec::new())));
        for _ in 0..times {
            script.queued.push_back(MockResponse::Fail(error.clone()));
        }
    }

    /// Queue a one-off answer for `address` ahead of its steady answer
    pub fn push_response(&self, address: HostAddress, response: MockResponse) {
        self.scripts
            .entry(address)
            .or_insert_with(|| Script::steady(MockResponse::Neighbors(Vec::new())))
            .queued
            .push_back(response);
    }

    /// Number of probes sent to `address`
    pub fn calls(&self, address: &HostAddress) -> u32 {
        self.calls.get(address).map(|c| *c).unwrap_or(0)
    }

    /// Total number of probes sent
    pub fn total_calls(&self) -> u32 {
        self.calls.iter().map(|entry| *entry.value()).sum()
    }

    /// Highest number of probes that were in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of probes that were in flight at once for a single address
    pub fn max_in_flight_per_address(&self) -> usize {
        self.max_in_flight_per_address.load(Ordering::SeqCst)
    }

    fn enter(&self, address: &HostAddress) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let mut per_address = self.in_flight_per_address.entry(*address).or_insert(0);
        *per_address += 1;
        self.max_in_flight_per_address
            .fetch_max(*per_address, Ordering::SeqCst);
    }

    fn leave(&self, address: &HostAddress) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let Some(mut per_address) = self.in_flight_per_address.get_mut(address) {
            *per_address = per_address.saturating_sub(1);
        }
    }
}

/// Decrements in-flight counters even when the probe future is dropped
struct InFlight<'a> {
    prober: &'a MockProber,
    address: HostAddress,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.prober.leave(&self.address);
    }
}

#[async_trait]
impl NeighborProber for MockProber {
    async fn probe(&self, address: &HostAddress) -> Result<Vec<NeighborCandidate>, ProbeError> {
        *self.calls.entry(*address).or_insert(0) += 1;
        self.enter(address);
        let _guard = InFlight {
            prober: self,
            address: *address,
        };

        // Take the answer before sleeping so the DashMap guard is not held
        // across an await point.
        let response = self
            .scripts
            .get_mut(address)
            .map(|mut script| script.next())
            .unwrap_or(MockResponse::Neighbors(Vec::new()));

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match response {
            MockResponse::Neighbors(neighbors) => Ok(neighbors),
            MockResponse::Fail(error) => Err(error),
            MockResponse::Hang => {
                std::future::pending::<()>().await;
                Err(ProbeError::Unreachable("hung probe resumed".to_string()))
            }
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> HostAddress {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_unscripted_address_is_a_leaf() {
        let prober = MockProber::new();
        let result = prober.probe(&addr("10.0.0.1")).await.unwrap();
        assert!(result.is_empty());
        assert_eq!(prober.calls(&addr("10.0.0.1")), 1);
    }

    #[tokio::test]
    async fn test_respond_and_fail() {
        let prober = MockProber::new();
        let a = addr("10.0.0.1");
        let b = addr("10.0.0.2");

        prober.respond(a, vec![NeighborCandidate::new(b)]);
        prober.fail(b, ProbeError::Unreachable("refused".into()));

        assert_eq!(prober.probe(&a).await.unwrap().len(), 1);
        assert!(matches!(
            prober.probe(&b).await,
            Err(ProbeError::Unreachable(_))
        ));
        assert_eq!(prober.total_calls(), 2);
    }

    #[tokio::test]
    async fn test_fail_times_then_recover() {
        let prober = MockProber::new();
        let a = addr("10.0.0.1");
        let b = addr("10.0.0.2");

        prober.respond(a, vec![NeighborCandidate::new(b)]);
        prober.fail_times(a, 2, ProbeError::Unreachable("flap".into()));

        assert!(prober.probe(&a).await.is_err());
        assert!(prober.probe(&a).await.is_err());
        assert_eq!(prober.probe(&a).await.unwrap().len(), 1);
        assert_eq!(prober.calls(&a), 3);
    }

    #[tokio::test]
    async fn test_hang_is_cut_by_deadline() {
        let prober = MockProber::new();
        let a = addr("10.0.0.1");
        prober.hang(a);

        let result = tokio::time::timeout(Duration::from_millis(20), prober.probe(&a)).await;
        assert!(result.is_err());
        assert_eq!(prober.calls(&a), 1);
        assert_eq!(prober.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_push_response_overrides_once() {
        let prober = MockProber::new();
        let a = addr("10.0.0.1");
        prober.respond(a, vec![]);
        prober.push_response(a, MockResponse::Fail(ProbeError::Malformed("junk".into())));

        assert!(matches!(
            prober.probe(&a).await,
            Err(ProbeError::Malformed(_))
        ));
        assert!(prober.probe(&a).await.is_ok());
    }
}
