//! Core traits for hostmap
//!
//! ## Key Traits
//!
//! - [`NeighborProber`]: queries one device for its directly connected neighbors
//! - [`Clock`]: time abstraction for testability

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::address::HostAddress;
use crate::error::ProbeError;
use crate::host::NeighborCandidate;

/// Capability to query a single device for its neighbors
///
/// Implementations wrap a concrete discovery mechanism (an LLDP/CDP
/// client, an ARP table read, an SNMP walk, a ping sweep). The scheduler
/// and merge engine only ever see this trait, so adapters are
/// interchangeable.
///
/// # Example
///
/// ```rust,ignore
/// use hostmap_core::{HostAddress, NeighborProber};
///
/// async fn neighbors_of<P: NeighborProber>(prober: &P, addr: &HostAddress) {
///     match prober.probe(addr).await {
///         Ok(candidates) => println!("{} neighbors", candidates.len()),
///         Err(e) => println!("probe failed: {}", e),
///     }
/// }
/// ```
#[async_trait]
pub trait NeighborProber: Send + Sync {
    /// Query the device at `address` for its directly observed neighbors
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Unreachable`] when the device cannot be
    /// contacted and [`ProbeError::Malformed`] when its answer cannot be
    /// interpreted. Deadlines are enforced by the caller.
    async fn probe(&self, address: &HostAddress) -> Result<Vec<NeighborCandidate>, ProbeError>;

    /// Name of the mechanism, for logging
    fn name(&self) -> &str {
        "prober"
    }
}

#[async_trait]
impl<P: NeighborProber + ?Sized> NeighborProber for Arc<P> {
    async fn probe(&self, address: &HostAddress) -> Result<Vec<NeighborCandidate>, ProbeError> {
        (**self).probe(address).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[async_trait]
impl<P: NeighborProber + ?Sized> NeighborProber for Box<P> {
    async fn probe(&self, address: &HostAddress) -> Result<Vec<NeighborCandidate>, ProbeError> {
        (**self).probe(address).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Time abstraction for testability
///
/// The topology store stamps hosts and edges with this clock, so tests
/// can control first-seen ordering deterministically.
pub trait Clock: Send + Sync {
    /// Get the current UTC datetime
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Real clock implementation using system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    /// Set the clock to an exact time
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
