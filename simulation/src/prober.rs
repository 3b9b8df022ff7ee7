//! A neighbor prober backed by a simulated network
//!
//! Answers probes from a shared [`SimNetwork`] and can be told to misbehave
//! on specific addresses: fail, hang past any deadline, or return an
//! answer that fails validation.

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use hostmap_core::{HostAddress, NeighborCandidate, NeighborProber, ProbeError};
use hostmap_logging::with_host_context;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::network::SimNetwork;

/// A misbehavior injected into the next probes of one address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fault {
    /// Refuse the connection
    Fail,
    /// Never answer
    Hang,
    /// Answer with a neighbor that has no usable identity
    Malformed,
}

/// Simulated prober with fault injection
pub struct SimulatedProber {
    network: Arc<RwLock<SimNetwork>>,
    faults: Mutex<HashMap<HostAddress, VecDeque<Fault>>>,
    latency: Duration,
    calls: AtomicU64,
}

impl SimulatedProber {
    /// Create a prober over its own copy of `network`
    pub fn new(network: SimNetwork) -> Self {
        Self::shared(Arc::new(RwLock::new(network)))
    }

    /// Create a prober over a network that may change while probing
    pub fn shared(network: Arc<RwLock<SimNetwork>>) -> Self {
        Self {
            network,
            faults: Mutex::new(HashMap::new()),
            latency: Duration::ZERO,
            calls: AtomicU64::new(0),
        }
    }

    /// Delay every answer by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// The network being probed
    pub fn network(&self) -> Arc<RwLock<SimNetwork>> {
        self.network.clone()
    }

    /// Make the next `times` probes of `address` misbehave
    pub fn inject(&self, address: HostAddress, fault: Fault, times: usize) {
        self.faults
            .lock()
            .entry(address)
            .or_default()
            .extend(std::iter::repeat_n(fault, times));
    }

    /// Total probes received
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_fault(&self, address: &HostAddress) -> Option<Fault> {
        self.faults.lock().get_mut(address)?.pop_front()
    }

    fn observe(&self, address: &HostAddress) -> Result<Vec<NeighborCandidate>, ProbeError> {
        with_host_context!(address, {
            let _span = tracing::debug_span!("sim_probe").entered();

            let network = self.network.read();
            let Some(device) = network.device_at(address) else {
                return Err(ProbeError::Unreachable(format!("no device at {}", address)));
            };
            if !device.up {
                return Err(ProbeError::Unreachable(format!("{} is down", device.name)));
            }

            let neighbors = network.neighbors_of(&device.name);
            debug!(device = %device.name, neighbors = neighbors.len(), "Answered probe");
            Ok(neighbors)
        })
    }
}

#[async_trait]
impl NeighborProber for SimulatedProber {
    async fn probe(&self, address: &HostAddress) -> Result<Vec<NeighborCandidate>, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match self.next_fault(address) {
            Some(Fault::Fail) => Err(ProbeError::Unreachable(format!(
                "connection to {} refused",
                address
            ))),
            Some(Fault::Hang) => std::future::pending().await,
            Some(Fault::Malformed) => Ok(vec![NeighborCandidate::new(HostAddress::from(
                IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            ))]),
            None => self.observe(address),
        }
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
