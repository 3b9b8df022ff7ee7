//! Canned discovery scenarios
//!
//! Each [`Scenario`] bundles a network, the seeds to start from and the
//! faults to inject. [`run_scenario`] plays one through a
//! [`DiscoveryEngine`] backed by a [`SimulatedProber`].

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use hostmap_core::{HostAddress, SequencedEvent};
use hostmap_discovery::{DiscoveryConfig, DiscoveryEngine, DiscoveryReport, DiscoveryResult};
use hostmap_topology::TopologySnapshot;
use tracing::info;

use crate::network::{NetworkBuilder, SimNetwork};
use crate::prober::{Fault, SimulatedProber};

/// A network plus everything needed to discover it
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub network: SimNetwork,
    /// Used when the run's config names no seeds
    pub seeds: Vec<HostAddress>,
    pub faults: Vec<(HostAddress, Fault, usize)>,
    /// Concurrency cap the scenario needs to play out in a fixed order
    pub max_concurrency: Option<usize>,
}

/// What a scenario run produced
#[derive(Debug)]
pub struct ScenarioOutcome {
    pub report: DiscoveryReport,
    /// Every event published during the run, in commit order
    pub events: Vec<SequencedEvent>,
    pub snapshot: TopologySnapshot,
}

impl Scenario {
    fn new(name: &str, network: SimNetwork, seed: &str) -> Self {
        let seeds = network.address_of(seed).into_iter().collect();
        Self {
            name: name.to_string(),
            network,
            seeds,
            faults: Vec::new(),
            max_concurrency: None,
        }
    }

    fn with_fault(mut self, device: &str, fault: Fault, times: usize) -> Self {
        if let Some(address) = self.network.address_of(device) {
            self.faults.push((address, fault, times));
        }
        self
    }

    /// Seed A reports B and C, both of which report D
    ///
    /// ```text
    ///     A
    ///    / \
    ///   B   C
    ///    \ /
    ///     D
    /// ```
    ///
    /// D is discovered once even though two observers report it.
    pub fn abc() -> Self {
        let mut network = SimNetwork::new();
        network.link("A", "B");
        network.link("A", "C");
        network.link("B", "D");
        network.link("C", "D");
        Self::new("abc", network, "A")
    }

    /// A line A - B - C - D - E where C drops its first two probes and E is down
    ///
    /// C recovers on its third attempt; E is marked unreachable once its
    /// attempts run out.
    pub fn flaky() -> Self {
        let mut network = NetworkBuilder::new(5).line();
        network.set_up("E", false);
        Self::new("flaky", network, "A").with_fault("C", Fault::Fail, 2)
    }

    /// A multi-homed device D first seen as two hosts, later collapsed
    ///
    /// B and C each see D under a different address and no device id, so
    /// D is recorded twice. E then reports D under both addresses, which
    /// collapses the two records into one.
    pub fn split_brain() -> Self {
        let mut network = SimNetwork::new();
        network.link("A", "B");
        network.link("A", "C");
        network.link("A", "E");
        let first = HostAddress::from(IpAddr::V4(Ipv4Addr::new(10, 9, 0, 1)));
        let second = HostAddress::from(IpAddr::V4(Ipv4Addr::new(10, 9, 0, 2)));
        network.present_as("B", "D", first);
        network.present_as("C", "D", second);
        network.present_as("E", "D", first);
        network.present_as("E", "D", second);
        network.hide_device_id("D");

        let mut scenario = Self::new("split-brain", network, "A");
        scenario.max_concurrency = Some(1);
        scenario
    }

    /// A random connected network
    pub fn random(devices: usize, connection_probability: f64, seed: u64) -> Self {
        let network = NetworkBuilder::new(devices).random(connection_probability, seed);
        Self::new("random", network, "A")
    }

    /// Fill in seeds and the concurrency cap
    pub fn configure(&self, mut config: DiscoveryConfig) -> DiscoveryConfig {
        if config.seeds.is_empty() {
            config.seeds = self.seeds.clone();
        }
        if let Some(cap) = self.max_concurrency {
            config.max_concurrency = config.max_concurrency.min(cap);
        }
        config
    }

    /// Build the prober for this scenario, faults loaded
    pub fn prober(&self) -> SimulatedProber {
        let prober = SimulatedProber::new(self.network.clone());
        for (address, fault, times) in &self.faults {
            prober.inject(*address, *fault, *times);
        }
        prober
    }
}

/// Run a scenario
///
/// With `run_for` unset the run is a single sweep; otherwise discovery
/// runs continuously for that long and is then stopped.
pub async fn run_scenario(
    scenario: &Scenario,
    config: DiscoveryConfig,
    run_for: Option<Duration>,
) -> DiscoveryResult<ScenarioOutcome> {
    info!(scenario = %scenario.name, devices = scenario.network.device_count(), "Running scenario");

    let engine = DiscoveryEngine::new(scenario.configure(config), scenario.prober())?;
    let mut events = engine.subscribe();

    let report = match run_for {
        None => engine.run_sweep().await?,
        Some(duration) => {
            engine.start()?;
            tokio::time::sleep(duration).await;
            engine.stop().await?
        }
    };

    Ok(ScenarioOutcome {
        report,
        events: events.drain(),
        snapshot: engine.snapshot(),
    })
}
