//! # hostmap Simulation
//!
//! Simulated networks for exercising hostmap discovery without real devices.
//!
//! ## Architecture
//!
//! - **Network** (`network.rs`): named devices with addresses and directed
//!   links (line, ring, star, full mesh, random, or an edge list)
//! - **Prober** (`prober.rs`): a [`NeighborProber`](hostmap_core::NeighborProber)
//!   answering from a network, with injectable faults and latency
//! - **Scenarios** (`scenarios.rs`): canned networks and a runner that
//!   drives a [`DiscoveryEngine`](hostmap_discovery::DiscoveryEngine)
//!   over them
//!
//! ## Example
//!
//! ```rust,ignore
//! use hostmap_discovery::DiscoveryConfig;
//! use hostmap_simulation::{Scenario, run_scenario};
//!
//! let outcome = run_scenario(&Scenario::abc(), DiscoveryConfig::default(), None).await?;
//! assert_eq!(outcome.snapshot.host_count(), 4);
//! println!("{}", outcome.snapshot.to_json()?);
//! ```

pub mod network;
pub mod prober;
pub mod scenarios;

pub use network::{NetworkBuilder, SimDevice, SimLink, SimNetwork, from_edges};
pub use prober::{Fault, SimulatedProber};
pub use scenarios::{Scenario, ScenarioOutcome, run_scenario};
