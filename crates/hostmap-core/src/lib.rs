//! # hostmap Core
//!
//! Core traits, types, and errors for hostmap topology discovery.
//!
//! This crate provides the vocabulary shared by the topology store, the
//! merge engine and the discovery scheduler, plus the one seam through
//! which the engine talks to the network: the [`NeighborProber`] trait.
//!
//! ## Key Traits
//!
//! - [`NeighborProber`]: Query one device for its directly connected neighbors
//! - [`Clock`]: Time abstraction for testability
//!
//! ## Key Types
//!
//! - [`HostAddress`]: IP or MAC address a host presents
//! - [`Host`]: A discovered endpoint with its address set and liveness
//! - [`Edge`]: A directed "observer saw observed" adjacency fact
//! - [`NeighborCandidate`]: One neighbor as reported by a probe
//! - [`DiscoveryEvent`]: Changes to the topology graph

pub mod address;
pub mod error;
pub mod event;
pub mod host;
pub mod mock_prober;
pub mod traits;

// Re-export main types
pub use address::*;
pub use error::*;
pub use event::*;
pub use host::*;
pub use mock_prober::*;
pub use traits::*;
