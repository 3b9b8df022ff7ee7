//! # hostmap Discovery
//!
//! Discovery scheduling for hostmap.
//!
//! Starting from a set of seed addresses, the scheduler probes hosts for
//! their direct neighbors, merges what they report into the topology store
//! and schedules every newly seen host for probing of its own.
//!
//! ## Core Components
//!
//! - [`DiscoveryEngine`]: Owns the store, the prober and background runs
//! - [`DiscoveryScheduler`]: The frontier loop behind one run
//! - [`Frontier`]: Time-ordered queue with at most one entry per host
//! - [`BackoffPolicy`]: Exponential delay between failed attempts
//! - [`DiscoveryConfig`]: Seeds and tunables
//!
//! ## Per-Host Lifecycle
//!
//! ```text
//! pending -> probing -> succeeded -> pending (after refresh_interval)
//!                                 -> retired (single sweep)
//!                    -> failed    -> pending (after backoff)
//!                                 -> removed, host marked unreachable
//!                                    (after max_attempts)
//! ```
//!
//! A host removed as unreachable re-enters the frontier when another host
//! reports it as a neighbor again.
//!
//! ## Failure Handling
//!
//! Probe failures (timeouts, refused connections, malformed answers) only
//! move their own host through retry and backoff. The run itself stops with
//! an error only when the topology store reports corruption.

pub mod backoff;
pub mod config;
pub mod engine;
pub mod error;
pub mod frontier;
pub mod scheduler;

pub use backoff::BackoffPolicy;
pub use config::DiscoveryConfig;
pub use engine::DiscoveryEngine;
pub use error::{ConfigError, DiscoveryError, DiscoveryResult};
pub use frontier::{EntryState, Frontier, FrontierEntry};
pub use scheduler::{DiscoveryReport, DiscoveryScheduler};
