//! # hostmap Topology
//!
//! The in-memory topology graph and everything that writes to it.
//!
//! ## Core Components
//!
//! - [`TopologyStore`]: Hosts and adjacency edges, updated atomically
//! - [`MergeEngine`]: Reconciles probe results into the store
//! - [`ChangeNotifier`]: Delivers committed changes to subscribers in commit order
//! - [`TopologySnapshot`]: Consistent read-only view with JSON export
//!
//! ## Identity Resolution
//!
//! A neighbor reported by a probe matches an existing host when any of its
//! addresses, or its device id, is already known. Matching hosts grow their
//! address sets; nothing is ever removed. When one report matches two
//! different hosts, the two are collapsed into whichever was seen first and
//! the other id is kept as an alias.
//!
//! ## History
//!
//! Edges and hosts are never deleted by probing. An edge its observer no
//! longer reports becomes stale; a host that stops answering becomes
//! unreachable. Both come back when they are observed again.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hostmap_topology::{MergeEngine, TopologyStore};
//!
//! let store = Arc::new(TopologyStore::new());
//! let mut events = store.subscribe();
//!
//! let (seed, _) = store.seed("10.0.0.1".parse()?)?;
//! let outcome = MergeEngine::new(store.clone()).apply(seed, &candidates)?;
//!
//! for id in outcome.promoted {
//!     // schedule a probe of `id`
//! }
//! while let Some(event) = events.try_recv() {
//!     println!("{}: {:?}", event.sequence, event.event);
//! }
//! ```

pub mod error;
pub mod graph;
pub mod merge;
pub mod notifier;
pub mod snapshot;
pub mod store;

pub use error::{TopologyError, TopologyResult};
pub use graph::TopologyGraph;
pub use merge::{MergeEngine, MergeOutcome};
pub use notifier::{ChangeNotifier, EventStream};
pub use snapshot::{AliasRecord, TopologyExport, TopologySnapshot};
pub use store::{TopologyStore, Transaction};
