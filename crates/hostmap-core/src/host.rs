//! Hosts, neighbor candidates and adjacency edges

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::address::HostAddress;
use crate::error::ProbeError;

/// Canonical identifier of a host
///
/// Allocated by the topology store in creation order, so comparing two ids
/// also compares when the hosts were first created.
#[derive(
    Debug,
    Display,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
)]
#[display("host#{_0}")]
pub struct HostId(pub u64);

impl HostId {
    /// Create a host id from its raw value
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Liveness of a host as last determined by probing
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    /// Seen recently, either directly or as a neighbor
    #[default]
    #[display("active")]
    Active,
    /// Last probe failed, retries pending
    #[display("stale")]
    Stale,
    /// Probing gave up after the maximum number of attempts
    #[display("unreachable")]
    Unreachable,
}

/// Metadata about the link an observer saw a neighbor on
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LinkInfo {
    /// Local interface (port) name on the observer
    pub interface: Option<String>,
    /// Link weight or cost, if the protocol reports one
    pub weight: Option<u32>,
}

impl LinkInfo {
    /// Link info naming only the observer's interface
    pub fn on_interface(interface: impl Into<String>) -> Self {
        Self {
            interface: Some(interface.into()),
            weight: None,
        }
    }

    /// Set the link weight
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = Some(weight);
        self
    }
}

/// Where a host was last seen attached: the observer and the interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Host that reported this one as a neighbor
    pub observer: HostId,
    /// Interface on the observer, if reported
    pub interface: Option<String>,
}

/// A key that identifies a device across observations
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IdentityKey {
    /// One of the host's addresses
    Address(HostAddress),
    /// A protocol-reported device identifier
    Device(String),
}

/// A discovered network endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Canonical identifier
    pub id: HostId,
    /// Protocol-reported device identifier, if any observer supplied one
    pub device_id: Option<String>,
    /// Every address this host has been seen with (never shrinks)
    pub addresses: BTreeSet<HostAddress>,
    /// When the host was first observed
    pub first_seen: DateTime<Utc>,
    /// When the host was most recently observed
    pub last_seen: DateTime<Utc>,
    /// The observer that first reported this host (`None` for seeds)
    pub source: Option<HostId>,
    /// Current liveness
    pub liveness: Liveness,
    /// Most recent attachment point
    pub attachment: Option<Attachment>,
}

impl Host {
    /// Create a host observed for the first time at `now`
    pub fn new(id: HostId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            device_id: None,
            addresses: BTreeSet::new(),
            first_seen: now,
            last_seen: now,
            source: None,
            liveness: Liveness::Active,
            attachment: None,
        }
    }

    /// The address probes should be sent to
    ///
    /// Network-layer addresses sort first, so this prefers an IP address and
    /// falls back to a hardware address.
    pub fn probe_address(&self) -> Option<HostAddress> {
        self.addresses
            .iter()
            .find(|a| !a.is_unspecified())
            .copied()
    }

    /// Check whether the host owns an address
    pub fn has_address(&self, address: &HostAddress) -> bool {
        self.addresses.contains(address)
    }

    /// All identity keys of this host
    pub fn identity_keys(&self) -> Vec<IdentityKey> {
        let mut keys: Vec<IdentityKey> = self
            .addresses
            .iter()
            .filter(|a| !a.is_unspecified())
            .map(|a| IdentityKey::Address(*a))
            .collect();
        if let Some(device) = &self.device_id {
            keys.push(IdentityKey::Device(device.clone()));
        }
        keys
    }

    /// Whether this host was created before `other`
    ///
    /// Earlier first-seen time wins; equal times fall back to id order.
    pub fn predates(&self, other: &Host) -> bool {
        (self.first_seen, self.id) < (other.first_seen, other.id)
    }
}

/// A neighbor as reported by one probe
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NeighborCandidate {
    /// Addresses the neighbor presented
    pub addresses: Vec<HostAddress>,
    /// Protocol-reported device identifier
    pub device_id: Option<String>,
    /// Link the neighbor was seen on
    pub link: LinkInfo,
}

impl NeighborCandidate {
    /// A candidate with a single address
    pub fn new(address: HostAddress) -> Self {
        Self {
            addresses: vec![address],
            ..Default::default()
        }
    }

    /// A candidate with several addresses
    pub fn with_addresses(addresses: impl IntoIterator<Item = HostAddress>) -> Self {
        Self {
            addresses: addresses.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Add an address
    pub fn and_address(mut self, address: HostAddress) -> Self {
        self.addresses.push(address);
        self
    }

    /// Set the device identifier
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Set the link metadata
    pub fn with_link(mut self, link: LinkInfo) -> Self {
        self.link = link;
        self
    }

    /// Identity keys carried by this candidate, unspecified addresses excluded
    pub fn identity_keys(&self) -> Vec<IdentityKey> {
        let mut keys: Vec<IdentityKey> = self
            .addresses
            .iter()
            .filter(|a| !a.is_unspecified())
            .map(|a| IdentityKey::Address(*a))
            .collect();
        if let Some(device) = self.device_id.as_ref().filter(|d| !d.is_empty()) {
            keys.push(IdentityKey::Device(device.clone()));
        }
        keys.sort();
        keys.dedup();
        keys
    }

    /// Check that the candidate can be resolved to a host
    pub fn validate(&self) -> Result<(), ProbeError> {
        if self.identity_keys().is_empty() {
            return Err(ProbeError::Malformed(
                "neighbor has no usable address or device id".to_string(),
            ));
        }
        Ok(())
    }
}

/// State of an adjacency edge
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EdgeState {
    /// Reported by the observer's most recent successful probe
    #[default]
    #[display("active")]
    Active,
    /// Superseded: a later probe of the observer no longer reported it
    #[display("stale")]
    Stale,
}

/// A directed "observer saw observed as a direct neighbor" fact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Host whose probe reported the neighbor
    pub observer: HostId,
    /// The reported neighbor
    pub observed: HostId,
    /// When the edge was first recorded
    pub first_seen: DateTime<Utc>,
    /// When the edge was most recently reported
    pub last_seen: DateTime<Utc>,
    /// Link metadata from the most recent report
    pub link: LinkInfo,
    /// Current state
    pub state: EdgeState,
}

impl Edge {
    /// Create an active edge recorded at `now`
    pub fn new(observer: HostId, observed: HostId, link: LinkInfo, now: DateTime<Utc>) -> Self {
        Self {
            observer,
            observed,
            first_seen: now,
            last_seen: now,
            link,
            state: EdgeState::Active,
        }
    }

    /// Check whether the edge is currently reported
    pub fn is_active(&self) -> bool {
        self.state == EdgeState::Active
    }
}
