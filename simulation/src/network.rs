//! Simulated networks
//!
//! Provides functions to create various network shapes:
//! - Line, ring, star and full mesh
//! - Random with a fixed seed
//! - Custom: build from an edge list
//!
//! Devices are named (`"A"`, `"B"`, ...) and get an address in
//! `10.0.0.0/16` in the order they are added. Links are directed: a link
//! from `a` to `b` means `a` reports `b` as a neighbor. [`SimNetwork::connect`]
//! adds both directions.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};

use hostmap_core::{HostAddress, LinkInfo, NeighborCandidate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// One end of a directed link, as seen by the reporting device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimLink {
    /// The reporting device's local interface
    pub interface: String,
    /// Addresses the neighbor presents on this link (its primary if empty)
    pub presented: Vec<HostAddress>,
}

/// A simulated device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimDevice {
    pub name: String,
    /// Addresses this device answers probes on, primary first
    pub addresses: Vec<HostAddress>,
    /// Device id reported by neighbors (chassis id); `None` hides it
    pub device_id: Option<String>,
    /// Whether the device answers probes
    pub up: bool,
    /// Outgoing links keyed by neighbor name
    pub links: BTreeMap<String, SimLink>,
}

impl SimDevice {
    fn new(name: &str, address: HostAddress) -> Self {
        Self {
            name: name.to_string(),
            addresses: vec![address],
            device_id: Some(name.to_string()),
            up: true,
            links: BTreeMap::new(),
        }
    }

    /// The address probes normally reach this device at
    pub fn primary_address(&self) -> HostAddress {
        self.addresses[0]
    }
}

/// A simulated network
#[derive(Debug, Clone, Default)]
pub struct SimNetwork {
    devices: BTreeMap<String, SimDevice>,
    by_address: BTreeMap<HostAddress, String>,
}

impl SimNetwork {
    /// Create an empty network
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device, returning its primary address
    pub fn add_device(&mut self, name: &str) -> HostAddress {
        if let Some(device) = self.devices.get(name) {
            return device.primary_address();
        }
        let address = address_for(self.devices.len());
        self.devices
            .insert(name.to_string(), SimDevice::new(name, address));
        self.by_address.insert(address, name.to_string());
        address
    }

    /// Add a one-way link: `from` reports `to` as a neighbor
    pub fn link(&mut self, from: &str, to: &str) {
        if from == to {
            return; // No self-loops
        }
        self.add_device(from);
        self.add_device(to);

        if let Some(device) = self.devices.get_mut(from) {
            let interface = format!("eth{}", device.links.len());
            device.links.entry(to.to_string()).or_insert(SimLink {
                interface,
                presented: Vec::new(),
            });
        }
    }

    /// Add a link in both directions
    pub fn connect(&mut self, a: &str, b: &str) {
        self.link(a, b);
        self.link(b, a);
    }

    /// Remove the link from `from` to `to`
    pub fn unlink(&mut self, from: &str, to: &str) -> bool {
        self.devices
            .get_mut(from)
            .is_some_and(|device| device.links.remove(to).is_some())
    }

    /// Give `device` an extra address, presented to `observer`
    ///
    /// Models a multi-homed device: the observer reports it under the
    /// addresses presented on its link instead of the primary address.
    /// Repeated calls for one link accumulate.
    pub fn present_as(&mut self, observer: &str, device: &str, address: HostAddress) {
        self.link(observer, device);
        if let Some(target) = self.devices.get_mut(device) {
            if !target.addresses.contains(&address) {
                target.addresses.push(address);
            }
            self.by_address.insert(address, device.to_string());
        }
        if let Some(link) = self
            .devices
            .get_mut(observer)
            .and_then(|d| d.links.get_mut(device))
        {
            if !link.presented.contains(&address) {
                link.presented.push(address);
            }
        }
    }

    /// Hide a device's id from its neighbors' reports
    pub fn hide_device_id(&mut self, name: &str) {
        if let Some(device) = self.devices.get_mut(name) {
            device.device_id = None;
        }
    }

    /// Bring a device up or down
    pub fn set_up(&mut self, name: &str, up: bool) {
        if let Some(device) = self.devices.get_mut(name) {
            device.up = up;
        }
    }

    /// Look up a device by name
    pub fn device(&self, name: &str) -> Option<&SimDevice> {
        self.devices.get(name)
    }

    /// Find the device answering at `address`
    pub fn device_at(&self, address: &HostAddress) -> Option<&SimDevice> {
        self.by_address
            .get(address)
            .and_then(|name| self.devices.get(name))
    }

    /// Primary address of a device
    pub fn address_of(&self, name: &str) -> Option<HostAddress> {
        self.devices.get(name).map(SimDevice::primary_address)
    }

    /// What `name` reports when asked for its neighbors
    pub fn neighbors_of(&self, name: &str) -> Vec<NeighborCandidate> {
        let Some(device) = self.devices.get(name) else {
            return Vec::new();
        };
        device
            .links
            .iter()
            .filter_map(|(neighbor, link)| {
                let target = self.devices.get(neighbor)?;
                let mut candidate = if link.presented.is_empty() {
                    NeighborCandidate::new(target.primary_address())
                } else {
                    NeighborCandidate::with_addresses(link.presented.iter().copied())
                }
                .with_link(LinkInfo::on_interface(link.interface.clone()));
                if let Some(device_id) = &target.device_id {
                    candidate = candidate.with_device_id(device_id.clone());
                }
                Some(candidate)
            })
            .collect()
    }

    /// All device names, sorted
    pub fn device_names(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Number of directed links
    pub fn link_count(&self) -> usize {
        self.devices.values().map(|d| d.links.len()).sum()
    }

    /// Check whether `from` reports `to`
    pub fn has_link(&self, from: &str, to: &str) -> bool {
        self.devices
            .get(from)
            .is_some_and(|d| d.links.contains_key(to))
    }

    /// Print a simple ASCII view of the network
    pub fn visualize(&self) -> String {
        let mut output = String::new();
        output.push_str("Network:\n");
        output.push_str(&format!("  Devices: {}\n", self.device_count()));
        output.push_str(&format!("  Links: {}\n\n", self.link_count()));

        for device in self.devices.values() {
            let neighbors: Vec<String> = device
                .links
                .iter()
                .map(|(name, link)| format!("{}@{}", name, link.interface))
                .collect();
            output.push_str(&format!(
                "  {} ({}) -> [{}]\n",
                device.name,
                device.primary_address(),
                neighbors.join(", ")
            ));
        }
        output
    }
}

/// Device names `A`..`Z`, then `D27`, `D28`, ...
fn device_name(index: usize) -> String {
    if index < 26 {
        char::from(b'A' + index as u8).to_string()
    } else {
        format!("D{}", index + 1)
    }
}

/// The n-th device's primary address: 10.0.0.1, 10.0.0.2, ...
fn address_for(index: usize) -> HostAddress {
    let third = (index / 254) as u8;
    let fourth = (index % 254) as u8 + 1;
    HostAddress::from(IpAddr::V4(Ipv4Addr::new(10, 0, third, fourth)))
}

/// Builder for standard network shapes
pub struct NetworkBuilder {
    device_count: usize,
}

impl NetworkBuilder {
    /// Create a builder for `device_count` devices
    pub fn new(device_count: usize) -> Self {
        Self { device_count }
    }

    fn names(&self) -> Vec<String> {
        (0..self.device_count).map(device_name).collect()
    }

    fn with_devices(&self) -> (SimNetwork, Vec<String>) {
        let mut network = SimNetwork::new();
        let names = self.names();
        for name in &names {
            network.add_device(name);
        }
        (network, names)
    }

    /// A - B - C - D - ...
    pub fn line(self) -> SimNetwork {
        let (mut network, names) = self.with_devices();
        for pair in names.windows(2) {
            network.connect(&pair[0], &pair[1]);
        }
        network
    }

    /// A - B - ... - Z - A
    pub fn ring(self) -> SimNetwork {
        let (mut network, names) = self.with_devices();
        for i in 0..names.len() {
            let next = (i + 1) % names.len();
            network.connect(&names[i], &names[next]);
        }
        network
    }

    /// A in the center, connected to all others
    pub fn star(self) -> SimNetwork {
        let (mut network, names) = self.with_devices();
        if let Some((center, rest)) = names.split_first() {
            for name in rest {
                network.connect(center, name);
            }
        }
        network
    }

    /// Every device connected to every other
    pub fn full_mesh(self) -> SimNetwork {
        let (mut network, names) = self.with_devices();
        for i in 0..names.len() {
            for j in (i + 1)..names.len() {
                network.connect(&names[i], &names[j]);
            }
        }
        network
    }

    /// Random links with the given probability, reproducible from `seed`
    ///
    /// A spanning path through all devices is laid first, so every device
    /// is reachable from `A`.
    pub fn random(self, connection_probability: f64, seed: u64) -> SimNetwork {
        let (mut network, names) = self.with_devices();
        let mut rng = StdRng::seed_from_u64(seed);

        for i in 1..names.len() {
            let parent = rng.random_range(0..i);
            network.connect(&names[parent], &names[i]);
        }
        for i in 0..names.len() {
            for j in (i + 1)..names.len() {
                if rng.random::<f64>() < connection_probability {
                    network.connect(&names[i], &names[j]);
                }
            }
        }
        network
    }
}

/// Create a network from an edge list, connecting both directions
pub fn from_edges(edges: &[(&str, &str)]) -> SimNetwork {
    let mut network = SimNetwork::new();
    for (a, b) in edges {
        network.connect(a, b);
    }
    network
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> HostAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_addresses_follow_insertion_order() {
        let network = from_edges(&[("A", "B"), ("B", "C")]);
        assert_eq!(network.address_of("A"), Some(addr("10.0.0.1")));
        assert_eq!(network.address_of("C"), Some(addr("10.0.0.3")));
        assert_eq!(network.device_at(&addr("10.0.0.2")).unwrap().name, "B");
        assert_eq!(address_for(254), addr("10.0.1.1"));
    }

    #[test]
    fn test_shapes() {
        let ring = NetworkBuilder::new(4).ring();
        assert_eq!(ring.device_count(), 4);
        assert_eq!(ring.link_count(), 8);
        assert!(ring.has_link("D", "A"));
        assert!(!ring.has_link("A", "C"));

        let line = NetworkBuilder::new(5).line();
        assert_eq!(line.link_count(), 8);

        let star = NetworkBuilder::new(5).star();
        assert_eq!(star.device("A").unwrap().links.len(), 4);
        assert_eq!(star.device("E").unwrap().links.len(), 1);

        let full = NetworkBuilder::new(4).full_mesh();
        assert_eq!(full.link_count(), 12);
    }

    #[test]
    fn test_random_is_reproducible_and_connected() {
        let a = NetworkBuilder::new(20).random(0.1, 42);
        let b = NetworkBuilder::new(20).random(0.1, 42);

        assert_eq!(a.visualize(), b.visualize());
        assert!(a.device_names().iter().all(|name| {
            !a.device(name).unwrap().links.is_empty()
        }));
        assert_eq!(device_name(30), "D31");
    }

    #[test]
    fn test_neighbor_reports() {
        let mut network = SimNetwork::new();
        network.link("A", "B");
        network.link("A", "C");

        let reported = network.neighbors_of("A");
        assert_eq!(reported.len(), 2);
        assert_eq!(reported[0].addresses, vec![addr("10.0.0.2")]);
        assert_eq!(reported[0].device_id.as_deref(), Some("B"));
        assert_eq!(reported[1].link.interface.as_deref(), Some("eth1"));

        // One-way: B reports nothing
        assert!(network.neighbors_of("B").is_empty());
    }

    #[test]
    fn test_multi_homed_device() {
        let mut network = from_edges(&[("A", "B"), ("A", "C")]);
        network.present_as("B", "D", addr("10.9.0.1"));
        network.present_as("C", "D", addr("10.9.0.2"));
        network.hide_device_id("D");

        let device = network.device("D").unwrap();
        assert_eq!(device.addresses.len(), 3);
        assert_eq!(network.device_at(&addr("10.9.0.2")).unwrap().name, "D");

        let from_b = network.neighbors_of("B");
        let d = from_b.iter().find(|c| c.addresses == vec![addr("10.9.0.1")]).unwrap();
        assert!(d.device_id.is_none());
    }

    #[test]
    fn test_unlink_and_down() {
        let mut network = from_edges(&[("A", "B")]);
        assert!(network.unlink("A", "B"));
        assert!(!network.unlink("A", "B"));
        assert!(network.has_link("B", "A"));

        network.set_up("B", false);
        assert!(!network.device("B").unwrap().up);
    }
}
