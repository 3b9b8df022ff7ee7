//! Host addresses
//!
//! A host may present several addresses across its interfaces. The
//! [`HostAddress`] type covers the two kinds neighbor-query protocols
//! report: network-layer addresses and hardware addresses.

use std::fmt::{self, Display};
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AddressError;

/// A 48-bit hardware (MAC) address
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// The all-zero address, reported by devices that have no hardware address
    pub const ZERO: MacAddr = MacAddr([0; 6]);

    /// Create a MAC address from raw octets
    pub fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Get the raw octets
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Check whether this is the all-zero address
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }
}

impl Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddr({})", self)
    }
}

impl FromStr for MacAddr {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split([':', '-']).collect();
        if parts.len() != 6 {
            return Err(AddressError::InvalidMac(s.to_string()));
        }

        let mut octets = [0u8; 6];
        for (slot, part) in octets.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(AddressError::InvalidMac(s.to_string()));
            }
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| AddressError::InvalidMac(s.to_string()))?;
        }
        Ok(Self(octets))
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An address a host presents on one of its interfaces
///
/// Addresses are totally ordered (IP addresses sort before MAC addresses)
/// so that address sets and snapshots iterate deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HostAddress {
    /// Network-layer address
    Ip(IpAddr),
    /// Hardware address
    Mac(MacAddr),
}

impl HostAddress {
    /// Check whether this address carries no identity information
    ///
    /// `0.0.0.0`, `::` and the all-zero MAC are placeholders that many
    /// devices report before they are configured. They never take part in
    /// identity resolution.
    pub fn is_unspecified(&self) -> bool {
        match self {
            Self::Ip(ip) => ip.is_unspecified(),
            Self::Mac(mac) => mac.is_zero(),
        }
    }

    /// Check whether this is a network-layer address
    pub fn is_ip(&self) -> bool {
        matches!(self, Self::Ip(_))
    }

    /// Get the IP address, if this is one
    pub fn as_ip(&self) -> Option<IpAddr> {
        match self {
            Self::Ip(ip) => Some(*ip),
            Self::Mac(_) => None,
        }
    }

    /// Get the MAC address, if this is one
    pub fn as_mac(&self) -> Option<MacAddr> {
        match self {
            Self::Mac(mac) => Some(*mac),
            Self::Ip(_) => None,
        }
    }
}

impl Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip(ip) => write!(f, "{}", ip),
            Self::Mac(mac) => write!(f, "{}", mac),
        }
    }
}

impl FromStr for HostAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(ip) = s.parse::<IpAddr>() {
            return Ok(Self::Ip(ip));
        }
        s.parse::<MacAddr>()
            .map(Self::Mac)
            .map_err(|_| AddressError::Unrecognized(s.to_string()))
    }
}

impl From<IpAddr> for HostAddress {
    fn from(ip: IpAddr) -> Self {
        Self::Ip(ip)
    }
}

impl From<MacAddr> for HostAddress {
    fn from(mac: MacAddr) -> Self {
        Self::Mac(mac)
    }
}

impl Serialize for HostAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HostAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
