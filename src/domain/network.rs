// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Fabric Value Objects with Validation Invariants
//!
//! One isolated virtual network, carved into a private-with-egress and a
//! public subnet per zone. Data-plane resources are placed through a
//! [`Placement`] that must span at least [`NetworkFabricSpec::MIN_ZONES`]
//! zones.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::annotations::Annotation;
use crate::domain::resource_type::{Attribute, ResourceKind};
use crate::domain::DeclareError;
use crate::graph::{GraphBuilder, OutputRef, PropertyValue, ResourceId, ResourceNode};

/// Network validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Invalid IPv4 address format: {0}")]
    InvalidIpAddress(String),

    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("Invalid prefix length: {0} (must be 16-28)")]
    InvalidPrefixLength(u8),

    #[error("CIDR {cidr} has host bits set")]
    NonCanonicalCidr { cidr: String },

    #[error("CIDR {cidr} cannot hold {requested} subnets of /{prefix}")]
    InsufficientAddressSpace {
        cidr: String,
        requested: usize,
        prefix: u8,
    },

    #[error("Network must span at least {minimum} zones, got {requested}")]
    InsufficientZones { requested: u8, minimum: u8 },

    #[error("Network may span at most {maximum} zones, got {requested}")]
    TooManyZones { requested: u8, maximum: u8 },

    #[error("Invalid region: {0}")]
    InvalidRegion(String),
}

/// IPv4 address block in CIDR notation
///
/// Invariants:
/// - Valid IPv4 address
/// - Prefix length 16-28 (provider limits for networks and subnets)
/// - Canonical: no host bits set
///
/// # Examples
///
/// ```rust
/// use cim_search_enclave::domain::Cidr;
///
/// let cidr = Cidr::parse("10.0.0.0/16").unwrap();
/// let subnets = cidr.subdivide(19, 6).unwrap();
/// assert_eq!(subnets[1].to_string(), "10.0.32.0/19");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Cidr {
    /// Smallest block the provider accepts
    pub const MAX_PREFIX: u8 = 28;

    /// Largest block the provider accepts
    pub const MIN_PREFIX: u8 = 16;

    /// Parse CIDR notation (e.g. `10.0.0.0/16`)
    pub fn parse(cidr: impl AsRef<str>) -> Result<Self, NetworkError> {
        let cidr = cidr.as_ref();
        let (addr_str, prefix_str) = cidr
            .split_once('/')
            .ok_or_else(|| NetworkError::InvalidCidr(cidr.to_string()))?;

        let network = Ipv4Addr::from_str(addr_str)
            .map_err(|_| NetworkError::InvalidIpAddress(addr_str.to_string()))?;
        let prefix = prefix_str
            .parse::<u8>()
            .map_err(|_| NetworkError::InvalidCidr(cidr.to_string()))?;

        Self::from_parts(network, prefix)
    }

    /// Create from address and prefix length
    pub fn from_parts(network: Ipv4Addr, prefix: u8) -> Result<Self, NetworkError> {
        if !(Self::MIN_PREFIX..=Self::MAX_PREFIX).contains(&prefix) {
            return Err(NetworkError::InvalidPrefixLength(prefix));
        }

        // Invariant: canonical form
        if u32::from(network) & !Self::mask(prefix) != 0 {
            return Err(NetworkError::NonCanonicalCidr {
                cidr: format!("{}/{}", network, prefix),
            });
        }

        Ok(Self { network, prefix })
    }

    fn mask(prefix: u8) -> u32 {
        u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0)
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Check whether an address falls inside this block
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & Self::mask(self.prefix) == u32::from(self.network)
    }

    /// Split into `count` consecutive blocks of `/new_prefix`
    pub fn subdivide(&self, new_prefix: u8, count: usize) -> Result<Vec<Cidr>, NetworkError> {
        if new_prefix < self.prefix || new_prefix > Self::MAX_PREFIX {
            return Err(NetworkError::InvalidPrefixLength(new_prefix));
        }

        let available = 1usize << (new_prefix - self.prefix);
        if count > available {
            return Err(NetworkError::InsufficientAddressSpace {
                cidr: self.to_string(),
                requested: count,
                prefix: new_prefix,
            });
        }

        let step = 1u32 << (32 - u32::from(new_prefix));
        let base = u32::from(self.network);
        (0..count as u32)
            .map(|i| Cidr::from_parts(Ipv4Addr::from(base + i * step), new_prefix))
            .collect()
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for Cidr {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Cidr {
    type Error = NetworkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Cidr> for String {
    fn from(cidr: Cidr) -> Self {
        cidr.to_string()
    }
}

/// Address-space partition of a subnet
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubnetKind {
    /// No inbound route from outside; outbound through a gateway
    PrivateWithEgress,
    /// Routable from outside the network
    Public,
}

impl SubnetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrivateWithEgress => "private_with_egress",
            Self::Public => "public",
        }
    }
}

/// One zone-local subnet in the fabric
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetSpec {
    pub id: ResourceId,
    pub zone: String,
    pub kind: SubnetKind,
    pub cidr: Cidr,
}

/// Declared network fabric
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkFabricSpec {
    pub id: ResourceId,
    pub cidr: Cidr,
    pub region: String,
    pub zone_count: u8,
    pub annotations: Vec<Annotation>,
}

impl NetworkFabricSpec {
    /// Fault-tolerance floor for any data-plane placement
    pub const MIN_ZONES: u8 = 2;

    /// Zones a single region offers at most
    pub const MAX_ZONES: u8 = 6;

    /// Create a fabric spec
    ///
    /// # Invariants
    /// - Between [`Self::MIN_ZONES`] and [`Self::MAX_ZONES`] zones
    /// - Region is a non-empty lowercase name
    pub fn new(
        id: ResourceId,
        cidr: Cidr,
        region: impl Into<String>,
        zone_count: u8,
    ) -> Result<Self, NetworkError> {
        let region = region.into();
        if region.is_empty()
            || !region
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(NetworkError::InvalidRegion(region));
        }
        if zone_count < Self::MIN_ZONES {
            return Err(NetworkError::InsufficientZones {
                requested: zone_count,
                minimum: Self::MIN_ZONES,
            });
        }
        if zone_count > Self::MAX_ZONES {
            return Err(NetworkError::TooManyZones {
                requested: zone_count,
                maximum: Self::MAX_ZONES,
            });
        }
        Ok(Self {
            id,
            cidr,
            region,
            zone_count,
            annotations: Vec::new(),
        })
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Zone names, one letter suffix per fault domain
    pub fn zones(&self) -> Vec<String> {
        (0..self.zone_count)
            .map(|i| format!("{}{}", self.region, char::from(b'a' + i)))
            .collect()
    }

    /// Carve the network block into one subnet per (zone, kind)
    ///
    /// Blocks are split evenly: with 3 zones and 2 kinds a `/16` yields
    /// six `/19` subnets, private ones first.
    pub fn subnets(&self) -> Result<Vec<SubnetSpec>, NetworkError> {
        let zones = self.zones();
        let count = zones.len() * 2;
        let extra_bits = (count as f64).log2().ceil() as u8;
        let blocks = self.cidr.subdivide(self.cidr.prefix() + extra_bits, count)?;

        let kinds = [SubnetKind::PrivateWithEgress, SubnetKind::Public];
        let mut subnets = Vec::with_capacity(count);
        let mut blocks = blocks.into_iter();
        for kind in kinds {
            for (i, zone) in zones.iter().enumerate() {
                let prefix = match kind {
                    SubnetKind::PrivateWithEgress => "PrivateSubnet",
                    SubnetKind::Public => "PublicSubnet",
                };
                let cidr = blocks.next().ok_or_else(|| NetworkError::InsufficientAddressSpace {
                    cidr: self.cidr.to_string(),
                    requested: count,
                    prefix: self.cidr.prefix() + extra_bits,
                })?;
                subnets.push(SubnetSpec {
                    id: ResourceId::new(format!("{}{}{}", self.id, prefix, i + 1))
                        .map_err(|_| NetworkError::InvalidCidr(self.id.to_string()))?,
                    zone: zone.clone(),
                    kind,
                    cidr,
                });
            }
        }
        Ok(subnets)
    }

    /// Record the network and its subnets in the graph
    pub fn declare(&self, graph: &mut GraphBuilder) -> Result<NetworkHandle, DeclareError> {
        graph.add(
            ResourceNode::new(self.id.clone(), ResourceKind::Network)
                .with("cidr_block", self.cidr.to_string())
                .with("enable_dns_hostnames", true)
                .with("enable_dns_support", true)
                .annotated(self.annotations.clone()),
        )?;

        let subnets = self.subnets()?;
        let mut handle = NetworkHandle {
            network: self.id.clone(),
            subnets: Vec::new(),
        };

        // Public subnets first so private ones can route through them
        for subnet in subnets.iter().filter(|s| s.kind == SubnetKind::Public) {
            graph.add(
                ResourceNode::new(subnet.id.clone(), ResourceKind::Subnet)
                    .with("vpc_id", self.id.output(Attribute::Id))
                    .with("cidr_block", subnet.cidr.to_string())
                    .with("zone", subnet.zone.clone())
                    .with("kind", subnet.kind.as_str())
                    .with("map_public_ip_on_launch", true),
            )?;
        }
        for subnet in subnets.iter().filter(|s| s.kind == SubnetKind::PrivateWithEgress) {
            let gateway = subnets
                .iter()
                .find(|s| s.kind == SubnetKind::Public && s.zone == subnet.zone)
                .map(|s| s.id.clone());
            let mut node = ResourceNode::new(subnet.id.clone(), ResourceKind::Subnet)
                .with("vpc_id", self.id.output(Attribute::Id))
                .with("cidr_block", subnet.cidr.to_string())
                .with("zone", subnet.zone.clone())
                .with("kind", subnet.kind.as_str())
                .with("map_public_ip_on_launch", false);
            if let Some(gateway) = gateway {
                node = node.with("egress_via", gateway.output(Attribute::Id));
            }
            graph.add(node)?;
        }

        handle.subnets = subnets
            .into_iter()
            .map(|s| SubnetRef {
                id: s.id,
                zone: s.zone,
                kind: s.kind,
            })
            .collect();
        Ok(handle)
    }
}

/// Declared subnet as seen by placements
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SubnetRef {
    pub id: ResourceId,
    pub zone: String,
    pub kind: SubnetKind,
}

/// Handle returned from declaring a network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkHandle {
    pub network: ResourceId,
    pub subnets: Vec<SubnetRef>,
}

impl NetworkHandle {
    pub fn network_id(&self) -> OutputRef {
        self.network.output(Attribute::Id)
    }

    /// Subnets of one kind, optionally limited to the first `max_zones` zones
    pub fn placement(&self, kind: SubnetKind, max_zones: Option<u8>) -> Placement {
        let mut zones_seen = BTreeSet::new();
        let subnets = self
            .subnets
            .iter()
            .filter(|s| s.kind == kind)
            .filter(|s| {
                let within = max_zones
                    .map(|max| zones_seen.len() < usize::from(max) || zones_seen.contains(&s.zone))
                    .unwrap_or(true);
                if within {
                    zones_seen.insert(s.zone.clone());
                }
                within
            })
            .cloned()
            .collect();
        Placement { subnets }
    }
}

/// Set of subnets a network-attached resource is placed into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub subnets: Vec<SubnetRef>,
}

impl Placement {
    /// Number of distinct zones covered
    pub fn zones(&self) -> usize {
        self.subnets
            .iter()
            .map(|s| s.zone.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// True when every subnet is private
    pub fn is_private(&self) -> bool {
        !self.subnets.is_empty()
            && self
                .subnets
                .iter()
                .all(|s| s.kind == SubnetKind::PrivateWithEgress)
    }

    pub fn subnet_ids(&self) -> PropertyValue {
        PropertyValue::list(self.subnets.iter().map(|s| s.id.output(Attribute::Id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fabric(zones: u8) -> NetworkFabricSpec {
        NetworkFabricSpec::new(
            ResourceId::new("Vpc").unwrap(),
            Cidr::parse("10.0.0.0/16").unwrap(),
            "us-east-2",
            zones,
        )
        .unwrap()
    }

    #[test]
    fn test_cidr_parse() {
        let cidr = Cidr::parse("10.0.0.0/16").unwrap();
        assert_eq!(cidr.network(), Ipv4Addr::new(10, 0, 0, 0));
        assert_eq!(cidr.prefix(), 16);
        assert!(cidr.contains(Ipv4Addr::new(10, 0, 200, 1)));
        assert!(!cidr.contains(Ipv4Addr::new(10, 1, 0, 1)));
    }

    #[test]
    fn test_invalid_cidr() {
        assert!(Cidr::parse("10.0.0.0").is_err());
        assert!(Cidr::parse("999.0.0.0/16").is_err());
        assert!(Cidr::parse("10.0.0.0/8").is_err());
        assert!(Cidr::parse("10.0.0.0/29").is_err());
        assert!(matches!(
            Cidr::parse("10.0.0.1/16"),
            Err(NetworkError::NonCanonicalCidr { .. })
        ));
    }

    #[test]
    fn test_subdivide() {
        let cidr = Cidr::parse("10.0.0.0/16").unwrap();
        let blocks = cidr.subdivide(18, 4).unwrap();
        let rendered: Vec<String> = blocks.iter().map(|c| c.to_string()).collect();
        assert_eq!(
            rendered,
            vec!["10.0.0.0/18", "10.0.64.0/18", "10.0.128.0/18", "10.0.192.0/18"]
        );
        assert!(cidr.subdivide(18, 5).is_err());
    }

    #[test]
    fn test_minimum_zones() {
        let err = NetworkFabricSpec::new(
            ResourceId::new("Vpc").unwrap(),
            Cidr::parse("10.0.0.0/16").unwrap(),
            "us-east-2",
            1,
        )
        .unwrap_err();
        assert_eq!(
            err,
            NetworkError::InsufficientZones {
                requested: 1,
                minimum: 2
            }
        );
    }

    #[test]
    fn test_subnet_layout() {
        let subnets = fabric(3).subnets().unwrap();
        assert_eq!(subnets.len(), 6);
        assert_eq!(subnets[0].kind, SubnetKind::PrivateWithEgress);
        assert_eq!(subnets[0].cidr.to_string(), "10.0.0.0/19");
        assert_eq!(subnets[0].zone, "us-east-2a");
        assert_eq!(subnets[3].kind, SubnetKind::Public);
        assert_eq!(subnets[3].cidr.to_string(), "10.0.96.0/19");
    }

    #[test]
    fn test_placement_zone_limit() {
        let mut graph = GraphBuilder::new();
        let handle = fabric(3).declare(&mut graph).unwrap();

        let all_private = handle.placement(SubnetKind::PrivateWithEgress, None);
        assert_eq!(all_private.zones(), 3);
        assert!(all_private.is_private());

        let two = handle.placement(SubnetKind::PrivateWithEgress, Some(2));
        assert_eq!(two.zones(), 2);
        assert_eq!(two.subnets.len(), 2);

        let public = handle.placement(SubnetKind::Public, None);
        assert!(!public.is_private());
    }

    #[test]
    fn test_private_subnets_route_through_public() {
        let mut graph = GraphBuilder::new();
        fabric(2).declare(&mut graph).unwrap();
        let graph = graph.finish().unwrap();

        let private = ResourceId::new("VpcPrivateSubnet1").unwrap();
        let public = ResourceId::new("VpcPublicSubnet1").unwrap();
        assert!(graph.dependencies(&private).unwrap().contains(&public));
        assert_eq!(graph.level_of(&private), Some(2));
    }
}
