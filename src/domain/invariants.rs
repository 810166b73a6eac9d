// Copyright (c) 2025 - Cowboy AI, Inc.
//! Pure Validation Functions - Baseline Invariants
//!
//! Every declaration is checked against these rules before anything is
//! materialized. A violation aborts the run with a [`ValidationError`].
//!
//! # Invariant Categories
//!
//! 1. **Placement**: data-plane resources span >= 2 zones, private only
//! 2. **Transport**: encryption at rest, node-to-node and HTTPS are mandatory
//! 3. **Reachability**: flows are paired, nothing beyond declared flows
//! 4. **Identity**: least privilege, justified wildcards, bound consumers
//! 5. **Storage**: no public access, TLS-only transport
//!
//! All functions are pure: no I/O, deterministic.

use crate::domain::network::{NetworkFabricSpec, Placement};

/// Validation result with detailed error information
pub type ValidationResult = Result<(), ValidationError>;

/// Policy violation detected before materialization
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{resource} spans {zones} zone(s); at least {minimum} required")]
    InsufficientZones {
        resource: String,
        zones: usize,
        minimum: u8,
    },

    #[error("{resource} is placed in public address space")]
    PublicPlacement { resource: String },

    #[error("{resource} has {setting} disabled")]
    EncryptionDisabled { resource: String, setting: String },

    #[error("{resource} zone awareness {zone_awareness} exceeds its {zones} placement zone(s) or is below 2")]
    ZoneAwareness {
        resource: String,
        zone_awareness: u8,
        zones: usize,
    },

    #[error("{data_nodes} data node(s) cannot be spread evenly over {zone_awareness} zones")]
    DataNodeDistribution { data_nodes: u32, zone_awareness: u8 },

    #[error("{resource} {field} = {value} outside {min}..={max}")]
    OutOfRange {
        resource: String,
        field: String,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("{resource} has invalid name: {reason}")]
    InvalidName { resource: String, reason: String },

    #[error("Unknown endpoint group: {0}")]
    UnknownEndpointGroup(String),

    #[error("Endpoint group declared twice: {0}")]
    DuplicateEndpointGroup(String),

    #[error("Flow {flow} has {matches} matching {direction} rule(s); exactly one required")]
    UnpairedFlow {
        flow: String,
        direction: String,
        matches: usize,
    },

    #[error("Rule {rule} permits traffic no declared flow requires")]
    OverPermission { rule: String },

    #[error("Group {group} accepts ingress from an address range")]
    AddressRangeIngress { group: String },

    #[error("Unknown identity: {0}")]
    UnknownIdentity(String),

    #[error("Identity declared twice: {0}")]
    DuplicateIdentity(String),

    #[error("Identity {identity} trusts no principal")]
    EmptyTrust { identity: String },

    #[error("Identity {identity} grants an unjustified wildcard: {statement}")]
    UnjustifiedWildcard { identity: String, statement: String },

    #[error("Identity {identity} breaks least privilege: {detail}")]
    LeastPrivilege { identity: String, detail: String },

    #[error("Identity {identity} carries a requirement for {consumer}, which is not bound to it")]
    UnboundConsumer { identity: String, consumer: String },

    #[error("{resource} allows public access")]
    PublicAccessAllowed { resource: String },

    #[error("{resource} has an empty command sequence")]
    EmptyCommandSequence { resource: String },

    #[error("Configuration object {key} is not seeded into the shared configuration store")]
    MissingConfigObject { key: String },

    #[error("Configuration store is declared as {found}; the enclave expects {expected}")]
    ConfigStoreMismatch { expected: String, found: String },
}

/// Data-plane placement must cover enough fault domains
pub fn validate_zone_span(resource: &str, placement: &Placement) -> ValidationResult {
    let zones = placement.zones();
    if zones < usize::from(NetworkFabricSpec::MIN_ZONES) {
        return Err(ValidationError::InsufficientZones {
            resource: resource.to_string(),
            zones,
            minimum: NetworkFabricSpec::MIN_ZONES,
        });
    }
    Ok(())
}

/// Data-plane placement must stay out of public address space
pub fn validate_private_placement(resource: &str, placement: &Placement) -> ValidationResult {
    if !placement.is_private() {
        return Err(ValidationError::PublicPlacement {
            resource: resource.to_string(),
        });
    }
    Ok(())
}

/// Baseline encryption posture
///
/// # Rules
/// - Encryption at rest enabled
/// - Node-to-node encryption enabled
/// - Plain HTTP rejected
pub fn validate_encryption(
    resource: &str,
    at_rest: bool,
    node_to_node: bool,
    enforce_https: bool,
) -> ValidationResult {
    let disabled = [
        (at_rest, "encryption at rest"),
        (node_to_node, "node-to-node encryption"),
        (enforce_https, "enforced HTTPS"),
    ]
    .into_iter()
    .find(|(enabled, _)| !enabled);

    if let Some((_, setting)) = disabled {
        return Err(ValidationError::EncryptionDisabled {
            resource: resource.to_string(),
            setting: setting.to_string(),
        });
    }
    Ok(())
}

/// Zone awareness must fit the placement and the node count
///
/// # Rules
/// - Zone awareness >= 2
/// - Placement covers at least as many zones as zone awareness
/// - Data nodes are a non-zero multiple of zone awareness
pub fn validate_zone_awareness(
    resource: &str,
    data_nodes: u32,
    zone_awareness: u8,
    placement_zones: usize,
) -> ValidationResult {
    if zone_awareness < NetworkFabricSpec::MIN_ZONES
        || usize::from(zone_awareness) > placement_zones
    {
        return Err(ValidationError::ZoneAwareness {
            resource: resource.to_string(),
            zone_awareness,
            zones: placement_zones,
        });
    }
    if data_nodes == 0 || data_nodes % u32::from(zone_awareness) != 0 {
        return Err(ValidationError::DataNodeDistribution {
            data_nodes,
            zone_awareness,
        });
    }
    Ok(())
}

/// Data-plane grants must enumerate actions, never a service-wide wildcard
pub fn validate_data_plane_actions<'a, I>(identity: &str, actions: I) -> ValidationResult
where
    I: IntoIterator<Item = &'a str>,
{
    if let Some(action) = actions.into_iter().find(|a| a.ends_with('*')) {
        return Err(ValidationError::LeastPrivilege {
            identity: identity.to_string(),
            detail: format!("data-plane grant uses wildcard action {}", action),
        });
    }
    Ok(())
}

/// Numeric setting must fall inside an inclusive range
pub fn validate_range(resource: &str, field: &str, value: u64, min: u64, max: u64) -> ValidationResult {
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            resource: resource.to_string(),
            field: field.to_string(),
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Search domain names: 3-28 chars, lowercase letter first, `[a-z0-9-]`
pub fn validate_domain_name(resource: &str, name: &str) -> ValidationResult {
    let reason = if !(3..=28).contains(&name.len()) {
        Some("must be 3-28 characters")
    } else if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        Some("must start with a lowercase letter")
    } else if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        Some("may only contain lowercase letters, digits and hyphens")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ValidationError::InvalidName {
            resource: resource.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Object containers must block public access and refuse plaintext transport
pub fn validate_store_hardening(
    resource: &str,
    block_public_access: bool,
    enforce_tls: bool,
) -> ValidationResult {
    if !block_public_access {
        return Err(ValidationError::PublicAccessAllowed {
            resource: resource.to_string(),
        });
    }
    if !enforce_tls {
        return Err(ValidationError::EncryptionDisabled {
            resource: resource.to_string(),
            setting: "TLS-only transport".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::network::{SubnetKind, SubnetRef};
    use crate::graph::ResourceId;
    use test_case::test_case;

    fn placement(zones: &[(&str, SubnetKind)]) -> Placement {
        Placement {
            subnets: zones
                .iter()
                .enumerate()
                .map(|(i, (zone, kind))| SubnetRef {
                    id: ResourceId::new(format!("Subnet{}", i)).unwrap(),
                    zone: zone.to_string(),
                    kind: *kind,
                })
                .collect(),
        }
    }

    #[test]
    fn test_zone_span() {
        let one = placement(&[("a", SubnetKind::PrivateWithEgress)]);
        assert!(matches!(
            validate_zone_span("Domain", &one),
            Err(ValidationError::InsufficientZones { zones: 1, .. })
        ));

        let two = placement(&[
            ("a", SubnetKind::PrivateWithEgress),
            ("b", SubnetKind::PrivateWithEgress),
        ]);
        assert!(validate_zone_span("Domain", &two).is_ok());
    }

    #[test]
    fn test_private_placement() {
        let mixed = placement(&[
            ("a", SubnetKind::PrivateWithEgress),
            ("b", SubnetKind::Public),
        ]);
        assert!(validate_private_placement("Domain", &mixed).is_err());
        assert!(validate_private_placement("Domain", &placement(&[])).is_err());
    }

    #[test_case(true, true, true => true ; "all enabled")]
    #[test_case(false, true, true => false ; "no encryption at rest")]
    #[test_case(true, false, true => false ; "no node to node")]
    #[test_case(true, true, false => false ; "plain http allowed")]
    fn test_encryption(at_rest: bool, node_to_node: bool, https: bool) -> bool {
        validate_encryption("Domain", at_rest, node_to_node, https).is_ok()
    }

    #[test_case(2, 2, 3 => true ; "two nodes two zones")]
    #[test_case(4, 2, 2 => true ; "four nodes two zones")]
    #[test_case(3, 2, 3 => false ; "uneven nodes")]
    #[test_case(2, 1, 3 => false ; "single zone awareness")]
    #[test_case(3, 3, 2 => false ; "awareness beyond placement")]
    #[test_case(0, 2, 2 => false ; "no nodes")]
    fn test_zone_awareness(nodes: u32, awareness: u8, zones: usize) -> bool {
        validate_zone_awareness("Domain", nodes, awareness, zones).is_ok()
    }

    #[test]
    fn test_data_plane_wildcard_rejected() {
        assert!(validate_data_plane_actions("Compute", ["es:ESHttpGet", "es:ESHttpPut"]).is_ok());
        assert!(matches!(
            validate_data_plane_actions("Compute", ["es:*"]),
            Err(ValidationError::LeastPrivilege { .. })
        ));
    }

    #[test_case("search" => true)]
    #[test_case("ab" => false)]
    #[test_case("Search" => false)]
    #[test_case("9search" => false)]
    #[test_case("search_domain" => false)]
    #[test_case("dev-search-enclave" => true)]
    fn test_domain_name(name: &str) -> bool {
        validate_domain_name("Domain", name).is_ok()
    }

    #[test]
    fn test_range() {
        assert!(validate_range("Fn", "memory_mib", 256, 128, 10240).is_ok());
        assert!(validate_range("Fn", "memory_mib", 64, 128, 10240).is_err());
    }

    #[test]
    fn test_store_hardening() {
        assert!(validate_store_hardening("Bucket", true, true).is_ok());
        assert!(matches!(
            validate_store_hardening("Bucket", false, true),
            Err(ValidationError::PublicAccessAllowed { .. })
        ));
        assert!(validate_store_hardening("Bucket", true, false).is_err());
    }
}
