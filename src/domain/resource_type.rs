// Copyright (c) 2025 - Cowboy AI, Inc.
//! Enclave Resource Kind Taxonomy
//!
//! Defines the vocabulary of resources an enclave is composed of and, for
//! each kind, the output slots it exposes once materialized. Output slots are
//! the only values other declarations may reference.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Post-creation attribute exposed by a materialized resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    /// Provider-assigned identifier
    Id,
    /// Fully qualified resource name
    Arn,
    /// Human-facing resource name
    Name,
    /// Stable unique handle of an identity
    UniqueId,
    /// Network address of a data store
    Endpoint,
    /// Address block of a network
    CidrBlock,
    /// Fault domain a subnet lives in
    Zone,
}

impl Attribute {
    /// Get the canonical string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "Id",
            Self::Arn => "Arn",
            Self::Name => "Name",
            Self::UniqueId => "UniqueId",
            Self::Endpoint => "Endpoint",
            Self::CidrBlock => "CidrBlock",
            Self::Zone => "Zone",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Enclave resource kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    // Network fabric
    /// Isolated virtual network
    Network,
    /// Zone-local address partition
    Subnet,

    // Reachability
    /// Traffic-endpoint group
    SecurityGroup,
    /// Ingress rule attached to a destination group
    SecurityGroupIngress,
    /// Egress rule attached to a source group
    SecurityGroupEgress,

    // Identity
    /// Assumable identity with a trust statement
    Role,
    /// Permission statements attached to a role
    RolePolicy,

    // Data
    /// Clustered search engine domain
    SearchDomain,

    // Compute
    /// Request-driven function
    Function,
    /// Shared library layer for functions
    FunctionLayer,

    // Shared configuration
    /// Durable object container
    Bucket,
    /// Resource policy on an object container
    BucketPolicy,
    /// Seeding of objects into a container
    BucketDeployment,

    // Automation
    /// Triggerable build environment
    BuildProject,
}

/// Coarse grouping used for event subjects and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceCategory {
    Network,
    Reachability,
    Identity,
    Data,
    Compute,
    Storage,
    Automation,
}

impl ResourceKind {
    /// Get the canonical string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Subnet => "subnet",
            Self::SecurityGroup => "security_group",
            Self::SecurityGroupIngress => "security_group_ingress",
            Self::SecurityGroupEgress => "security_group_egress",
            Self::Role => "role",
            Self::RolePolicy => "role_policy",
            Self::SearchDomain => "search_domain",
            Self::Function => "function",
            Self::FunctionLayer => "function_layer",
            Self::Bucket => "bucket",
            Self::BucketPolicy => "bucket_policy",
            Self::BucketDeployment => "bucket_deployment",
            Self::BuildProject => "build_project",
        }
    }

    /// Output slots this kind exposes after creation
    pub fn outputs(&self) -> &'static [Attribute] {
        use Attribute::*;
        match self {
            Self::Network => &[Id, CidrBlock],
            Self::Subnet => &[Id, Zone],
            Self::SecurityGroup => &[Id],
            Self::SecurityGroupIngress | Self::SecurityGroupEgress => &[Id],
            Self::Role => &[Arn, Name, UniqueId],
            Self::RolePolicy => &[Id],
            Self::SearchDomain => &[Arn, Endpoint, Name],
            Self::Function => &[Arn, Name],
            Self::FunctionLayer => &[Arn],
            Self::Bucket => &[Arn, Name],
            Self::BucketPolicy | Self::BucketDeployment => &[Id],
            Self::BuildProject => &[Arn, Name],
        }
    }

    /// Check whether this kind exposes the given output slot
    pub fn exposes(&self, attribute: Attribute) -> bool {
        self.outputs().contains(&attribute)
    }

    /// Get the category for this kind
    pub fn category(&self) -> ResourceCategory {
        match self {
            Self::Network | Self::Subnet => ResourceCategory::Network,
            Self::SecurityGroup | Self::SecurityGroupIngress | Self::SecurityGroupEgress => {
                ResourceCategory::Reachability
            }
            Self::Role | Self::RolePolicy => ResourceCategory::Identity,
            Self::SearchDomain => ResourceCategory::Data,
            Self::Function | Self::FunctionLayer => ResourceCategory::Compute,
            Self::Bucket | Self::BucketPolicy | Self::BucketDeployment => {
                ResourceCategory::Storage
            }
            Self::BuildProject => ResourceCategory::Automation,
        }
    }

    /// Resources that hold an attachment inside the network fabric
    pub fn is_network_attached(&self) -> bool {
        matches!(
            self,
            Self::Subnet
                | Self::SecurityGroup
                | Self::SecurityGroupIngress
                | Self::SecurityGroupEgress
                | Self::SearchDomain
                | Self::Function
                | Self::BuildProject
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ResourceCategory {
    /// Get the canonical string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Reachability => "reachability",
            Self::Identity => "identity",
            Self::Data => "data",
            Self::Compute => "compute",
            Self::Storage => "storage",
            Self::Automation => "automation",
        }
    }
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_domain_exposes_endpoint() {
        assert!(ResourceKind::SearchDomain.exposes(Attribute::Endpoint));
        assert!(!ResourceKind::Function.exposes(Attribute::Endpoint));
    }

    #[test]
    fn test_role_exposes_unique_handle() {
        assert!(ResourceKind::Role.exposes(Attribute::UniqueId));
        assert!(ResourceKind::Role.exposes(Attribute::Arn));
    }

    #[test]
    fn test_categories() {
        assert_eq!(ResourceKind::Subnet.category(), ResourceCategory::Network);
        assert_eq!(
            ResourceKind::SecurityGroupEgress.category(),
            ResourceCategory::Reachability
        );
        assert_eq!(ResourceKind::BuildProject.category(), ResourceCategory::Automation);
    }

    #[test]
    fn test_network_attachment() {
        assert!(ResourceKind::Function.is_network_attached());
        assert!(!ResourceKind::Role.is_network_attached());
        assert!(!ResourceKind::Network.is_network_attached());
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&ResourceKind::SearchDomain).unwrap();
        assert_eq!(json, "\"search_domain\"");
        let attr: Attribute = serde_json::from_str("\"unique_id\"").unwrap();
        assert_eq!(attr, Attribute::UniqueId);
    }
}
