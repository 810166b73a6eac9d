// Copyright (c) 2025 - Cowboy AI, Inc.
//! Data Store Provisioner
//!
//! A clustered, zone-aware search domain inside the private subnets.
//! Encryption at rest, node-to-node encryption and HTTPS-only transport are
//! baseline posture: a spec with any of them disabled never reaches the
//! graph.
//!
//! The domain's endpoint is an output slot, so every consumer that embeds
//! it is sequenced after the domain by construction.

use serde::{Deserialize, Serialize};

use crate::domain::annotations::Annotation;
use crate::domain::identity::{IdentityHandle, ResourcePattern, DATA_PLANE_READ_WRITE};
use crate::domain::invariants::{
    validate_domain_name, validate_encryption, validate_private_placement, validate_range,
    validate_zone_awareness, validate_zone_span, ValidationResult,
};
use crate::domain::network::Placement;
use crate::domain::resource_type::{Attribute, ResourceKind};
use crate::domain::DeclareError;
use crate::graph::{GraphBuilder, OutputRef, PropertyValue, ResourceId, ResourceNode};

/// Minimum TLS policy for client connections
pub const TLS_SECURITY_POLICY: &str = "Policy-Min-TLS-1-2-2019-07";

/// Block storage attached to each data node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub size_gib: u32,
    pub volume_type: String,
}

impl Default for VolumeSpec {
    fn default() -> Self {
        Self {
            size_gib: 10,
            volume_type: "gp3".to_string(),
        }
    }
}

/// Declared search cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchClusterSpec {
    pub id: ResourceId,
    pub domain_name: String,
    pub engine_version: String,
    pub data_nodes: u32,
    pub instance_type: String,
    pub zone_awareness: u8,
    pub volume: VolumeSpec,
    pub encryption_at_rest: bool,
    pub node_to_node_encryption: bool,
    pub enforce_https: bool,
    pub multi_az_with_standby: bool,
    pub enable_version_upgrade: bool,
    pub annotations: Vec<Annotation>,
}

impl SearchClusterSpec {
    /// Two data nodes across two zones with the baseline encryption posture
    pub fn new(id: ResourceId, domain_name: impl Into<String>) -> Self {
        Self {
            id,
            domain_name: domain_name.into(),
            engine_version: "OpenSearch_2.15".to_string(),
            data_nodes: 2,
            instance_type: "r7g.large.search".to_string(),
            zone_awareness: 2,
            volume: VolumeSpec::default(),
            encryption_at_rest: true,
            node_to_node_encryption: true,
            enforce_https: true,
            multi_az_with_standby: false,
            enable_version_upgrade: true,
            annotations: Vec::new(),
        }
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Check the declaration against the placement it will land in
    pub fn validate(&self, placement: &Placement) -> ValidationResult {
        let resource = self.id.as_str();
        validate_domain_name(resource, &self.domain_name)?;
        validate_encryption(
            resource,
            self.encryption_at_rest,
            self.node_to_node_encryption,
            self.enforce_https,
        )?;
        validate_private_placement(resource, placement)?;
        validate_zone_span(resource, placement)?;
        validate_zone_awareness(
            resource,
            self.data_nodes,
            self.zone_awareness,
            placement.zones(),
        )?;
        validate_range(resource, "data_nodes", u64::from(self.data_nodes), 1, 80)?;
        validate_range(resource, "volume_size_gib", u64::from(self.volume.size_gib), 10, 16384)
    }

    /// Literal ARN of the domain's sub-resources
    ///
    /// The access policy lives on the domain itself and cannot reference
    /// the domain's own output slot. `region` and `account` must be the ones
    /// the provider materializes into, or the policy names another domain.
    pub fn index_arn(&self, region: &str, account: &str) -> String {
        format!("arn:aws:es:{}:{}:domain/{}/*", region, account, self.domain_name)
    }

    /// Validate, then record the domain
    ///
    /// `placement` should already be limited to `zone_awareness` zones.
    pub fn declare(
        &self,
        graph: &mut GraphBuilder,
        placement: &Placement,
        group: OutputRef,
        admin: &IdentityHandle,
        region: &str,
        account: &str,
    ) -> Result<DataStoreHandle, DeclareError> {
        self.validate(placement)?;

        let access_policy = PropertyValue::map([
            ("Version", PropertyValue::from("2012-10-17")),
            (
                "Statement",
                PropertyValue::List(vec![PropertyValue::map([
                    ("Effect", PropertyValue::from("Allow")),
                    (
                        "Principal",
                        PropertyValue::map([("AWS", PropertyValue::from(admin.arn()))]),
                    ),
                    ("Action", PropertyValue::list(DATA_PLANE_READ_WRITE.iter().copied())),
                    ("Resource", PropertyValue::from(self.index_arn(region, account))),
                ])]),
            ),
        ]);

        graph.add(
            ResourceNode::new(self.id.clone(), ResourceKind::SearchDomain)
                .with("domain_name", self.domain_name.clone())
                .with("engine_version", self.engine_version.clone())
                .with(
                    "cluster_config",
                    PropertyValue::map([
                        ("instance_type", PropertyValue::from(&self.instance_type)),
                        ("instance_count", PropertyValue::from(self.data_nodes)),
                        ("zone_awareness_enabled", PropertyValue::from(true)),
                        (
                            "availability_zone_count",
                            PropertyValue::from(u32::from(self.zone_awareness)),
                        ),
                        (
                            "multi_az_with_standby_enabled",
                            PropertyValue::from(self.multi_az_with_standby),
                        ),
                    ]),
                )
                .with(
                    "ebs_options",
                    PropertyValue::map([
                        ("ebs_enabled", PropertyValue::from(true)),
                        ("volume_size", PropertyValue::from(self.volume.size_gib)),
                        ("volume_type", PropertyValue::from(&self.volume.volume_type)),
                    ]),
                )
                .with("encryption_at_rest", self.encryption_at_rest)
                .with("node_to_node_encryption", self.node_to_node_encryption)
                .with(
                    "domain_endpoint_options",
                    PropertyValue::map([
                        ("enforce_https", PropertyValue::from(self.enforce_https)),
                        ("tls_security_policy", PropertyValue::from(TLS_SECURITY_POLICY)),
                    ]),
                )
                .with(
                    "advanced_security_options",
                    PropertyValue::map([
                        ("enabled", PropertyValue::from(true)),
                        ("internal_user_database_enabled", PropertyValue::from(false)),
                        ("master_user_arn", PropertyValue::from(admin.arn())),
                    ]),
                )
                .with(
                    "vpc_options",
                    PropertyValue::map([
                        ("subnet_ids", placement.subnet_ids()),
                        ("security_group_ids", PropertyValue::list([group])),
                    ]),
                )
                .with("access_policies", access_policy)
                .with("enable_version_upgrade", self.enable_version_upgrade)
                .with("removal_policy", "destroy")
                .annotated(self.annotations.clone()),
        )?;

        Ok(DataStoreHandle {
            id: self.id.clone(),
        })
    }
}

/// Handle returned from declaring the data store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataStoreHandle {
    pub id: ResourceId,
}

impl DataStoreHandle {
    /// Network address, resolvable only after creation
    pub fn endpoint(&self) -> OutputRef {
        self.id.output(Attribute::Endpoint)
    }

    pub fn arn(&self) -> OutputRef {
        self.id.output(Attribute::Arn)
    }

    /// Indices and documents of the domain
    pub fn data_plane(&self) -> ResourcePattern {
        ResourcePattern::SubResources(self.arn())
    }
}
