// Copyright (c) 2025 - Cowboy AI, Inc.
//! Compute Unit Provisioner
//!
//! Request-driven functions placed in the private subnets, bound to one
//! identity and one endpoint group. Each unit receives the data store's
//! endpoint as an environment variable; the format depends on the variant:
//!
//! | Variant   | Value                    |
//! |-----------|--------------------------|
//! | Migration | `https://<endpoint>`     |
//! | Query     | `<endpoint>`             |
//!
//! Both values come from the same output slot, so neither unit can be
//! created before the data store exists.

use serde::{Deserialize, Serialize};

use crate::domain::annotations::Annotation;
use crate::domain::data_store::DataStoreHandle;
use crate::domain::identity::{
    IdentityHandle, PolicyStatement, ResourcePattern, DATA_PLANE_READ, DATA_PLANE_READ_WRITE,
    LOG_DELIVERY_ACTIONS, NETWORK_ATTACHMENT_ACTIONS,
};
use crate::domain::invariants::{
    validate_private_placement, validate_range, validate_zone_span, ValidationResult,
};
use crate::domain::network::Placement;
use crate::domain::resource_type::{Attribute, ResourceKind};
use crate::domain::DeclareError;
use crate::graph::{GraphBuilder, OutputRef, PropertyValue, ResourceId, ResourceNode};

/// Environment variable carrying the data store endpoint
pub const ENDPOINT_VARIABLE: &str = "OPENSEARCH_DOMAIN_ENDPOINT";

/// What a unit does against the data store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeVariant {
    /// Schema and index evolution
    Migration,
    /// Read and search
    Query,
}

/// How the endpoint is rendered into a unit's environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointFormat {
    /// Scheme-prefixed URL
    HttpsUrl,
    /// Host name only
    BareHost,
}

impl EndpointFormat {
    pub fn render(&self, endpoint: OutputRef) -> PropertyValue {
        match self {
            Self::HttpsUrl => PropertyValue::Join(vec!["https://".into(), endpoint.into()]),
            Self::BareHost => PropertyValue::Ref(endpoint),
        }
    }
}

/// Shared library layer attached to a unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSpec {
    pub id: ResourceId,
    pub code_location: String,
    pub compatible_runtimes: Vec<String>,
}

/// Declared compute unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeUnitSpec {
    pub id: ResourceId,
    pub variant: ComputeVariant,
    /// Opaque location of the executable artifact
    pub code_location: String,
    pub runtime: String,
    pub handler: String,
    pub timeout_secs: u32,
    pub memory_mib: u32,
    pub endpoint_format: EndpointFormat,
    pub layers: Vec<LayerSpec>,
    pub annotations: Vec<Annotation>,
}

impl ComputeUnitSpec {
    /// Index migration unit
    pub fn migration(id: ResourceId, code_location: impl Into<String>) -> Self {
        Self {
            id,
            variant: ComputeVariant::Migration,
            code_location: code_location.into(),
            runtime: "java17".to_string(),
            handler: "example.Handler::handleRequest".to_string(),
            timeout_secs: 60,
            memory_mib: 256,
            endpoint_format: EndpointFormat::HttpsUrl,
            layers: Vec::new(),
            annotations: Vec::new(),
        }
    }

    /// Search query unit
    pub fn query(id: ResourceId, code_location: impl Into<String>) -> Self {
        Self {
            id,
            variant: ComputeVariant::Query,
            code_location: code_location.into(),
            runtime: "python3.12".to_string(),
            handler: "opensearch_query.lambda_handler".to_string(),
            timeout_secs: 60,
            memory_mib: 256,
            endpoint_format: EndpointFormat::BareHost,
            layers: Vec::new(),
            annotations: Vec::new(),
        }
    }

    pub fn with_layer(mut self, layer: LayerSpec) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn validate(&self, placement: &Placement) -> ValidationResult {
        let resource = self.id.as_str();
        validate_range(resource, "timeout_secs", u64::from(self.timeout_secs), 1, 900)?;
        validate_range(resource, "memory_mib", u64::from(self.memory_mib), 128, 10240)?;
        validate_private_placement(resource, placement)?;
        validate_zone_span(resource, placement)
    }

    /// Permissions this unit needs from its identity
    pub fn required_statements(&self, data_store: &DataStoreHandle) -> Vec<PolicyStatement> {
        let data_plane = match self.variant {
            ComputeVariant::Migration => DATA_PLANE_READ_WRITE,
            ComputeVariant::Query => DATA_PLANE_READ,
        };
        vec![
            PolicyStatement::allow(data_plane.iter().copied(), [data_store.data_plane()])
                .justified("Index and document paths live beneath the domain and are created at run time"),
            PolicyStatement::allow(NETWORK_ATTACHMENT_ACTIONS.iter().copied(), [ResourcePattern::Any])
                .justified("Network interface actions do not support resource-level permissions"),
            PolicyStatement::allow(LOG_DELIVERY_ACTIONS.iter().copied(), [ResourcePattern::Any])
                .justified("Acceptable practice to use wildcards for CloudWatch logs for functions"),
        ]
    }

    /// Validate, then record the unit and any layers not yet declared
    ///
    /// The unit is sequenced after its identity's permission policy so it
    /// never starts without the grants it needs.
    pub fn declare(
        &self,
        graph: &mut GraphBuilder,
        placement: &Placement,
        group: OutputRef,
        identity: &IdentityHandle,
        data_store: &DataStoreHandle,
    ) -> Result<ComputeHandle, DeclareError> {
        self.validate(placement)?;

        let mut layers = Vec::new();
        for layer in &self.layers {
            if !graph.contains(&layer.id) {
                graph.add(
                    ResourceNode::new(layer.id.clone(), ResourceKind::FunctionLayer)
                        .with("code_location", layer.code_location.clone())
                        .with(
                            "compatible_runtimes",
                            PropertyValue::list(layer.compatible_runtimes.iter()),
                        ),
                )?;
            }
            layers.push(layer.id.output(Attribute::Arn));
        }

        graph.add(
            ResourceNode::new(self.id.clone(), ResourceKind::Function)
                .with("code_location", self.code_location.clone())
                .with("runtime", self.runtime.clone())
                .with("handler", self.handler.clone())
                .with("role", identity.arn())
                .with("timeout", self.timeout_secs)
                .with("memory_size", self.memory_mib)
                .with(
                    "vpc_config",
                    PropertyValue::map([
                        ("subnet_ids", placement.subnet_ids()),
                        ("security_group_ids", PropertyValue::list([group])),
                    ]),
                )
                .with(
                    "environment",
                    PropertyValue::map([(
                        ENDPOINT_VARIABLE,
                        self.endpoint_format.render(data_store.endpoint()),
                    )]),
                )
                .with("layers", PropertyValue::list(layers))
                .after(identity.policy.clone())
                .annotated(self.annotations.clone()),
        )?;

        Ok(ComputeHandle {
            id: self.id.clone(),
            variant: self.variant,
        })
    }
}

/// Handle returned from declaring a compute unit
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComputeHandle {
    pub id: ResourceId,
    pub variant: ComputeVariant,
}

impl ComputeHandle {
    pub fn arn(&self) -> OutputRef {
        self.id.output(Attribute::Arn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::network::{Cidr, NetworkFabricSpec, SubnetKind};
    use crate::graph::OutputTable;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn id(s: &str) -> ResourceId {
        ResourceId::new(s).unwrap()
    }

    fn declare_units() -> crate::graph::ResourceGraph {
        let mut graph = GraphBuilder::new();
        let network = NetworkFabricSpec::new(id("Vpc"), Cidr::parse("10.0.0.0/16").unwrap(), "us-east-2", 2)
            .unwrap()
            .declare(&mut graph)
            .unwrap();
        graph
            .add(ResourceNode::new(id("ComputeGroup"), ResourceKind::SecurityGroup))
            .unwrap();
        graph
            .add(ResourceNode::new(id("ComputeRole"), ResourceKind::Role))
            .unwrap();
        graph
            .add(ResourceNode::new(id("ComputeRolePolicy"), ResourceKind::RolePolicy))
            .unwrap();
        graph
            .add(ResourceNode::new(id("SearchDomain"), ResourceKind::SearchDomain))
            .unwrap();

        let identity = IdentityHandle {
            role: id("ComputeRole"),
            policy: id("ComputeRolePolicy"),
        };
        let store = DataStoreHandle {
            id: id("SearchDomain"),
        };
        let placement = network.placement(SubnetKind::PrivateWithEgress, None);
        let group = id("ComputeGroup").output(Attribute::Id);

        ComputeUnitSpec::migration(id("Migration"), "app/migration.jar")
            .declare(&mut graph, &placement, group.clone(), &identity, &store)
            .unwrap();
        ComputeUnitSpec::query(id("Query"), "lambdas/opensearch_query")
            .with_layer(LayerSpec {
                id: id("QueryLayer"),
                code_location: "lambda_layer/layer_content.zip".to_string(),
                compatible_runtimes: vec!["python3.12".to_string()],
            })
            .declare(&mut graph, &placement, group, &identity, &store)
            .unwrap();
        graph.finish().unwrap()
    }

    #[test]
    fn test_endpoint_format_per_variant() {
        let graph = declare_units();
        let mut outputs = OutputTable::new();
        for (resource, attrs) in [
            ("SearchDomain", vec![(Attribute::Endpoint, "vpc-search.example.com"), (Attribute::Arn, "arn:domain")]),
            ("ComputeRole", vec![(Attribute::Arn, "arn:role")]),
            ("ComputeGroup", vec![(Attribute::Id, "sg-1")]),
            ("QueryLayer", vec![(Attribute::Arn, "arn:layer")]),
            ("VpcPrivateSubnet1", vec![(Attribute::Id, "subnet-1")]),
            ("VpcPrivateSubnet2", vec![(Attribute::Id, "subnet-2")]),
        ] {
            outputs.insert(
                id(resource),
                attrs
                    .into_iter()
                    .map(|(a, v)| (a, v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            );
        }

        let migration = graph.resolve_node(&id("Migration"), &outputs).unwrap();
        assert_eq!(
            migration["environment"][ENDPOINT_VARIABLE],
            json!("https://vpc-search.example.com")
        );
        let query = graph.resolve_node(&id("Query"), &outputs).unwrap();
        assert_eq!(query["environment"][ENDPOINT_VARIABLE], json!("vpc-search.example.com"));
        assert_eq!(query["layers"], json!(["arn:layer"]));
    }

    #[test]
    fn test_units_sequenced_after_data_store_and_policy() {
        let graph = declare_units();
        let migration = graph.level_of(&id("Migration")).unwrap();
        assert!(migration > graph.level_of(&id("SearchDomain")).unwrap());
        assert!(migration > graph.level_of(&id("ComputeRolePolicy")).unwrap());
    }

    #[test]
    fn test_query_needs_read_only() {
        let store = DataStoreHandle {
            id: id("SearchDomain"),
        };
        let statements = ComputeUnitSpec::query(id("Query"), "q").required_statements(&store);
        assert!(!statements[0].actions.contains("es:ESHttpDelete"));
        assert!(statements[0].actions.contains("es:ESHttpGet"));
        assert!(statements.iter().all(|s| s.check("ComputeRole").is_ok()));
    }

    #[test]
    fn test_out_of_range_memory_rejected() {
        let mut graph = GraphBuilder::new();
        let network = NetworkFabricSpec::new(id("Vpc"), Cidr::parse("10.0.0.0/16").unwrap(), "us-east-2", 2)
            .unwrap()
            .declare(&mut graph)
            .unwrap();
        let mut unit = ComputeUnitSpec::query(id("Query"), "q");
        unit.memory_mib = 64;
        assert!(unit
            .validate(&network.placement(SubnetKind::PrivateWithEgress, None))
            .is_err());
    }
}
