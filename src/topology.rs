// Copyright (c) 2025 - Cowboy AI, Inc.
//! Search enclave topology
//!
//! Composes every declaration of one environment into a single resource
//! graph:
//!
//! ```text
//! Network ─┬─▶ Endpoint groups ─▶ flow rules
//!          │
//! Identities (compute, runner ─assumes─▶ compute)
//!          │
//! Config store ─▶ policy ─▶ seeding
//!          │
//! Search domain (admin = compute identity)
//!          │
//! Migration unit, query unit (+ layer)
//!          │
//! Automation runner (after seeding and identity policy)
//! ```

use serde_json::Value;

use crate::config::EnvironmentConfig;
use crate::domain::annotations::Annotation;
use crate::domain::automation::AutomationRunnerSpec;
use crate::domain::compute::{ComputeUnitSpec, LayerSpec};
use crate::domain::config_store::ConfigStoreSpec;
use crate::domain::data_store::{DataStoreHandle, SearchClusterSpec, VolumeSpec};
use crate::domain::identity::{IdentityResolver, Principal, BUILD_SERVICE, FUNCTION_SERVICE};
use crate::domain::invariants::ValidationError;
use crate::domain::network::{Cidr, NetworkFabricSpec, SubnetKind};
use crate::domain::reachability::{EndpointGroup, ReachabilityAudit, ReachabilityPolicy};
use crate::errors::EnclaveResult;
use crate::graph::{GraphBuilder, ResourceGraph, ResourceId};

/// Ports the data store is reachable on; 80 stays open for health checks
/// even though the domain only answers HTTPS.
pub const DATA_STORE_PORTS: [u16; 2] = [80, 443];

const CONFIG_STORE_ID: &str = "TerraformS3Bucket";

/// Logical ids of the enclave's main resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnclaveIds {
    pub network: ResourceId,
    pub compute_group: ResourceId,
    pub data_group: ResourceId,
    pub runner_group: ResourceId,
    pub compute_identity: ResourceId,
    pub runner_identity: ResourceId,
    pub data_store: ResourceId,
    pub migration: ResourceId,
    pub query: ResourceId,
    pub query_layer: ResourceId,
    pub config_store: ResourceId,
    pub runner: ResourceId,
}

impl EnclaveIds {
    fn new() -> EnclaveResult<Self> {
        let id = |s: &str| ResourceId::new(s);
        Ok(Self {
            network: id("OpenSearchVpc")?,
            compute_group: id("LambdaSecurityGroup")?,
            data_group: id("OpenSearchSecurityGroup")?,
            runner_group: id("CodeBuildSecurityGroup")?,
            compute_identity: id("LambdaOpenSearchRole")?,
            runner_identity: id("CodeBuildRole")?,
            data_store: id("OpenSearchDomain")?,
            migration: id("OpenSearchMigrationFunction")?,
            query: id("OpenSearchQueryFunction")?,
            query_layer: id("OpenSearchPythonLayer")?,
            config_store: id(CONFIG_STORE_ID)?,
            runner: id("TerraformCodeBuildProject")?,
        })
    }
}

/// One composed environment
#[derive(Debug, Clone)]
pub struct SearchEnclave {
    ids: EnclaveIds,
    region: String,
    account: String,
    reachability: ReachabilityPolicy,
    identities: IdentityResolver,
    graph: ResourceGraph,
}

impl SearchEnclave {
    /// Id of the configuration store every composed enclave uses
    pub fn config_store_id() -> EnclaveResult<ResourceId> {
        Ok(ResourceId::new(CONFIG_STORE_ID)?)
    }

    /// Compose the full environment
    ///
    /// Every declaration is validated as it is recorded; the first policy
    /// violation aborts composition before anything is materialized.
    pub fn compose(config: &EnvironmentConfig, store: ConfigStoreSpec) -> EnclaveResult<Self> {
        config.validate()?;
        let ids = EnclaveIds::new()?;
        if store.id != ids.config_store {
            return Err(ValidationError::ConfigStoreMismatch {
                expected: ids.config_store.to_string(),
                found: store.id.to_string(),
            }
            .into());
        }
        let mut graph = GraphBuilder::new();

        // Network fabric
        let network = NetworkFabricSpec::new(
            ids.network.clone(),
            Cidr::parse(&config.network.cidr)?,
            config.region.clone(),
            config.network.max_zones,
        )?
        .annotate(Annotation::new(
            "AwsSolutions-VPC7",
            "VPC Flow Logs are not critical for a small proof of concept.",
        ))
        .declare(&mut graph)?;

        // Reachability
        let mut reachability = ReachabilityPolicy::new();
        reachability.add_group(EndpointGroup::new(
            ids.compute_group.clone(),
            "Compute units reading and writing the search domain",
        ))?;
        reachability.add_group(EndpointGroup::new(
            ids.data_group.clone(),
            "Search domain",
        ))?;
        reachability.add_group(
            EndpointGroup::new(ids.runner_group.clone(), "Automation runner").allow_all_outbound(),
        )?;
        reachability.permit_tcp_ports(
            &ids.compute_group,
            &ids.data_group,
            &DATA_STORE_PORTS,
            "Allow Lambda access to OpenSearch domain",
        )?;
        reachability.permit_tcp_ports(
            &ids.runner_group,
            &ids.data_group,
            &DATA_STORE_PORTS,
            "Allow CodeBuild access to OpenSearch domain",
        )?;
        let groups = reachability.declare(&mut graph, &network)?;

        // Declarations
        let migration = compute_spec(
            ComputeUnitSpec::migration(ids.migration.clone(), &config.migration.code_location),
            &config.migration,
        )
        .annotate(Annotation::new(
            "AwsSolutions-L1",
            "Java 17 runtime is an acceptable version in 2024.",
        ));
        let mut query = compute_spec(
            ComputeUnitSpec::query(ids.query.clone(), &config.query.code_location),
            &config.query,
        );
        if let Some(layer) = &config.query.layer {
            query = query.with_layer(LayerSpec {
                id: ids.query_layer.clone(),
                code_location: layer.code_location.clone(),
                compatible_runtimes: layer.compatible_runtimes.clone(),
            });
        }

        let cluster = cluster_spec(ids.data_store.clone(), config);
        let runner = runner_spec(ids.runner.clone(), config);

        // Identities
        let mut identities = IdentityResolver::new();
        identities.identity(
            ids.compute_identity.clone(),
            "Compute units acting against the search domain",
        )?;
        identities.trust(&ids.compute_identity, Principal::service(FUNCTION_SERVICE))?;
        identities.identity(ids.runner_identity.clone(), "Automation runner")?;
        identities.trust(&ids.runner_identity, Principal::service(BUILD_SERVICE))?;
        identities.delegate(&ids.runner_identity, &ids.compute_identity)?;

        identities.bind(&ids.compute_identity, migration.id.clone())?;
        identities.bind(&ids.compute_identity, query.id.clone())?;
        identities.bind(&ids.runner_identity, runner.id.clone())?;

        let store_handle = store.declare(&mut graph)?;
        let data_store = DataStoreHandle {
            id: cluster.id.clone(),
        };

        for unit in [&migration, &query] {
            for statement in unit.required_statements(&data_store) {
                identities.require(&ids.compute_identity, &unit.id, statement)?;
            }
        }
        for statement in runner.required_statements(&store_handle) {
            identities.require(&ids.runner_identity, &runner.id, statement)?;
        }

        identities.resolve(&mut graph)?;
        let compute_identity = identities.handle(&ids.compute_identity)?;
        let runner_identity = identities.handle(&ids.runner_identity)?;

        // Data store, limited to as many zones as it is aware of
        let data_placement = network.placement(
            SubnetKind::PrivateWithEgress,
            Some(cluster.zone_awareness),
        );
        cluster.declare(
            &mut graph,
            &data_placement,
            groups.group_id(&ids.data_group)?,
            &compute_identity,
            &config.region,
            &config.account,
        )?;

        // Compute units and runner across every private zone
        let private = network.placement(SubnetKind::PrivateWithEgress, None);
        for unit in [&migration, &query] {
            unit.declare(
                &mut graph,
                &private,
                groups.group_id(&ids.compute_group)?,
                &compute_identity,
                &data_store,
            )?;
        }

        runner.validate(&store, &private)?;
        runner.declare(
            &mut graph,
            &private,
            groups.group_id(&ids.runner_group)?,
            &runner_identity,
            &compute_identity,
            &data_store,
            &store_handle,
        )?;

        let graph = graph.finish()?;
        tracing::info!(
            environment = %config.name,
            resources = graph.len(),
            levels = graph.levels().len(),
            "Composed search enclave"
        );

        Ok(Self {
            ids,
            region: config.region.clone(),
            account: config.account.clone(),
            reachability,
            identities,
            graph,
        })
    }

    /// Baseline checks run before every apply
    ///
    /// - every flow renders to exactly one egress and one ingress rule
    /// - no rule permits an undeclared flow
    /// - the data store accepts no address-range ingress
    /// - every identity is trusted by someone and grants only what its
    ///   consumers need
    pub fn preflight(&self) -> EnclaveResult<()> {
        let audit = self.audit();
        audit.verify_pairing(self.reachability.flows())?;
        audit.verify_no_over_permission(self.reachability.flows())?;
        audit.verify_no_public_ingress(&self.ids.data_group)?;

        self.identities.validate()?;
        for identity in [&self.ids.compute_identity, &self.ids.runner_identity] {
            let statements = self.identities.statements(identity)?;
            self.identities.audit_statements(identity, &statements)?;
        }
        Ok(())
    }

    pub fn audit(&self) -> ReachabilityAudit {
        self.reachability.audit()
    }

    pub fn ids(&self) -> &EnclaveIds {
        &self.ids
    }

    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    pub fn reachability(&self) -> &ReachabilityPolicy {
        &self.reachability
    }

    pub fn identities(&self) -> &IdentityResolver {
        &self.identities
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Graph with unresolved references rendered as `{"ref": "Id.Attr"}`
    pub fn plan(&self) -> Value {
        self.graph.render_plan()
    }
}

fn compute_spec(mut spec: ComputeUnitSpec, config: &crate::config::ComputeConfig) -> ComputeUnitSpec {
    spec.runtime = config.runtime.clone();
    spec.handler = config.handler.clone();
    spec.timeout_secs = config.timeout_secs;
    spec.memory_mib = config.memory_mib;
    spec
}

fn cluster_spec(id: ResourceId, config: &EnvironmentConfig) -> SearchClusterSpec {
    let data = &config.data_store;
    let mut spec = SearchClusterSpec::new(id, data.domain_name.clone())
        .annotate(Annotation::new(
            "AwsSolutions-OS3",
            "OpenSearch domain can only be accessed from the Lambda security group. IP allow-listing is not required.",
        ))
        .annotate(Annotation::new(
            "AwsSolutions-OS4",
            "Dedicated master nodes are not critical for a small proof of concept",
        ))
        .annotate(Annotation::new(
            "AwsSolutions-OS9",
            "SEARCH_SLOW_LOGS and INDEX_SLOW_LOGS are not critical for a small proof of concept",
        ));
    spec.engine_version = data.engine_version.clone();
    spec.data_nodes = data.data_nodes;
    spec.instance_type = data.instance_type.clone();
    spec.zone_awareness = data.zone_awareness;
    spec.volume = VolumeSpec {
        size_gib: data.volume_size_gib,
        volume_type: data.volume_type.clone(),
    };
    spec.multi_az_with_standby = data.multi_az_with_standby;
    spec.enable_version_upgrade = data.enable_version_upgrade;
    spec
}

fn runner_spec(id: ResourceId, config: &EnvironmentConfig) -> AutomationRunnerSpec {
    let runner = &config.runner;
    let mut spec = AutomationRunnerSpec::new(id, runner.project_name.clone());
    spec.build_image = runner.build_image.clone();
    spec.compute_type = runner.compute_type.clone();
    spec.timeout_minutes = runner.timeout_minutes;
    spec.install_commands = runner.install_commands.clone();
    spec.apply_commands = runner.apply_commands.clone();
    spec.config_object_key = runner.config_object_key.clone();
    spec
}
