// Copyright (c) 2025 - Cowboy AI, Inc.
//! Automation Runner Provisioner
//!
//! A triggerable build environment inside the private subnets. It is
//! parameterized with the data store endpoint, the assumable identity the
//! apply tool acts through, and the configuration store's name. Each run
//! executes three phases in order:
//!
//! 1. `install`: fetch the apply tool
//! 2. `fetch`: copy the configuration object out of the store
//! 3. `apply`: apply it against the data store
//!
//! The command text is opaque; only the fetch step is derived from the
//! declaration, because it names the configuration object.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::annotations::Annotation;
use crate::domain::config_store::{ConfigStoreHandle, ConfigStoreSpec};
use crate::domain::data_store::DataStoreHandle;
use crate::domain::identity::{
    IdentityHandle, PolicyStatement, ResourcePattern, LOG_DELIVERY_ACTIONS,
    NETWORK_ATTACHMENT_ACTIONS,
};
use crate::domain::invariants::{
    validate_private_placement, validate_range, ValidationError, ValidationResult,
};
use crate::domain::network::Placement;
use crate::domain::resource_type::{Attribute, ResourceKind};
use crate::domain::DeclareError;
use crate::graph::{GraphBuilder, OutputRef, PropertyValue, ResourceId, ResourceNode};

/// Step of an automation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Install,
    Fetch,
    Apply,
}

impl RunPhase {
    /// Execution order
    pub const ALL: [RunPhase; 3] = [RunPhase::Install, RunPhase::Fetch, RunPhase::Apply];

    /// Phase name in the rendered build specification
    pub fn build_phase(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Fetch => "pre_build",
            Self::Apply => "build",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install => write!(f, "install"),
            Self::Fetch => write!(f, "fetch"),
            Self::Apply => write!(f, "apply"),
        }
    }
}

/// Declared automation runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomationRunnerSpec {
    pub id: ResourceId,
    pub project_name: String,
    pub build_image: String,
    pub compute_type: String,
    pub timeout_minutes: u32,
    pub install_commands: Vec<String>,
    pub apply_commands: Vec<String>,
    pub working_dir: String,
    /// Fixed key of the object read from the configuration store
    pub config_object_key: String,
    pub endpoint_variable: String,
    pub identity_variable: String,
    pub store_variable: String,
    pub annotations: Vec<Annotation>,
}

impl AutomationRunnerSpec {
    pub fn new(id: ResourceId, project_name: impl Into<String>) -> Self {
        Self {
            id,
            project_name: project_name.into(),
            build_image: "aws/codebuild/standard:7.0".to_string(),
            compute_type: "BUILD_GENERAL1_SMALL".to_string(),
            timeout_minutes: 60,
            install_commands: vec![
                "curl -s -qL -o terraform.zip https://releases.hashicorp.com/terraform/1.10.0/terraform_1.10.0_linux_amd64.zip".to_string(),
                "unzip -o terraform.zip".to_string(),
                "mv terraform /bin".to_string(),
                "rm terraform.zip".to_string(),
            ],
            apply_commands: vec![
                "terraform init".to_string(),
                "terraform apply -auto-approve".to_string(),
            ],
            working_dir: "${CODEBUILD_SRC_DIR}/${CODE_SRC_DIR}".to_string(),
            config_object_key: "opensearch_index.tf".to_string(),
            endpoint_variable: "TF_VAR_OpenSearchDomainEndpoint".to_string(),
            identity_variable: "TF_VAR_IAMRoleARN".to_string(),
            store_variable: "TERRAFORM_S3_BUCKET".to_string(),
            annotations: Vec::new(),
        }
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Commands executed in one phase
    pub fn commands(&self, phase: RunPhase) -> Vec<String> {
        match phase {
            RunPhase::Install => self.install_commands.clone(),
            RunPhase::Fetch => vec![
                format!("cd {}", self.working_dir),
                format!(
                    "aws s3 cp s3://${{{}}}/{} .",
                    self.store_variable, self.config_object_key
                ),
            ],
            RunPhase::Apply => self.apply_commands.clone(),
        }
    }

    /// Check the declaration against its placement and the store it reads
    pub fn validate(&self, store: &ConfigStoreSpec, placement: &Placement) -> ValidationResult {
        let resource = self.id.as_str();
        if self.apply_commands.is_empty() {
            return Err(ValidationError::EmptyCommandSequence {
                resource: resource.to_string(),
            });
        }
        if !store.contains(&self.config_object_key) {
            return Err(ValidationError::MissingConfigObject {
                key: self.config_object_key.clone(),
            });
        }
        validate_range(resource, "timeout_minutes", u64::from(self.timeout_minutes), 5, 2160)?;
        validate_private_placement(resource, placement)
    }

    /// Permissions the runner's own identity needs
    pub fn required_statements(&self, store: &ConfigStoreHandle) -> Vec<PolicyStatement> {
        let mut statements = store.read_statements();
        statements.extend([
            PolicyStatement::allow(NETWORK_ATTACHMENT_ACTIONS.iter().copied(), [ResourcePattern::Any])
                .justified("Network interface actions do not support resource-level permissions"),
            PolicyStatement::allow(LOG_DELIVERY_ACTIONS.iter().copied(), [ResourcePattern::Any])
                .justified("Build logs are delivered to log groups created at run time"),
        ]);
        statements
    }

    /// Record the build project
    ///
    /// `identity` is the runner's own role; `target` is the identity the
    /// apply tool acts through, injected by its assumable-role identifier.
    /// The project is sequenced after the store is seeded.
    #[allow(clippy::too_many_arguments)]
    pub fn declare(
        &self,
        graph: &mut GraphBuilder,
        placement: &Placement,
        group: OutputRef,
        identity: &IdentityHandle,
        target: &IdentityHandle,
        data_store: &DataStoreHandle,
        store: &ConfigStoreHandle,
    ) -> Result<AutomationHandle, DeclareError> {
        validate_private_placement(self.id.as_str(), placement)?;

        let phases = PropertyValue::map(RunPhase::ALL.iter().map(|phase| {
            (
                phase.build_phase(),
                PropertyValue::map([("commands", PropertyValue::list(self.commands(*phase)))]),
            )
        }));

        graph.add(
            ResourceNode::new(self.id.clone(), ResourceKind::BuildProject)
                .with("project_name", self.project_name.clone())
                .with(
                    "environment",
                    PropertyValue::map([
                        ("build_image", PropertyValue::from(&self.build_image)),
                        ("compute_type", PropertyValue::from(&self.compute_type)),
                        (
                            "variables",
                            PropertyValue::map([
                                (self.endpoint_variable.clone(), PropertyValue::from(data_store.endpoint())),
                                (self.identity_variable.clone(), PropertyValue::from(target.arn())),
                                (self.store_variable.clone(), PropertyValue::from(store.name())),
                            ]),
                        ),
                    ]),
                )
                .with("service_role", identity.arn())
                .with("timeout_in_minutes", self.timeout_minutes)
                .with(
                    "vpc_config",
                    PropertyValue::map([
                        ("vpc_subnets", placement.subnet_ids()),
                        ("security_group_ids", PropertyValue::list([group])),
                    ]),
                )
                .with(
                    "build_spec",
                    PropertyValue::map([
                        ("version", PropertyValue::from("0.2")),
                        ("phases", phases),
                    ]),
                )
                .after(identity.policy.clone())
                .after(store.deployment.clone())
                .annotated(self.annotations.clone()),
        )?;

        Ok(AutomationHandle {
            id: self.id.clone(),
            project_name: self.project_name.clone(),
        })
    }
}

/// Handle returned from declaring the runner
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AutomationHandle {
    pub id: ResourceId,
    pub project_name: String,
}

impl AutomationHandle {
    pub fn arn(&self) -> OutputRef {
        self.id.output(Attribute::Arn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config_store::ConfigObject;
    use crate::domain::network::{Cidr, NetworkFabricSpec, SubnetKind};

    fn id(s: &str) -> ResourceId {
        ResourceId::new(s).unwrap()
    }

    fn seeded_store() -> ConfigStoreSpec {
        ConfigStoreSpec::new(id("ConfigBucket"))
            .with_object(ConfigObject::new("opensearch_index.tf", "resource {}"))
    }

    #[test]
    fn test_fetch_names_config_object() {
        let spec = AutomationRunnerSpec::new(id("Runner"), "TerraformCodeBuildProject");
        assert_eq!(
            spec.commands(RunPhase::Fetch)[1],
            "aws s3 cp s3://${TERRAFORM_S3_BUCKET}/opensearch_index.tf ."
        );
    }

    #[test]
    fn test_missing_config_object_rejected() {
        let mut graph = GraphBuilder::new();
        let network = NetworkFabricSpec::new(id("Vpc"), Cidr::parse("10.0.0.0/16").unwrap(), "us-east-2", 2)
            .unwrap()
            .declare(&mut graph)
            .unwrap();
        let placement = network.placement(SubnetKind::PrivateWithEgress, None);

        let mut spec = AutomationRunnerSpec::new(id("Runner"), "TerraformCodeBuildProject");
        assert!(spec.validate(&seeded_store(), &placement).is_ok());

        spec.config_object_key = "missing.tf".to_string();
        assert_eq!(
            spec.validate(&seeded_store(), &placement),
            Err(ValidationError::MissingConfigObject {
                key: "missing.tf".to_string()
            })
        );
    }

    #[test]
    fn test_empty_apply_rejected() {
        let mut graph = GraphBuilder::new();
        let network = NetworkFabricSpec::new(id("Vpc"), Cidr::parse("10.0.0.0/16").unwrap(), "us-east-2", 2)
            .unwrap()
            .declare(&mut graph)
            .unwrap();
        let mut spec = AutomationRunnerSpec::new(id("Runner"), "TerraformCodeBuildProject");
        spec.apply_commands.clear();
        assert!(matches!(
            spec.validate(&seeded_store(), &network.placement(SubnetKind::PrivateWithEgress, None)),
            Err(ValidationError::EmptyCommandSequence { .. })
        ));
    }
}
