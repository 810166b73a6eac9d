// Copyright (c) 2025 - Cowboy AI, Inc.
//! Environment configuration
//!
//! Everything that is data rather than design: sizes, versions, artifact
//! locations, command sequences. Loaded from a JSON file, then overridden
//! from `SEARCH_ENCLAVE_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{EnclaveError, EnclaveResult};

/// Prefix of every override variable
pub const ENV_PREFIX: &str = "SEARCH_ENCLAVE_";

/// Network fabric settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub cidr: String,
    /// Zones the fabric spans
    pub max_zones: u8,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            cidr: "10.0.0.0/16".to_string(),
            max_zones: 3,
        }
    }
}

/// Search cluster sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataStoreConfig {
    pub domain_name: String,
    pub engine_version: String,
    pub data_nodes: u32,
    pub instance_type: String,
    pub zone_awareness: u8,
    pub volume_size_gib: u32,
    pub volume_type: String,
    pub multi_az_with_standby: bool,
    pub enable_version_upgrade: bool,
}

impl Default for DataStoreConfig {
    fn default() -> Self {
        Self {
            domain_name: "search-enclave".to_string(),
            engine_version: "OpenSearch_2.15".to_string(),
            data_nodes: 2,
            instance_type: "r7g.large.search".to_string(),
            zone_awareness: 2,
            volume_size_gib: 10,
            volume_type: "gp3".to_string(),
            multi_az_with_standby: false,
            enable_version_upgrade: true,
        }
    }
}

/// Shared library layer artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub code_location: String,
    pub compatible_runtimes: Vec<String>,
}

/// One compute unit's artifact and limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeConfig {
    pub code_location: String,
    pub runtime: String,
    pub handler: String,
    pub timeout_secs: u32,
    pub memory_mib: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<LayerConfig>,
}

impl ComputeConfig {
    pub fn migration_default() -> Self {
        Self {
            code_location: "app/openSearchMigration/target/openSearchMigration-1.0-SNAPSHOT.jar"
                .to_string(),
            runtime: "java17".to_string(),
            handler: "example.Handler::handleRequest".to_string(),
            timeout_secs: 60,
            memory_mib: 256,
            layer: None,
        }
    }

    pub fn query_default() -> Self {
        Self {
            code_location: "lambdas/opensearch_query".to_string(),
            runtime: "python3.12".to_string(),
            handler: "opensearch_query.lambda_handler".to_string(),
            timeout_secs: 60,
            memory_mib: 256,
            layer: Some(LayerConfig {
                code_location: "lambda_layer/layer_content.zip".to_string(),
                compatible_runtimes: vec!["python3.12".to_string()],
            }),
        }
    }
}

/// Automation runner settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub project_name: String,
    pub build_image: String,
    pub compute_type: String,
    pub timeout_minutes: u32,
    pub install_commands: Vec<String>,
    pub apply_commands: Vec<String>,
    /// Object the runner fetches from the configuration store
    pub config_object_key: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            project_name: "TerraformCodeBuildProject".to_string(),
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
            config_object_key: "opensearch_index.tf".to_string(),
        }
    }
}

/// Complete environment configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Environment name, used for logging only
    pub name: String,
    pub region: String,
    pub account: String,
    pub network: NetworkConfig,
    pub data_store: DataStoreConfig,
    pub migration: ComputeConfig,
    pub query: ComputeConfig,
    pub runner: RunnerConfig,
    /// Directory whose files seed the configuration store
    pub config_seed_dir: PathBuf,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            name: "search-enclave".to_string(),
            region: "us-east-2".to_string(),
            account: "123456789012".to_string(),
            network: NetworkConfig::default(),
            data_store: DataStoreConfig::default(),
            migration: ComputeConfig::migration_default(),
            query: ComputeConfig::query_default(),
            runner: RunnerConfig::default(),
            config_seed_dir: PathBuf::from("terraform"),
        }
    }
}

impl EnvironmentConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> EnclaveResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EnclaveError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            EnclaveError::Configuration(format!("cannot parse {}: {}", path.display(), e))
        })
    }

    /// Override fields from `SEARCH_ENCLAVE_*` variables in the process environment
    pub fn apply_env_overrides(&mut self) -> EnclaveResult<()> {
        self.apply_overrides(std::env::vars())
    }

    /// Override fields from `SEARCH_ENCLAVE_*` pairs
    ///
    /// Unknown variables are ignored; unparsable values are rejected.
    pub fn apply_overrides<I, K, V>(&mut self, vars: I) -> EnclaveResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in vars {
            let Some(field) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.into();
            match field {
                "NAME" => self.name = value,
                "REGION" => self.region = value,
                "ACCOUNT" => self.account = value,
                "CIDR" => self.network.cidr = value,
                "MAX_ZONES" => self.network.max_zones = parse(field, &value)?,
                "DOMAIN_NAME" => self.data_store.domain_name = value,
                "ENGINE_VERSION" => self.data_store.engine_version = value,
                "DATA_NODES" => self.data_store.data_nodes = parse(field, &value)?,
                "INSTANCE_TYPE" => self.data_store.instance_type = value,
                "ZONE_AWARENESS" => self.data_store.zone_awareness = parse(field, &value)?,
                "VOLUME_SIZE_GIB" => self.data_store.volume_size_gib = parse(field, &value)?,
                "MIGRATION_CODE" => self.migration.code_location = value,
                "QUERY_CODE" => self.query.code_location = value,
                "PROJECT_NAME" => self.runner.project_name = value,
                "CONFIG_OBJECT_KEY" => self.runner.config_object_key = value,
                "CONFIG_SEED_DIR" => self.config_seed_dir = PathBuf::from(value),
                _ => {}
            }
        }
        Ok(())
    }

    /// Reject settings that cannot describe any environment
    pub fn validate(&self) -> EnclaveResult<()> {
        let required = [
            ("name", &self.name),
            ("region", &self.region),
            ("account", &self.account),
            ("data_store.domain_name", &self.data_store.domain_name),
            ("migration.code_location", &self.migration.code_location),
            ("query.code_location", &self.query.code_location),
            ("runner.project_name", &self.runner.project_name),
            ("runner.config_object_key", &self.runner.config_object_key),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(EnclaveError::Configuration(format!("{} is empty", field)));
            }
        }
        if !(self.account.len() == 12 && self.account.chars().all(|c| c.is_ascii_digit())) {
            return Err(EnclaveError::Configuration(format!(
                "account {} is not a 12-digit id",
                self.account
            )));
        }
        if self.network.max_zones == 0 {
            return Err(EnclaveError::Configuration(
                "network.max_zones must be positive".to_string(),
            ));
        }
        if self.data_store.zone_awareness > self.network.max_zones {
            return Err(EnclaveError::Configuration(format!(
                "data_store.zone_awareness {} exceeds network.max_zones {}",
                self.data_store.zone_awareness, self.network.max_zones
            )));
        }
        if self.data_store.data_nodes == 0 {
            return Err(EnclaveError::Configuration(
                "data_store.data_nodes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(field: &str, value: &str) -> EnclaveResult<T> {
    value.parse().map_err(|_| {
        EnclaveError::Configuration(format!("{}{} has invalid value {:?}", ENV_PREFIX, field, value))
    })
}
