// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-memory provisioning engine
//!
//! Deterministic stand-in for the cloud provider. Identifiers, ARNs and
//! endpoints are derived from the logical id, so repeated runs against the
//! same state see the same values. State can be persisted to a JSON file
//! between CLI invocations.
//!
//! Failures can be injected per resource ([`InMemoryProvider::fail_create`])
//! and per build phase ([`InMemoryProvider::fail_build`]).

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{BuildRun, BuildStatus, CloudProvider, PhaseOutcome, ResourceRecord, ResourceRequest};
use crate::domain::automation::RunPhase;
use crate::domain::resource_type::{Attribute, ResourceKind};
use crate::errors::{EnclaveResult, ProviderError};
use crate::graph::ResourceId;
use crate::state_machine::{
    LifecycleCommand, ResourceStatus, StateMachineWithHistory, TransitionError,
};

#[derive(Debug, Default)]
struct Faults {
    create: BTreeSet<ResourceId>,
    build: BTreeMap<ResourceId, (RunPhase, String)>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProviderState {
    resources: BTreeMap<ResourceId, ResourceRecord>,
    builds: Vec<BuildRun>,
    #[serde(skip)]
    faults: Faults,
}

/// Persisted form of the provider
#[derive(Serialize, Deserialize)]
struct StateFile {
    region: String,
    account: String,
    #[serde(flatten)]
    state: ProviderState,
}

/// Deterministic in-memory provider
#[derive(Debug, Clone)]
pub struct InMemoryProvider {
    region: String,
    account: String,
    state: Arc<Mutex<ProviderState>>,
}

impl InMemoryProvider {
    pub fn new(region: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            account: account.into(),
            state: Arc::new(Mutex::new(ProviderState::default())),
        }
    }

    /// Load persisted state
    pub fn load(path: impl AsRef<Path>) -> EnclaveResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: StateFile = serde_json::from_str(&content)?;
        Ok(Self {
            region: file.region,
            account: file.account,
            state: Arc::new(Mutex::new(file.state)),
        })
    }

    /// Load persisted state, or start empty when the file does not exist
    pub fn open(
        path: impl AsRef<Path>,
        region: impl Into<String>,
        account: impl Into<String>,
    ) -> EnclaveResult<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::new(region, account))
        }
    }

    /// Persist the current state
    pub async fn save(&self, path: impl AsRef<Path>) -> EnclaveResult<()> {
        let state = self.state.lock().await;
        let file = StateFile {
            region: self.region.clone(),
            account: self.account.clone(),
            state: ProviderState {
                resources: state.resources.clone(),
                builds: state.builds.clone(),
                faults: Faults::default(),
            },
        };
        std::fs::write(path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Make every create of `id` fail until faults are cleared
    pub async fn fail_create(&self, id: ResourceId) {
        self.state.lock().await.faults.create.insert(id);
    }

    /// Make runs of `project` fail in `phase` until faults are cleared
    pub async fn fail_build(&self, project: ResourceId, phase: RunPhase, reason: impl Into<String>) {
        self.state
            .lock()
            .await
            .faults
            .build
            .insert(project, (phase, reason.into()));
    }

    pub async fn clear_faults(&self) {
        self.state.lock().await.faults = Faults::default();
    }

    /// Every run started so far, oldest first
    pub async fn builds(&self) -> Vec<BuildRun> {
        self.state.lock().await.builds.clone()
    }

    fn token(&self, id: &ResourceId) -> String {
        let seed = format!("{}/{}/{}", self.account, self.region, id);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes())
            .simple()
            .to_string()
    }

    fn physical_name(&self, request: &ResourceRequest, token: &str) -> String {
        let short = &token[..8];
        match request.kind {
            ResourceKind::SearchDomain => string_property(&request.properties, "domain_name")
                .unwrap_or_else(|| request.id.as_str().to_lowercase()),
            ResourceKind::BuildProject => string_property(&request.properties, "project_name")
                .unwrap_or_else(|| request.id.to_string()),
            ResourceKind::Bucket => format!("{}-{}", request.id.as_str().to_lowercase(), short),
            ResourceKind::Role | ResourceKind::Function => format!("{}-{}", request.id, short),
            _ => request.id.to_string(),
        }
    }

    fn arn(&self, kind: ResourceKind, name: &str) -> String {
        let (region, account) = (&self.region, &self.account);
        match kind {
            ResourceKind::Role => format!("arn:aws:iam::{}:role/{}", account, name),
            ResourceKind::SearchDomain => format!("arn:aws:es:{}:{}:domain/{}", region, account, name),
            ResourceKind::Function => {
                format!("arn:aws:lambda:{}:{}:function:{}", region, account, name)
            }
            ResourceKind::FunctionLayer => {
                format!("arn:aws:lambda:{}:{}:layer:{}:1", region, account, name)
            }
            ResourceKind::Bucket => format!("arn:aws:s3:::{}", name),
            ResourceKind::BuildProject => {
                format!("arn:aws:codebuild:{}:{}:project/{}", region, account, name)
            }
            other => format!("arn:aws:{}:{}:{}:{}", other, region, account, name),
        }
    }

    fn id_prefix(kind: ResourceKind) -> &'static str {
        match kind {
            ResourceKind::Network => "vpc",
            ResourceKind::Subnet => "subnet",
            ResourceKind::SecurityGroup => "sg",
            ResourceKind::SecurityGroupIngress | ResourceKind::SecurityGroupEgress => "sgr",
            ResourceKind::RolePolicy => "policy",
            ResourceKind::BucketPolicy => "bucketpolicy",
            ResourceKind::BucketDeployment => "deployment",
            _ => "res",
        }
    }

    /// Output slots for a materialized resource
    fn outputs_for(&self, request: &ResourceRequest) -> BTreeMap<Attribute, String> {
        let token = self.token(&request.id);
        let name = self.physical_name(request, &token);
        request
            .kind
            .outputs()
            .iter()
            .map(|attribute| {
                let value = match attribute {
                    Attribute::Id => format!("{}-{}", Self::id_prefix(request.kind), &token[..17]),
                    Attribute::Arn => self.arn(request.kind, &name),
                    Attribute::Name => name.clone(),
                    Attribute::UniqueId => format!("AROA{}", token[..17].to_uppercase()),
                    Attribute::Endpoint => format!(
                        "vpc-{}-{}.{}.es.amazonaws.com",
                        name,
                        &token[..26],
                        self.region
                    ),
                    Attribute::CidrBlock => {
                        string_property(&request.properties, "cidr_block").unwrap_or_default()
                    }
                    Attribute::Zone => {
                        string_property(&request.properties, "zone").unwrap_or_default()
                    }
                };
                (*attribute, value)
            })
            .collect()
    }
}

fn string_property(properties: &Value, key: &str) -> Option<String> {
    properties.get(key).and_then(Value::as_str).map(str::to_string)
}

fn lifecycle_error(resource: &ResourceId) -> impl FnOnce(TransitionError) -> ProviderError + '_ {
    move |source| ProviderError::Lifecycle {
        resource: resource.to_string(),
        source,
    }
}

#[async_trait]
impl CloudProvider for InMemoryProvider {
    async fn create(&self, request: ResourceRequest) -> Result<ResourceRecord, ProviderError> {
        let mut state = self.state.lock().await;

        for dependency in &request.dependencies {
            let available = state
                .resources
                .get(dependency)
                .map(|r| r.status().is_available())
                .unwrap_or(false);
            if !available {
                return Err(ProviderError::CreateFailed {
                    resource: request.id.to_string(),
                    reason: format!("dependency {} is not available", dependency),
                });
            }
        }

        let mut lifecycle = match state.resources.get(&request.id) {
            None => StateMachineWithHistory::new(ResourceStatus::Pending),
            Some(existing) if existing.status() == ResourceStatus::Failed => {
                existing.lifecycle.clone()
            }
            Some(existing) => {
                return Err(ProviderError::CreateFailed {
                    resource: request.id.to_string(),
                    reason: format!("resource is already {}", existing.status()),
                })
            }
        };

        let now = Utc::now();
        lifecycle
            .transition_with_history(LifecycleCommand::BeginCreate, now)
            .map_err(lifecycle_error(&request.id))?;

        if state.faults.create.contains(&request.id) {
            lifecycle
                .transition_with_history(LifecycleCommand::Fail, now)
                .map_err(lifecycle_error(&request.id))?;
            warn!(resource = %request.id, "Injected create failure");
            let id = request.id.clone();
            state.resources.insert(
                id.clone(),
                ResourceRecord {
                    id: request.id,
                    kind: request.kind,
                    properties: request.properties,
                    dependencies: request.dependencies,
                    outputs: BTreeMap::new(),
                    lifecycle,
                },
            );
            return Err(ProviderError::CreateFailed {
                resource: id.to_string(),
                reason: "provider rejected the request".to_string(),
            });
        }

        lifecycle
            .transition_with_history(LifecycleCommand::Complete, now)
            .map_err(lifecycle_error(&request.id))?;

        let record = ResourceRecord {
            outputs: self.outputs_for(&request),
            id: request.id,
            kind: request.kind,
            properties: request.properties,
            dependencies: request.dependencies,
            lifecycle,
        };
        debug!(resource = %record.id, kind = %record.kind, "Created");
        state.resources.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn update(&self, request: ResourceRequest) -> Result<ResourceRecord, ProviderError> {
        let mut state = self.state.lock().await;
        let outputs = self.outputs_for(&request);

        let record = state
            .resources
            .get_mut(&request.id)
            .ok_or_else(|| ProviderError::NotFound(request.id.to_string()))?;
        if record.kind != request.kind {
            return Err(ProviderError::UpdateFailed {
                resource: request.id.to_string(),
                reason: format!("cannot change kind from {} to {}", record.kind, request.kind),
            });
        }

        let now = Utc::now();
        record
            .lifecycle
            .transition_with_history(LifecycleCommand::BeginUpdate, now)
            .map_err(lifecycle_error(&request.id))?;
        record
            .lifecycle
            .transition_with_history(LifecycleCommand::Complete, now)
            .map_err(lifecycle_error(&request.id))?;
        record.properties = request.properties;
        record.dependencies = request.dependencies;
        record.outputs = outputs;

        debug!(resource = %record.id, kind = %record.kind, "Updated");
        Ok(record.clone())
    }

    async fn delete(&self, id: &ResourceId) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;

        if let Some(dependent) = state
            .resources
            .values()
            .find(|r| r.id != *id && r.status().is_live() && r.dependencies.contains(id))
        {
            return Err(ProviderError::StillReferenced {
                resource: id.to_string(),
                dependent: dependent.id.to_string(),
            });
        }

        let record = state
            .resources
            .get_mut(id)
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;
        let now = Utc::now();
        record
            .lifecycle
            .transition_with_history(LifecycleCommand::BeginDelete, now)
            .map_err(lifecycle_error(id))?;
        record
            .lifecycle
            .transition_with_history(LifecycleCommand::Complete, now)
            .map_err(lifecycle_error(id))?;

        state.resources.remove(id);
        debug!(resource = %id, "Deleted");
        Ok(())
    }

    async fn get(&self, id: &ResourceId) -> Result<Option<ResourceRecord>, ProviderError> {
        Ok(self.state.lock().await.resources.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<ResourceRecord>, ProviderError> {
        Ok(self.state.lock().await.resources.values().cloned().collect())
    }

    async fn start_build(&self, project: &ResourceId) -> Result<BuildRun, ProviderError> {
        let mut state = self.state.lock().await;
        let record = state
            .resources
            .get(project)
            .filter(|r| r.kind == ResourceKind::BuildProject && r.status().is_available())
            .ok_or_else(|| ProviderError::NotFound(project.to_string()))?;

        let environment: BTreeMap<String, String> = record
            .properties
            .pointer("/environment/variables")
            .and_then(Value::as_object)
            .map(|vars| {
                vars.iter()
                    .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let name = record
            .outputs
            .get(&Attribute::Name)
            .cloned()
            .unwrap_or_else(|| project.to_string());
        let injected = state.faults.build.get(project).cloned();

        let started_at = Utc::now();
        let mut phases = Vec::new();
        let mut status = BuildStatus::Succeeded;
        for phase in RunPhase::ALL {
            let commands: Vec<String> = record
                .properties
                .pointer(&format!("/build_spec/phases/{}/commands", phase.build_phase()))
                .and_then(Value::as_array)
                .map(|cmds| {
                    cmds.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            let failure = match &injected {
                Some((failing, reason)) if *failing == phase => Some(reason.clone()),
                _ if commands.is_empty() && phase == RunPhase::Apply => {
                    Some("no commands to run".to_string())
                }
                _ if phase == RunPhase::Fetch => environment
                    .iter()
                    .find(|(_, v)| v.is_empty())
                    .map(|(k, _)| format!("parameter {} is empty", k)),
                _ => None,
            };

            phases.push(PhaseOutcome {
                phase,
                commands,
                succeeded: failure.is_none(),
            });
            if let Some(reason) = failure {
                status = BuildStatus::Failed { phase, reason };
                break;
            }
        }

        let run = BuildRun {
            build_id: format!("{}:{}", name, Uuid::now_v7()),
            project: project.clone(),
            environment,
            phases,
            status,
            started_at,
            finished_at: Utc::now(),
        };
        state.builds.push(run.clone());
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> ResourceId {
        ResourceId::new(s).unwrap()
    }

    fn request(name: &str, kind: ResourceKind, deps: &[&str]) -> ResourceRequest {
        ResourceRequest {
            id: id(name),
            kind,
            properties: json!({ "cidr_block": "10.0.0.0/16" }),
            dependencies: deps.iter().map(|d| id(d)).collect(),
        }
    }

    #[tokio::test]
    async fn test_outputs_are_deterministic() {
        let a = InMemoryProvider::new("us-east-2", "123456789012");
        let b = InMemoryProvider::new("us-east-2", "123456789012");
        let ra = a.create(request("Vpc", ResourceKind::Network, &[])).await.unwrap();
        let rb = b.create(request("Vpc", ResourceKind::Network, &[])).await.unwrap();
        assert_eq!(ra.outputs, rb.outputs);
        assert_eq!(ra.outputs[&Attribute::CidrBlock], "10.0.0.0/16");
        assert!(ra.outputs[&Attribute::Id].starts_with("vpc-"));
    }

    #[tokio::test]
    async fn test_create_requires_available_dependencies() {
        let provider = InMemoryProvider::new("us-east-2", "123456789012");
        let err = provider
            .create(request("Subnet", ResourceKind::Subnet, &["Vpc"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::CreateFailed { .. }));
    }

    #[tokio::test]
    async fn test_delete_refused_while_referenced() {
        let provider = InMemoryProvider::new("us-east-2", "123456789012");
        provider.create(request("Vpc", ResourceKind::Network, &[])).await.unwrap();
        provider
            .create(request("Subnet", ResourceKind::Subnet, &["Vpc"]))
            .await
            .unwrap();

        let err = provider.delete(&id("Vpc")).await.unwrap_err();
        assert_eq!(
            err,
            ProviderError::StillReferenced {
                resource: "Vpc".to_string(),
                dependent: "Subnet".to_string()
            }
        );

        provider.delete(&id("Subnet")).await.unwrap();
        provider.delete(&id("Vpc")).await.unwrap();
        assert!(provider.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_create_is_retried() {
        let provider = InMemoryProvider::new("us-east-2", "123456789012");
        provider.fail_create(id("Vpc")).await;
        assert!(provider.create(request("Vpc", ResourceKind::Network, &[])).await.is_err());
        let failed = provider.get(&id("Vpc")).await.unwrap().unwrap();
        assert_eq!(failed.status(), ResourceStatus::Failed);

        provider.clear_faults().await;
        let record = provider.create(request("Vpc", ResourceKind::Network, &[])).await.unwrap();
        assert_eq!(record.status(), ResourceStatus::Available);
        // BeginCreate, Fail, BeginCreate, Complete
        assert_eq!(record.lifecycle.transitions().len(), 4);
    }

    #[tokio::test]
    async fn test_state_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let provider = InMemoryProvider::new("us-east-2", "123456789012");
        let created = provider.create(request("Vpc", ResourceKind::Network, &[])).await.unwrap();
        provider.save(&path).await.unwrap();
        assert_eq!(provider.list().await.unwrap().len(), 1);

        let loaded = InMemoryProvider::load(&path).unwrap();
        assert_eq!(loaded.region(), "us-east-2");
        assert_eq!(loaded.get(&id("Vpc")).await.unwrap(), Some(created));
    }
}
