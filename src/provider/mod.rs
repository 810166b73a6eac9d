// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provisioning Engine Seam
//!
//! The cloud provider that actually creates resources is an external
//! collaborator. The core talks to it through [`CloudProvider`]: it is
//! assumed idempotent and queryable, and it reports failures rather than
//! retrying them.
//!
//! Every record the provider keeps carries its own lifecycle state machine,
//! so the history of a resource (created, updated, failed, retried) can be
//! inspected after the fact.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::automation::RunPhase;
use crate::domain::resource_type::{Attribute, ResourceKind};
use crate::errors::ProviderError;
use crate::graph::ResourceId;
use crate::state_machine::{ResourceStatus, StateMachineWithHistory};

pub use memory::InMemoryProvider;

/// Desired state of one resource, with every reference resolved
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRequest {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub properties: Value,
    pub dependencies: BTreeSet<ResourceId>,
}

/// Provider-side record of a materialized resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub properties: Value,
    pub dependencies: BTreeSet<ResourceId>,
    pub outputs: BTreeMap<Attribute, String>,
    pub lifecycle: StateMachineWithHistory<ResourceStatus>,
}

impl ResourceRecord {
    pub fn status(&self) -> ResourceStatus {
        *self.lifecycle.current_state()
    }

    /// True when the record already matches the request
    ///
    /// Dependencies count: teardown ordering reads them from the record.
    pub fn matches(&self, request: &ResourceRequest) -> bool {
        self.status().is_available()
            && self.kind == request.kind
            && self.properties == request.properties
            && self.dependencies == request.dependencies
    }
}

/// Outcome of one automation phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseOutcome {
    pub phase: RunPhase,
    pub commands: Vec<String>,
    pub succeeded: bool,
}

/// Final status of an automation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BuildStatus {
    Succeeded,
    /// The run failed as a whole; later phases did not execute
    Failed { phase: RunPhase, reason: String },
}

/// One execution of a build project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRun {
    pub build_id: String,
    pub project: ResourceId,
    /// Parameters the run was started with
    pub environment: BTreeMap<String, String>,
    pub phases: Vec<PhaseOutcome>,
    pub status: BuildStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BuildRun {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, BuildStatus::Succeeded)
    }

    pub fn failed_phase(&self) -> Option<RunPhase> {
        match &self.status {
            BuildStatus::Succeeded => None,
            BuildStatus::Failed { phase, .. } => Some(*phase),
        }
    }
}

/// External provisioning engine
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Materialize a resource
    ///
    /// Every dependency must already be available. A record left in
    /// `Failed` by an earlier run is retried.
    async fn create(&self, request: ResourceRequest) -> Result<ResourceRecord, ProviderError>;

    /// Converge an available resource onto new properties
    async fn update(&self, request: ResourceRequest) -> Result<ResourceRecord, ProviderError>;

    /// Remove a resource
    ///
    /// Refused while a live resource still depends on it.
    async fn delete(&self, id: &ResourceId) -> Result<(), ProviderError>;

    async fn get(&self, id: &ResourceId) -> Result<Option<ResourceRecord>, ProviderError>;

    /// Every live record
    async fn list(&self) -> Result<Vec<ResourceRecord>, ProviderError>;

    /// Start one run of a build project and wait for it to finish
    async fn start_build(&self, project: &ResourceId) -> Result<BuildRun, ProviderError>;
}
