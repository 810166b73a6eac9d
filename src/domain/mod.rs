// Copyright (c) 2025 - Cowboy AI, Inc.
//! Enclave Domain Models
//!
//! Declarative value objects for every component of a network-isolated
//! search enclave, plus the pure invariant functions that gate them.
//!
//! # Components (leaves first)
//!
//! - [`NetworkFabricSpec`] - isolated network, private and public subnets per zone
//! - [`ReachabilityPolicy`] - endpoint groups and permitted flows
//! - [`IdentityResolver`] - roles, trust statements, least-privilege grants
//! - [`SearchClusterSpec`] - encrypted, zone-aware search domain
//! - [`ComputeUnitSpec`] - migration and query functions
//! - [`AutomationRunnerSpec`] - triggerable build environment
//! - [`ConfigStoreSpec`] - seeded configuration bucket
//!
//! Every spec validates itself and then records its resources in a
//! [`GraphBuilder`](crate::graph::GraphBuilder), returning a handle whose
//! output references later declarations consume.

pub mod annotations;
pub mod automation;
pub mod compute;
pub mod config_store;
pub mod data_store;
pub mod identity;
pub mod invariants;
pub mod network;
pub mod reachability;
pub mod resource_type;

use thiserror::Error;

use crate::graph::GraphError;

pub use annotations::Annotation;
pub use automation::{AutomationHandle, AutomationRunnerSpec, RunPhase};
pub use compute::{ComputeHandle, ComputeUnitSpec, ComputeVariant, EndpointFormat};
pub use config_store::{ConfigObject, ConfigStoreHandle, ConfigStoreSpec};
pub use data_store::{DataStoreHandle, SearchClusterSpec};
pub use identity::{
    Effect, IdentityHandle, IdentityResolver, PolicyStatement, Principal, ResourcePattern,
};
pub use invariants::{ValidationError, ValidationResult};
pub use network::{Cidr, NetworkError, NetworkFabricSpec, NetworkHandle, Placement, SubnetKind};
pub use reachability::{
    Direction, EndpointGroup, PermittedFlow, Protocol, ReachabilityAudit, ReachabilityHandle,
    ReachabilityPolicy, RenderedRule,
};
pub use resource_type::{Attribute, ResourceCategory, ResourceKind};

/// Failure while recording a declaration in the graph
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeclareError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}
