// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for enclave provisioning
//!
//! Errors fall into three classes:
//!
//! 1. **Dependency resolution** ([`GraphError`]) - a declaration references a
//!    resource or output slot that does not exist, or a value that has not
//!    been materialized yet.
//! 2. **Policy violation** ([`ValidationError`]) - a declaration breaks a
//!    baseline invariant and is rejected before anything is materialized.
//! 3. **Provider failure** ([`ProviderError`]) - the external provisioning
//!    engine refused or failed an operation; the run is aborted.
//!
//! Automation run failures are not errors at this layer; they are reported
//! as a failed [`crate::provider::BuildRun`].

use thiserror::Error;

use crate::domain::invariants::ValidationError;
use crate::domain::DeclareError;
use crate::domain::network::NetworkError;
use crate::graph::GraphError;
use crate::state_machine::TransitionError;

/// Errors raised by the external provisioning engine
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Resource creation failed
    #[error("Failed to create {resource}: {reason}")]
    CreateFailed { resource: String, reason: String },

    /// Resource update failed
    #[error("Failed to update {resource}: {reason}")]
    UpdateFailed { resource: String, reason: String },

    /// Resource deletion failed
    #[error("Failed to delete {resource}: {reason}")]
    DeleteFailed { resource: String, reason: String },

    /// Deleting the resource would leave a live dependent dangling
    #[error("Cannot delete {resource}: still referenced by {dependent}")]
    StillReferenced { resource: String, dependent: String },

    /// Resource is not known to the provider
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Lifecycle transition rejected
    #[error("Lifecycle error on {resource}: {source}")]
    Lifecycle {
        resource: String,
        #[source]
        source: TransitionError,
    },

    /// Provider state could not be read or written
    #[error("State storage error: {0}")]
    State(String),
}

/// Umbrella error for enclave operations
#[derive(Debug, Error)]
pub enum EnclaveError {
    /// Network value object error
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Declaration violates a baseline invariant
    #[error("Policy violation: {0}")]
    PolicyViolation(#[from] ValidationError),

    /// Dependency resolution failed
    #[error("Dependency resolution error: {0}")]
    Dependency(#[from] GraphError),

    /// Provisioning engine failure
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Event publishing error
    #[error("Event publish error: {0}")]
    Publish(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),
}

/// Result type for enclave operations
pub type EnclaveResult<T> = Result<T, EnclaveError>;

impl From<DeclareError> for EnclaveError {
    fn from(err: DeclareError) -> Self {
        match err {
            DeclareError::Network(e) => EnclaveError::Network(e),
            DeclareError::Graph(e) => EnclaveError::Dependency(e),
            DeclareError::Validation(e) => EnclaveError::PolicyViolation(e),
        }
    }
}

impl From<serde_json::Error> for EnclaveError {
    fn from(err: serde_json::Error) -> Self {
        EnclaveError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for EnclaveError {
    fn from(err: std::io::Error) -> Self {
        EnclaveError::Io(err.to_string())
    }
}

#[cfg(feature = "nats")]
impl From<async_nats::Error> for EnclaveError {
    fn from(err: async_nats::Error) -> Self {
        EnclaveError::Publish(err.to_string())
    }
}
