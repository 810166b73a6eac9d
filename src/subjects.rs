// Copyright (c) 2025 - Cowboy AI, Inc.

//! Subject hierarchy for provisioning events
//!
//! # Subject Pattern
//!
//! ```text
//! enclave.{scope}.{operation}
//! ```
//!
//! `scope` is a resource category (`network`, `reachability`, `identity`,
//! `data`, `compute`, `storage`, `automation`) or `run` for run boundaries.
//!
//! This allows for:
//! - Precise subscriptions (`enclave.data.created`)
//! - Scope-level wildcards (`enclave.identity.>`)
//! - Global subscriptions (`enclave.>`)
//!
//! # Examples
//!
//! ```rust
//! use cim_search_enclave::subjects::{Operation, SubjectBuilder, SubjectScope};
//!
//! let subject = SubjectBuilder::new()
//!     .scope(SubjectScope::Run)
//!     .operation(Operation::Completed)
//!     .build();
//! assert_eq!(subject, "enclave.run.completed");
//!
//! let wildcard = SubjectBuilder::new().scope(SubjectScope::Run).build();
//! assert_eq!(wildcard, "enclave.run.>");
//! ```

use std::fmt;

use crate::domain::resource_type::{ResourceCategory, ResourceKind};

/// Root namespace for all enclave subjects
pub const ENCLAVE_ROOT: &str = "enclave";

/// Second subject token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubjectScope {
    /// Run boundaries (start, completion, abort)
    Run,
    /// Automation runner executions
    Automation,
    /// Resources of one category
    Resource(ResourceCategory),
}

impl From<ResourceKind> for SubjectScope {
    fn from(kind: ResourceKind) -> Self {
        SubjectScope::Resource(kind.category())
    }
}

impl fmt::Display for SubjectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectScope::Run => write!(f, "run"),
            SubjectScope::Automation => write!(f, "automation"),
            SubjectScope::Resource(category) => write!(f, "{}", category.as_str()),
        }
    }
}

/// Third subject token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    // Run operations
    Started,
    Completed,
    Aborted,

    // Resource operations
    Created,
    Updated,
    Unchanged,
    Deleted,
    Failed,

    // Automation operations
    Finished,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Started => write!(f, "started"),
            Operation::Completed => write!(f, "completed"),
            Operation::Aborted => write!(f, "aborted"),
            Operation::Created => write!(f, "created"),
            Operation::Updated => write!(f, "updated"),
            Operation::Unchanged => write!(f, "unchanged"),
            Operation::Deleted => write!(f, "deleted"),
            Operation::Failed => write!(f, "failed"),
            Operation::Finished => write!(f, "finished"),
        }
    }
}

/// Builder for enclave subjects
///
/// Missing tokens become a trailing `>` wildcard.
#[derive(Debug, Clone, Default)]
pub struct SubjectBuilder {
    scope: Option<SubjectScope>,
    operation: Option<Operation>,
}

impl SubjectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(mut self, scope: SubjectScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn operation(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Build the subject, wildcarding whatever is unset
    pub fn build(self) -> String {
        match (self.scope, self.operation) {
            (Some(scope), Some(operation)) => format!("{}.{}.{}", ENCLAVE_ROOT, scope, operation),
            (Some(scope), None) => format!("{}.{}.>", ENCLAVE_ROOT, scope),
            (None, Some(operation)) => format!("{}.*.{}", ENCLAVE_ROOT, operation),
            (None, None) => Self::build_all(),
        }
    }

    /// Subscription for all enclave events
    pub fn build_all() -> String {
        format!("{}.>", ENCLAVE_ROOT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_builder() {
        let subject = SubjectBuilder::new()
            .scope(SubjectScope::from(ResourceKind::SecurityGroupIngress))
            .operation(Operation::Created)
            .build();
        assert_eq!(subject, "enclave.reachability.created");
    }

    #[test]
    fn test_wildcards() {
        assert_eq!(
            SubjectBuilder::new()
                .scope(SubjectScope::Resource(ResourceCategory::Identity))
                .build(),
            "enclave.identity.>"
        );
        assert_eq!(
            SubjectBuilder::new().operation(Operation::Failed).build(),
            "enclave.*.failed"
        );
        assert_eq!(SubjectBuilder::build_all(), "enclave.>");
    }
}
