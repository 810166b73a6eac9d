// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Lifecycle State Machine
//!
//! Lifecycle of one materialized resource as tracked by the provider.
//!
//! # States
//!
//! ```text
//!  Pending ──BeginCreate──▶ Creating ──Complete──▶ Available ◀──Complete── Updating
//!                             │  ▲                   │   └────BeginUpdate────▲
//!                           Fail │ BeginCreate       BeginDelete
//!                             ▼  │                   ▼
//!                            Failed ──BeginDelete──▶ Deleting ──Complete──▶ Deleted
//! ```
//!
//! - `Failed` is retryable: a later run re-creates the resource.
//! - `Deleted` is terminal.
//! - `Refresh` leaves every state unchanged (idempotent read).

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{StateMachine, TransitionError, TransitionResult};

/// Lifecycle state of a materialized resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Pending,
    Creating,
    Available,
    Updating,
    Failed,
    Deleting,
    Deleted,
}

impl ResourceStatus {
    /// Outputs of the resource may be consumed
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }

    /// The resource still occupies provider state
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::Deleted)
    }

    /// No operation is in flight
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Available | Self::Failed | Self::Deleted)
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Creating => "creating",
            Self::Available => "available",
            Self::Updating => "updating",
            Self::Failed => "failed",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
        };
        write!(f, "{}", s)
    }
}

/// Lifecycle command (FSM input)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleCommand {
    BeginCreate,
    BeginUpdate,
    BeginDelete,
    /// The in-flight operation finished
    Complete,
    /// The in-flight operation failed
    Fail,
    /// Stay in current state
    Refresh,
}

/// Transition output with metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutput {
    /// Warnings generated during transition
    pub warnings: Vec<String>,

    /// Whether this is a critical transition
    pub is_critical: bool,
}

impl TransitionOutput {
    /// Create output with no warnings
    pub fn ok() -> Self {
        Self {
            warnings: Vec::new(),
            is_critical: false,
        }
    }

    /// Create output with warnings
    pub fn with_warnings(warnings: Vec<String>) -> Self {
        Self {
            warnings,
            is_critical: false,
        }
    }

    /// Create output for critical transition
    pub fn critical(warnings: Vec<String>) -> Self {
        Self {
            warnings,
            is_critical: true,
        }
    }
}

impl StateMachine for ResourceStatus {
    type Input = LifecycleCommand;
    type Output = TransitionOutput;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        use LifecycleCommand::*;
        use ResourceStatus::*;

        match (self, input) {
            (state, Refresh) => Ok((*state, TransitionOutput::ok())),

            // Creation
            (Pending, BeginCreate) => Ok((Creating, TransitionOutput::ok())),
            (Failed, BeginCreate) => Ok((
                Creating,
                TransitionOutput::with_warnings(vec!["Retrying failed resource".to_string()]),
            )),
            (Creating, Complete) => Ok((Available, TransitionOutput::ok())),
            (Creating, Fail) => Ok((
                Failed,
                TransitionOutput::critical(vec!["Creation failed".to_string()]),
            )),

            // Update
            (Available, BeginUpdate) => Ok((Updating, TransitionOutput::ok())),
            (Updating, Complete) => Ok((Available, TransitionOutput::ok())),
            (Updating, Fail) => Ok((
                Failed,
                TransitionOutput::critical(vec!["Update failed".to_string()]),
            )),

            // Deletion
            (Available, BeginDelete) => Ok((Deleting, TransitionOutput::ok())),
            (Failed, BeginDelete) => Ok((
                Deleting,
                TransitionOutput::with_warnings(vec!["Deleting failed resource".to_string()]),
            )),
            (Pending, BeginDelete) => Ok((
                Deleting,
                TransitionOutput::with_warnings(vec!["Deleting before creation".to_string()]),
            )),
            (Deleting, Complete) => Ok((Deleted, TransitionOutput::ok())),
            (Deleting, Fail) => Ok((
                Failed,
                TransitionOutput::critical(vec!["Deletion failed".to_string()]),
            )),

            (Available, BeginCreate) => Err(TransitionError::Refused(
                "Already available".to_string(),
            )),
            (Deleted, _) => Err(TransitionError::InvalidTransition {
                from: self.to_string(),
                to: "any status".to_string(),
            }),
            (from, input) => Err(TransitionError::InvalidTransition {
                from: from.to_string(),
                to: format!("{:?}", input),
            }),
        }
    }

    fn valid_inputs(&self) -> Vec<Self::Input> {
        use LifecycleCommand::*;
        use ResourceStatus::*;

        match self {
            Pending => vec![BeginCreate, BeginDelete, Refresh],
            Creating | Updating | Deleting => vec![Complete, Fail, Refresh],
            Available => vec![BeginUpdate, BeginDelete, Refresh],
            Failed => vec![BeginCreate, BeginDelete, Refresh],
            Deleted => vec![Refresh],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_create_path() {
        let (state, _) = ResourceStatus::Pending
            .transition(&LifecycleCommand::BeginCreate)
            .expect("Transition should succeed");
        assert_eq!(state, ResourceStatus::Creating);

        let (state, output) = state
            .transition(&LifecycleCommand::Complete)
            .expect("Transition should succeed");
        assert_eq!(state, ResourceStatus::Available);
        assert!(!output.is_critical);
    }

    #[test]
    fn test_failed_creation_is_critical_and_retryable() {
        let (state, output) = ResourceStatus::Creating
            .transition(&LifecycleCommand::Fail)
            .expect("Transition should succeed");
        assert_eq!(state, ResourceStatus::Failed);
        assert!(output.is_critical);

        let (state, output) = state
            .transition(&LifecycleCommand::BeginCreate)
            .expect("Retry should succeed");
        assert_eq!(state, ResourceStatus::Creating);
        assert!(!output.warnings.is_empty());
    }

    #[test]
    fn test_deleted_is_terminal() {
        let state = ResourceStatus::Deleted;
        assert!(state.transition(&LifecycleCommand::BeginCreate).is_err());
        assert!(state.transition(&LifecycleCommand::BeginDelete).is_err());
        assert_eq!(state.valid_inputs(), vec![LifecycleCommand::Refresh]);
    }

    #[test]
    fn test_already_available() {
        assert!(matches!(
            ResourceStatus::Available.transition(&LifecycleCommand::BeginCreate),
            Err(TransitionError::Refused(_))
        ));
    }

    #[test_case(ResourceStatus::Pending)]
    #[test_case(ResourceStatus::Creating)]
    #[test_case(ResourceStatus::Available)]
    #[test_case(ResourceStatus::Updating)]
    #[test_case(ResourceStatus::Failed)]
    #[test_case(ResourceStatus::Deleting)]
    #[test_case(ResourceStatus::Deleted)]
    fn test_refresh_is_idempotent(state: ResourceStatus) {
        let (next, _) = state
            .transition(&LifecycleCommand::Refresh)
            .expect("Refresh should always succeed");
        assert_eq!(next, state);
    }

    #[test]
    fn test_valid_inputs_agree_with_transition() {
        let states = [
            ResourceStatus::Pending,
            ResourceStatus::Creating,
            ResourceStatus::Available,
            ResourceStatus::Updating,
            ResourceStatus::Failed,
            ResourceStatus::Deleting,
            ResourceStatus::Deleted,
        ];
        for state in states {
            for input in state.valid_inputs() {
                assert!(state.can_transition(&input), "{:?} {:?}", state, input);
            }
        }
    }
}
