// Copyright (c) 2025 - Cowboy AI, Inc.
//! Lifecycle State Machines
//!
//! A provider record moves through its lifecycle only by pure transitions:
//!
//! ```text
//! (status, command) → (status', output)
//! ```
//!
//! The provider owns the side effects. [`StateMachineWithHistory`] is what a
//! record persists: the current status plus every transition that led to it,
//! so a retried or failed resource can be explained after the fact.

pub mod resource_lifecycle;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use resource_lifecycle::{LifecycleCommand, ResourceStatus, TransitionOutput};

pub type TransitionResult<S> = Result<S, TransitionError>;

/// Rejected lifecycle transition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// The command has no meaning in the current status
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// The command is meaningful but refused in the current status
    #[error("Transition refused: {0}")]
    Refused(String),
}

/// Pure transition function over a status type
pub trait StateMachine: Sized + Clone {
    type Input;
    type Output;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)>;

    fn can_transition(&self, input: &Self::Input) -> bool {
        self.transition(input).is_ok()
    }

    /// Commands accepted in this status; empty when not enumerable
    fn valid_inputs(&self) -> Vec<Self::Input>
    where
        Self::Input: Clone,
    {
        Vec::new()
    }
}

/// One recorded step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition<S, I> {
    pub from: S,
    pub to: S,
    pub input: I,
    pub at: DateTime<Utc>,
}

/// Current status plus the transitions that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "FSM: Serialize, FSM::Input: Serialize",
    deserialize = "FSM: Deserialize<'de>, FSM::Input: Deserialize<'de>"
))]
pub struct StateMachineWithHistory<FSM: StateMachine> {
    current: FSM,
    history: Vec<Transition<FSM, FSM::Input>>,
}

impl<FSM: StateMachine> StateMachineWithHistory<FSM> {
    pub fn new(initial: FSM) -> Self {
        Self {
            current: initial,
            history: Vec::new(),
        }
    }

    /// Apply a command and record it
    ///
    /// A rejected command leaves both status and history untouched.
    pub fn transition_with_history(
        &mut self,
        input: FSM::Input,
        at: DateTime<Utc>,
    ) -> TransitionResult<FSM::Output> {
        let (to, output) = self.current.transition(&input)?;
        let from = std::mem::replace(&mut self.current, to.clone());
        self.history.push(Transition { from, to, input, at });
        Ok(output)
    }

    pub fn current_state(&self) -> &FSM {
        &self.current
    }

    /// Recorded transitions, oldest first
    pub fn transitions(&self) -> &[Transition<FSM, FSM::Input>] {
        &self.history
    }

    pub fn last_transition(&self) -> Option<&Transition<FSM, FSM::Input>> {
        self.history.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_records_each_step() {
        let mut lifecycle = StateMachineWithHistory::new(ResourceStatus::Pending);
        lifecycle
            .transition_with_history(LifecycleCommand::BeginCreate, Utc::now())
            .unwrap();
        lifecycle
            .transition_with_history(LifecycleCommand::Complete, Utc::now())
            .unwrap();

        assert_eq!(*lifecycle.current_state(), ResourceStatus::Available);
        let steps: Vec<_> = lifecycle.transitions().iter().map(|t| (t.from, t.to)).collect();
        assert_eq!(
            steps,
            vec![
                (ResourceStatus::Pending, ResourceStatus::Creating),
                (ResourceStatus::Creating, ResourceStatus::Available),
            ]
        );
    }

    #[test]
    fn test_rejected_command_is_not_recorded() {
        let mut lifecycle = StateMachineWithHistory::new(ResourceStatus::Pending);
        assert!(lifecycle
            .transition_with_history(LifecycleCommand::Complete, Utc::now())
            .is_err());

        assert_eq!(*lifecycle.current_state(), ResourceStatus::Pending);
        assert!(lifecycle.last_transition().is_none());
    }

    #[test]
    fn test_history_survives_serialization() {
        let mut lifecycle = StateMachineWithHistory::new(ResourceStatus::Pending);
        lifecycle
            .transition_with_history(LifecycleCommand::BeginCreate, Utc::now())
            .unwrap();

        let json = serde_json::to_string(&lifecycle).unwrap();
        let back: StateMachineWithHistory<ResourceStatus> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, lifecycle);
    }
}
