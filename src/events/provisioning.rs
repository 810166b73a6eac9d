// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provisioning event envelope and payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::automation::RunPhase;
use crate::domain::resource_type::ResourceKind;
use crate::graph::ResourceId;
use crate::subjects::{Operation, SubjectBuilder, SubjectScope};

/// Current schema version of [`ProvisioningEvent`]
pub const EVENT_VERSION: u32 = 1;

/// What a run does to the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOperation {
    Apply,
    Destroy,
}

/// Payload of a provisioning event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProvisioningEventKind {
    RunStarted {
        operation: RunOperation,
        resources: usize,
        levels: usize,
    },
    ResourceCreated {
        resource: ResourceId,
        kind: ResourceKind,
        level: usize,
    },
    ResourceUpdated {
        resource: ResourceId,
        kind: ResourceKind,
        level: usize,
    },
    ResourceUnchanged {
        resource: ResourceId,
        kind: ResourceKind,
        level: usize,
    },
    ResourceDeleted {
        resource: ResourceId,
        kind: ResourceKind,
    },
    ResourceFailed {
        resource: ResourceId,
        kind: ResourceKind,
        reason: String,
    },
    RunCompleted {
        operation: RunOperation,
        changes: usize,
    },
    RunAborted {
        operation: RunOperation,
        reason: String,
    },
    AutomationRunFinished {
        project: String,
        build_id: String,
        succeeded: bool,
        failed_phase: Option<RunPhase>,
    },
}

impl ProvisioningEventKind {
    /// Human-readable event type name
    pub fn event_type_name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "RunStarted",
            Self::ResourceCreated { .. } => "ResourceCreated",
            Self::ResourceUpdated { .. } => "ResourceUpdated",
            Self::ResourceUnchanged { .. } => "ResourceUnchanged",
            Self::ResourceDeleted { .. } => "ResourceDeleted",
            Self::ResourceFailed { .. } => "ResourceFailed",
            Self::RunCompleted { .. } => "RunCompleted",
            Self::RunAborted { .. } => "RunAborted",
            Self::AutomationRunFinished { .. } => "AutomationRunFinished",
        }
    }

    fn subject_parts(&self) -> (SubjectScope, Operation) {
        match self {
            Self::RunStarted { .. } => (SubjectScope::Run, Operation::Started),
            Self::RunCompleted { .. } => (SubjectScope::Run, Operation::Completed),
            Self::RunAborted { .. } => (SubjectScope::Run, Operation::Aborted),
            Self::ResourceCreated { kind, .. } => (SubjectScope::from(*kind), Operation::Created),
            Self::ResourceUpdated { kind, .. } => (SubjectScope::from(*kind), Operation::Updated),
            Self::ResourceUnchanged { kind, .. } => {
                (SubjectScope::from(*kind), Operation::Unchanged)
            }
            Self::ResourceDeleted { kind, .. } => (SubjectScope::from(*kind), Operation::Deleted),
            Self::ResourceFailed { kind, .. } => (SubjectScope::from(*kind), Operation::Failed),
            Self::AutomationRunFinished { .. } => (SubjectScope::Automation, Operation::Finished),
        }
    }
}

/// Event envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningEvent {
    pub event_version: u32,
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Shared by every event of one run
    pub correlation_id: Uuid,
    /// Event that directly preceded this one
    pub causation_id: Option<Uuid>,
    #[serde(flatten)]
    pub kind: ProvisioningEventKind,
}

impl ProvisioningEvent {
    pub fn new(
        correlation_id: Uuid,
        causation_id: Option<Uuid>,
        kind: ProvisioningEventKind,
    ) -> Self {
        Self {
            event_version: EVENT_VERSION,
            event_id: Uuid::now_v7(),
            timestamp: Utc::now(),
            correlation_id,
            causation_id,
            kind,
        }
    }

    /// Subject the event is published on
    pub fn subject(&self) -> String {
        let (scope, operation) = self.kind.subject_parts();
        SubjectBuilder::new().scope(scope).operation(operation).build()
    }
}

/// Chains events of one run by causation
#[derive(Debug, Clone)]
pub struct EventChain {
    correlation_id: Uuid,
    last: Option<Uuid>,
}

impl EventChain {
    pub fn new(correlation_id: Uuid) -> Self {
        Self {
            correlation_id,
            last: None,
        }
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Create the next event, caused by the previous one
    pub fn next(&mut self, kind: ProvisioningEventKind) -> ProvisioningEvent {
        let event = ProvisioningEvent::new(self.correlation_id, self.last, kind);
        self.last = Some(event.event_id);
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_links_causation() {
        let run = Uuid::now_v7();
        let mut chain = EventChain::new(run);
        let first = chain.next(ProvisioningEventKind::RunStarted {
            operation: RunOperation::Apply,
            resources: 3,
            levels: 2,
        });
        let second = chain.next(ProvisioningEventKind::RunCompleted {
            operation: RunOperation::Apply,
            changes: 3,
        });

        assert_eq!(first.causation_id, None);
        assert_eq!(second.causation_id, Some(first.event_id));
        assert_eq!(second.correlation_id, run);
        assert_eq!(first.event_version, EVENT_VERSION);
    }

    #[test]
    fn test_subjects() {
        let event = ProvisioningEvent::new(
            Uuid::now_v7(),
            None,
            ProvisioningEventKind::ResourceCreated {
                resource: ResourceId::new("SearchDomain").unwrap(),
                kind: ResourceKind::SearchDomain,
                level: 3,
            },
        );
        assert_eq!(event.subject(), "enclave.data.created");

        let event = ProvisioningEvent::new(
            Uuid::now_v7(),
            None,
            ProvisioningEventKind::RunAborted {
                operation: RunOperation::Apply,
                reason: "boom".to_string(),
            },
        );
        assert_eq!(event.subject(), "enclave.run.aborted");
    }

    #[test]
    fn test_serialization_flattens_kind() {
        let event = ProvisioningEvent::new(
            Uuid::now_v7(),
            None,
            ProvisioningEventKind::ResourceDeleted {
                resource: ResourceId::new("Vpc").unwrap(),
                kind: ResourceKind::Network,
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "resource_deleted");
        assert_eq!(json["resource"], "Vpc");

        let back: ProvisioningEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
