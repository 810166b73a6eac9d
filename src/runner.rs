// Copyright (c) 2025 - Cowboy AI, Inc.
//! Automation runner trigger
//!
//! Starts one execution of the declared build project and reports its
//! outcome as an `enclave.automation.finished` event. A failed execution is
//! a result, not an error: the caller receives the run with its failed phase.

use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::EnclaveResult;
use crate::events::{EventChain, EventSink, ProvisioningEventKind};
use crate::graph::ResourceId;
use crate::provider::{BuildRun, CloudProvider};

/// Triggers runs of one build project
pub struct AutomationRunner<'a, P, S> {
    provider: &'a P,
    sink: &'a S,
    project: ResourceId,
}

impl<'a, P, S> AutomationRunner<'a, P, S>
where
    P: CloudProvider,
    S: EventSink,
{
    pub fn new(provider: &'a P, sink: &'a S, project: ResourceId) -> Self {
        Self {
            provider,
            sink,
            project,
        }
    }

    pub fn project(&self) -> &ResourceId {
        &self.project
    }

    /// Run the project to completion and publish the outcome
    ///
    /// Fails only when the project cannot be started or the outcome cannot
    /// be published.
    pub async fn trigger(&self) -> EnclaveResult<BuildRun> {
        info!(project = %self.project, "Triggering automation run");
        let run = self.provider.start_build(&self.project).await?;

        match run.failed_phase() {
            None => info!(
                project = %self.project,
                build_id = %run.build_id,
                phases = run.phases.len(),
                "Automation run succeeded"
            ),
            Some(phase) => warn!(
                project = %self.project,
                build_id = %run.build_id,
                %phase,
                "Automation run failed"
            ),
        }

        let mut chain = EventChain::new(Uuid::now_v7());
        let event = chain.next(ProvisioningEventKind::AutomationRunFinished {
            project: self.project.to_string(),
            build_id: run.build_id.clone(),
            succeeded: run.succeeded(),
            failed_phase: run.failed_phase(),
        });
        self.sink.publish(&event).await?;

        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{EnclaveError, ProviderError};
    use crate::events::InMemoryEventSink;
    use crate::provider::InMemoryProvider;

    #[tokio::test]
    async fn test_unknown_project_is_an_error() {
        let provider = InMemoryProvider::new("us-east-2", "123456789012");
        let sink = InMemoryEventSink::new();
        let runner = AutomationRunner::new(&provider, &sink, ResourceId::new("Missing").unwrap());

        let err = runner.trigger().await.unwrap_err();
        assert!(matches!(err, EnclaveError::Provider(ProviderError::NotFound(_))));
        assert!(sink.events().is_empty());
    }
}
