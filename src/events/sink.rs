// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event sinks
//!
//! Provisioning never depends on a sink succeeding to make progress, but a
//! publish failure is reported to the caller.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

use super::ProvisioningEvent;
use crate::errors::{EnclaveError, EnclaveResult};

/// Destination for provisioning events
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publish one event
    async fn publish(&self, event: &ProvisioningEvent) -> EnclaveResult<()>;
}

/// Keeps every published event in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventSink {
    events: Arc<Mutex<Vec<ProvisioningEvent>>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of published events in order
    pub fn events(&self) -> Vec<ProvisioningEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Events of one run
    pub fn read_by_correlation(&self, correlation_id: Uuid) -> Vec<ProvisioningEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.correlation_id == correlation_id)
            .collect()
    }

    /// Subjects of published events in order
    pub fn subjects(&self) -> Vec<String> {
        self.events().iter().map(ProvisioningEvent::subject).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn publish(&self, event: &ProvisioningEvent) -> EnclaveResult<()> {
        debug!(subject = %event.subject(), event_type = event.kind.event_type_name(), "Recording event");
        self.events
            .lock()
            .map_err(|e| EnclaveError::Publish(e.to_string()))?
            .push(event.clone());
        Ok(())
    }
}
