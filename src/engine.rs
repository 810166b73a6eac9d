// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provisioning runs
//!
//! The [`Provisioner`] walks a [`ResourceGraph`] level by level against a
//! [`CloudProvider`]:
//!
//! ```text
//! level 0 ──join_all──▶ outputs ──resolve──▶ level 1 ──join_all──▶ ... ──▶ orphans (reverse)
//! ```
//!
//! - Siblings in a level are materialized concurrently.
//! - A level starts only after every resource of the previous one is
//!   available, so each reference resolves before its consumer is created.
//! - The first failing level aborts the run. Resources that were already
//!   materialized stay as they are; the next run picks up from there.
//! - Records the provider holds that the graph no longer declares are
//!   deleted after the graph converged, dependents first.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::domain::resource_type::ResourceKind;
use crate::errors::{EnclaveResult, ProviderError};
use crate::events::{EventChain, EventSink, ProvisioningEventKind, RunOperation};
use crate::graph::{dependency_levels, GraphError, OutputTable, ResourceGraph, ResourceId};
use crate::provider::{CloudProvider, ResourceRecord, ResourceRequest};
use crate::topology::SearchEnclave;

/// What a run did to one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Create,
    Update,
    NoChange,
    Delete,
}

/// One entry of a change set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceChange {
    pub resource: ResourceId,
    pub kind: ResourceKind,
    pub action: ChangeAction,
    /// Creation level; absent for deletions
    pub level: Option<usize>,
}

/// Result of a completed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub correlation_id: Uuid,
    pub operation: RunOperation,
    pub changes: Vec<ResourceChange>,
}

impl ChangeSet {
    fn new(correlation_id: Uuid, operation: RunOperation) -> Self {
        Self {
            correlation_id,
            operation,
            changes: Vec::new(),
        }
    }

    /// Number of entries with the given action
    pub fn count(&self, action: ChangeAction) -> usize {
        self.changes.iter().filter(|c| c.action == action).count()
    }

    /// True when nothing was created, updated or deleted
    pub fn is_noop(&self) -> bool {
        self.changes.iter().all(|c| c.action == ChangeAction::NoChange)
    }

    pub fn action_for(&self, resource: &ResourceId) -> Option<ChangeAction> {
        self.changes
            .iter()
            .find(|c| &c.resource == resource)
            .map(|c| c.action)
    }

    /// Entries that changed provider state
    pub fn changed(&self) -> impl Iterator<Item = &ResourceChange> {
        self.changes.iter().filter(|c| c.action != ChangeAction::NoChange)
    }
}

/// Drives provisioning runs against a provider
pub struct Provisioner<P, S> {
    provider: P,
    sink: S,
}

impl<P, S> Provisioner<P, S>
where
    P: CloudProvider,
    S: EventSink,
{
    pub fn new(provider: P, sink: S) -> Self {
        Self { provider, sink }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Check the enclave's baseline invariants, then converge onto it
    pub async fn apply(&self, enclave: &SearchEnclave) -> EnclaveResult<ChangeSet> {
        enclave.preflight()?;
        self.apply_graph(enclave.graph()).await
    }

    /// Converge provider state onto a graph
    pub async fn apply_graph(&self, graph: &ResourceGraph) -> EnclaveResult<ChangeSet> {
        let mut chain = EventChain::new(Uuid::now_v7());
        let mut changes = ChangeSet::new(chain.correlation_id(), RunOperation::Apply);

        info!(
            correlation_id = %chain.correlation_id(),
            resources = graph.len(),
            levels = graph.levels().len(),
            "Starting apply"
        );
        self.emit(
            &mut chain,
            ProvisioningEventKind::RunStarted {
                operation: RunOperation::Apply,
                resources: graph.len(),
                levels: graph.levels().len(),
            },
        )
        .await?;

        let existing: BTreeMap<ResourceId, ResourceRecord> = self
            .provider
            .list()
            .await?
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();
        let mut outputs = OutputTable::new();

        for (level, ids) in graph.levels().iter().enumerate() {
            let mut requests = Vec::with_capacity(ids.len());
            for id in ids {
                let node = graph
                    .node(id)
                    .ok_or_else(|| GraphError::UnknownNode(id.clone()))?;
                let properties = match graph.resolve_node(id, &outputs) {
                    Ok(properties) => properties,
                    Err(err) => {
                        let reason = err.to_string();
                        self.abort(&mut chain, RunOperation::Apply, id, node.kind, &reason)
                            .await?;
                        return Err(err.into());
                    }
                };
                requests.push(ResourceRequest {
                    id: id.clone(),
                    kind: node.kind,
                    properties,
                    dependencies: node.dependencies(),
                });
            }

            let results = join_all(
                requests
                    .into_iter()
                    .map(|request| self.converge(existing.get(&request.id), request)),
            )
            .await;

            let mut failure: Option<(ResourceId, ResourceKind, ProviderError)> = None;
            for result in results {
                match result {
                    Ok((action, record)) => {
                        debug!(resource = %record.id, kind = %record.kind, level, ?action, "Converged");
                        outputs.insert(record.id.clone(), record.outputs.clone());
                        self.emit(&mut chain, resource_event(action, &record, level))
                            .await?;
                        changes.changes.push(ResourceChange {
                            resource: record.id,
                            kind: record.kind,
                            action,
                            level: Some(level),
                        });
                    }
                    Err((id, kind, err)) => {
                        error!(resource = %id, %kind, level, error = %err, "Materialization failed");
                        if failure.is_none() {
                            failure = Some((id, kind, err));
                        }
                    }
                }
            }

            if let Some((id, kind, err)) = failure {
                self.abort(&mut chain, RunOperation::Apply, &id, kind, &err.to_string())
                    .await?;
                return Err(err.into());
            }
        }

        let orphans: Vec<ResourceRecord> = existing
            .into_values()
            .filter(|r| !graph.contains(&r.id))
            .collect();
        if !orphans.is_empty() {
            info!(count = orphans.len(), "Removing resources no longer declared");
            self.teardown(&mut chain, RunOperation::Apply, orphans, &mut changes)
                .await?;
        }

        let changed = changes.changed().count();
        self.emit(
            &mut chain,
            ProvisioningEventKind::RunCompleted {
                operation: RunOperation::Apply,
                changes: changed,
            },
        )
        .await?;
        info!(
            correlation_id = %changes.correlation_id,
            created = changes.count(ChangeAction::Create),
            updated = changes.count(ChangeAction::Update),
            unchanged = changes.count(ChangeAction::NoChange),
            deleted = changes.count(ChangeAction::Delete),
            "Apply completed"
        );
        Ok(changes)
    }

    /// Remove every resource the provider holds, dependents first
    pub async fn destroy(&self) -> EnclaveResult<ChangeSet> {
        let mut chain = EventChain::new(Uuid::now_v7());
        let mut changes = ChangeSet::new(chain.correlation_id(), RunOperation::Destroy);

        let records = self.provider.list().await?;
        let levels = dependency_levels(
            records
                .iter()
                .map(|r| (r.id.clone(), r.dependencies.clone())),
        )?;

        info!(
            correlation_id = %chain.correlation_id(),
            resources = records.len(),
            "Starting destroy"
        );
        self.emit(
            &mut chain,
            ProvisioningEventKind::RunStarted {
                operation: RunOperation::Destroy,
                resources: records.len(),
                levels: levels.len(),
            },
        )
        .await?;

        self.teardown(&mut chain, RunOperation::Destroy, records, &mut changes)
            .await?;

        let changed = changes.changed().count();
        self.emit(
            &mut chain,
            ProvisioningEventKind::RunCompleted {
                operation: RunOperation::Destroy,
                changes: changed,
            },
        )
        .await?;
        info!(deleted = changed, "Destroy completed");
        Ok(changes)
    }

    /// Bring one resource to its requested state
    async fn converge(
        &self,
        existing: Option<&ResourceRecord>,
        request: ResourceRequest,
    ) -> Result<(ChangeAction, ResourceRecord), (ResourceId, ResourceKind, ProviderError)> {
        let (id, kind) = (request.id.clone(), request.kind);
        let result = match existing {
            Some(record) if record.matches(&request) => Ok((ChangeAction::NoChange, record.clone())),
            Some(record) if record.status().is_available() => self
                .provider
                .update(request)
                .await
                .map(|r| (ChangeAction::Update, r)),
            _ => self
                .provider
                .create(request)
                .await
                .map(|r| (ChangeAction::Create, r)),
        };
        result.map_err(|err| (id, kind, err))
    }

    /// Delete records in reverse dependency order
    async fn teardown(
        &self,
        chain: &mut EventChain,
        operation: RunOperation,
        records: Vec<ResourceRecord>,
        changes: &mut ChangeSet,
    ) -> EnclaveResult<()> {
        let kinds: BTreeMap<ResourceId, ResourceKind> =
            records.iter().map(|r| (r.id.clone(), r.kind)).collect();
        let levels = dependency_levels(
            records
                .into_iter()
                .map(|r| (r.id, r.dependencies)),
        )?;

        for level in levels.iter().rev() {
            let results = join_all(level.iter().map(|id| async move {
                self.provider.delete(id).await.map(|_| id.clone())
            }))
            .await;

            let mut failure: Option<ProviderError> = None;
            for (id, result) in level.iter().zip(results) {
                let kind = kinds
                    .get(id)
                    .copied()
                    .ok_or_else(|| GraphError::UnknownNode(id.clone()))?;
                match result {
                    Ok(id) => {
                        debug!(resource = %id, %kind, "Deleted");
                        self.emit(
                            chain,
                            ProvisioningEventKind::ResourceDeleted {
                                resource: id.clone(),
                                kind,
                            },
                        )
                        .await?;
                        changes.changes.push(ResourceChange {
                            resource: id,
                            kind,
                            action: ChangeAction::Delete,
                            level: None,
                        });
                    }
                    Err(err) => {
                        error!(resource = %id, %kind, error = %err, "Deletion failed");
                        if failure.is_none() {
                            self.emit(
                                chain,
                                ProvisioningEventKind::ResourceFailed {
                                    resource: id.clone(),
                                    kind,
                                    reason: err.to_string(),
                                },
                            )
                            .await?;
                            failure = Some(err);
                        }
                    }
                }
            }

            if let Some(err) = failure {
                self.emit(
                    chain,
                    ProvisioningEventKind::RunAborted {
                        operation,
                        reason: err.to_string(),
                    },
                )
                .await?;
                return Err(err.into());
            }
        }
        Ok(())
    }

    async fn abort(
        &self,
        chain: &mut EventChain,
        operation: RunOperation,
        resource: &ResourceId,
        kind: ResourceKind,
        reason: &str,
    ) -> EnclaveResult<()> {
        self.emit(
            chain,
            ProvisioningEventKind::ResourceFailed {
                resource: resource.clone(),
                kind,
                reason: reason.to_string(),
            },
        )
        .await?;
        self.emit(
            chain,
            ProvisioningEventKind::RunAborted {
                operation,
                reason: reason.to_string(),
            },
        )
        .await?;
        error!(resource = %resource, %kind, reason, "Run aborted");
        Ok(())
    }

    async fn emit(&self, chain: &mut EventChain, kind: ProvisioningEventKind) -> EnclaveResult<()> {
        let event = chain.next(kind);
        self.sink.publish(&event).await
    }
}

fn resource_event(action: ChangeAction, record: &ResourceRecord, level: usize) -> ProvisioningEventKind {
    let (resource, kind) = (record.id.clone(), record.kind);
    match action {
        ChangeAction::Create => ProvisioningEventKind::ResourceCreated { resource, kind, level },
        ChangeAction::Update => ProvisioningEventKind::ResourceUpdated { resource, kind, level },
        ChangeAction::NoChange => ProvisioningEventKind::ResourceUnchanged { resource, kind, level },
        ChangeAction::Delete => ProvisioningEventKind::ResourceDeleted { resource, kind },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource_type::Attribute;
    use crate::events::InMemoryEventSink;
    use crate::graph::{GraphBuilder, ResourceNode};
    use crate::provider::InMemoryProvider;

    fn id(s: &str) -> ResourceId {
        ResourceId::new(s).unwrap()
    }

    fn small_graph() -> ResourceGraph {
        let mut builder = GraphBuilder::new();
        builder
            .add(ResourceNode::new(id("Vpc"), ResourceKind::Network).with("cidr_block", "10.0.0.0/16"))
            .unwrap();
        builder
            .add(
                ResourceNode::new(id("Subnet"), ResourceKind::Subnet)
                    .with("vpc_id", id("Vpc").output(Attribute::Id))
                    .with("zone", "us-east-2a"),
            )
            .unwrap();
        builder.finish().unwrap()
    }

    fn provisioner() -> Provisioner<InMemoryProvider, InMemoryEventSink> {
        Provisioner::new(
            InMemoryProvider::new("us-east-2", "123456789012"),
            InMemoryEventSink::new(),
        )
    }

    #[tokio::test]
    async fn test_apply_substitutes_outputs() {
        let p = provisioner();
        let changes = p.apply_graph(&small_graph()).await.unwrap();
        assert_eq!(changes.count(ChangeAction::Create), 2);

        let vpc = p.provider().get(&id("Vpc")).await.unwrap().unwrap();
        let subnet = p.provider().get(&id("Subnet")).await.unwrap().unwrap();
        assert_eq!(subnet.properties["vpc_id"], vpc.outputs[&Attribute::Id]);
    }

    #[tokio::test]
    async fn test_reapply_is_noop() {
        let p = provisioner();
        p.apply_graph(&small_graph()).await.unwrap();
        let changes = p.apply_graph(&small_graph()).await.unwrap();
        assert!(changes.is_noop());
        assert_eq!(changes.count(ChangeAction::NoChange), 2);
    }

    #[tokio::test]
    async fn test_orphans_removed() {
        let p = provisioner();
        p.apply_graph(&small_graph()).await.unwrap();

        let mut builder = GraphBuilder::new();
        builder
            .add(ResourceNode::new(id("Vpc"), ResourceKind::Network).with("cidr_block", "10.0.0.0/16"))
            .unwrap();
        let changes = p.apply_graph(&builder.finish().unwrap()).await.unwrap();

        assert_eq!(changes.action_for(&id("Subnet")), Some(ChangeAction::Delete));
        assert_eq!(changes.action_for(&id("Vpc")), Some(ChangeAction::NoChange));
        assert!(p.provider().get(&id("Subnet")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dropped_dependency_is_recorded_before_orphan_removal() {
        let p = provisioner();
        let mut builder = GraphBuilder::new();
        builder
            .add(ResourceNode::new(id("Bucket"), ResourceKind::Bucket).with("bucket_name", "seed"))
            .unwrap();
        builder
            .add(
                ResourceNode::new(id("Vpc"), ResourceKind::Network)
                    .with("cidr_block", "10.0.0.0/16")
                    .after(id("Bucket")),
            )
            .unwrap();
        p.apply_graph(&builder.finish().unwrap()).await.unwrap();

        // Same properties, ordering edge removed, predecessor gone
        let mut builder = GraphBuilder::new();
        builder
            .add(ResourceNode::new(id("Vpc"), ResourceKind::Network).with("cidr_block", "10.0.0.0/16"))
            .unwrap();
        let reduced = builder.finish().unwrap();
        let changes = p.apply_graph(&reduced).await.unwrap();

        assert_eq!(changes.action_for(&id("Vpc")), Some(ChangeAction::Update));
        assert_eq!(changes.action_for(&id("Bucket")), Some(ChangeAction::Delete));
        let vpc = p.provider().get(&id("Vpc")).await.unwrap().unwrap();
        assert!(vpc.dependencies.is_empty());
        assert!(p.provider().get(&id("Bucket")).await.unwrap().is_none());

        assert!(p.apply_graph(&reduced).await.unwrap().is_noop());
    }

    #[tokio::test]
    async fn test_destroy_emits_dependents_first() {
        let p = provisioner();
        p.apply_graph(&small_graph()).await.unwrap();
        let changes = p.destroy().await.unwrap();

        let order: Vec<_> = changes.changes.iter().map(|c| c.resource.clone()).collect();
        assert_eq!(order, vec![id("Subnet"), id("Vpc")]);
        assert!(p.provider().list().await.unwrap().is_empty());
    }
}
