// Copyright (c) 2025 - Cowboy AI, Inc.
//! Shared-Configuration Store
//!
//! A hardened object container seeded at provisioning time. Objects are
//! opaque payloads uploaded verbatim; a redeployment replaces the whole
//! object set (prune) rather than appending to it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::domain::annotations::Annotation;
use crate::domain::identity::{
    PolicyStatement, ResourcePattern, CONTAINER_READ_ACTIONS, OBJECT_READ_ACTIONS,
};
use crate::domain::invariants::{validate_store_hardening, ValidationResult};
use crate::domain::resource_type::{Attribute, ResourceKind};
use crate::domain::DeclareError;
use crate::graph::{GraphBuilder, OutputRef, PropertyValue, ResourceId, ResourceNode};

/// Opaque configuration payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigObject {
    pub key: String,
    pub content: Vec<u8>,
}

impl ConfigObject {
    pub fn new(key: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            content: content.into(),
        }
    }

    /// Content fingerprint; changes whenever the payload does
    pub fn digest(&self) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, &self.content).to_string()
    }
}

/// Declared configuration store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigStoreSpec {
    pub id: ResourceId,
    pub source_dir: Option<PathBuf>,
    pub objects: BTreeMap<String, ConfigObject>,
    pub block_public_access: bool,
    pub enforce_tls: bool,
    /// Empty the container when the environment is torn down
    pub auto_delete_objects: bool,
    pub annotations: Vec<Annotation>,
}

impl ConfigStoreSpec {
    pub fn new(id: ResourceId) -> Self {
        Self {
            id,
            source_dir: None,
            objects: BTreeMap::new(),
            block_public_access: true,
            enforce_tls: true,
            auto_delete_objects: true,
            annotations: Vec::new(),
        }
    }

    /// Seed with every regular file in `dir`, keyed by file name
    pub fn from_dir(id: ResourceId, dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = dir.as_ref();
        let mut spec = Self::new(id);
        spec.source_dir = Some(dir.to_path_buf());
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let key = entry.file_name().to_string_lossy().into_owned();
            let content = fs::read(entry.path())?;
            spec.objects.insert(key.clone(), ConfigObject::new(key, content));
        }
        Ok(spec)
    }

    /// Add or overwrite one object
    pub fn with_object(mut self, object: ConfigObject) -> Self {
        self.objects.insert(object.key.clone(), object);
        self
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    pub fn validate(&self) -> ValidationResult {
        validate_store_hardening(self.id.as_str(), self.block_public_access, self.enforce_tls)
    }

    fn child_id(&self, suffix: &str) -> Result<ResourceId, DeclareError> {
        Ok(ResourceId::new(format!("{}{}", self.id, suffix))?)
    }

    /// Validate, then record the container, its TLS-only policy and the seeding
    pub fn declare(&self, graph: &mut GraphBuilder) -> Result<ConfigStoreHandle, DeclareError> {
        self.validate()?;

        let handle = ConfigStoreHandle {
            bucket: self.id.clone(),
            policy: self.child_id("Policy")?,
            deployment: self.child_id("Deployment")?,
        };

        graph.add(
            ResourceNode::new(handle.bucket.clone(), ResourceKind::Bucket)
                .with(
                    "public_access_block",
                    PropertyValue::map([
                        ("block_public_acls", PropertyValue::from(self.block_public_access)),
                        ("block_public_policy", PropertyValue::from(self.block_public_access)),
                        ("ignore_public_acls", PropertyValue::from(self.block_public_access)),
                        ("restrict_public_buckets", PropertyValue::from(self.block_public_access)),
                    ]),
                )
                .with("auto_delete_objects", self.auto_delete_objects)
                .with("removal_policy", "destroy")
                .annotated(self.annotations.clone()),
        )?;

        graph.add(
            ResourceNode::new(handle.policy.clone(), ResourceKind::BucketPolicy)
                .with("bucket", handle.name())
                .with(
                    "policy_document",
                    PropertyValue::map([
                        ("Version", PropertyValue::from("2012-10-17")),
                        (
                            "Statement",
                            PropertyValue::List(vec![PropertyValue::map([
                                ("Effect", PropertyValue::from("Deny")),
                                ("Principal", PropertyValue::map([("AWS", PropertyValue::from("*"))])),
                                ("Action", PropertyValue::from("s3:*")),
                                (
                                    "Resource",
                                    PropertyValue::List(vec![
                                        ResourcePattern::Exact(handle.arn()).render(),
                                        ResourcePattern::SubResources(handle.arn()).render(),
                                    ]),
                                ),
                                (
                                    "Condition",
                                    PropertyValue::map([(
                                        "Bool",
                                        PropertyValue::map([(
                                            "aws:SecureTransport",
                                            PropertyValue::from("false"),
                                        )]),
                                    )]),
                                ),
                            ])]),
                        ),
                    ]),
                ),
        )?;

        let objects = PropertyValue::map(
            self.objects
                .values()
                .map(|o| (o.key.clone(), PropertyValue::from(o.digest()))),
        );
        let mut deployment = ResourceNode::new(handle.deployment.clone(), ResourceKind::BucketDeployment)
            .with("destination_bucket", handle.name())
            .with("objects", objects)
            .with("prune", true)
            .after(handle.policy.clone());
        if let Some(dir) = &self.source_dir {
            deployment = deployment.with("source", dir.to_string_lossy().into_owned());
        }
        graph.add(deployment)?;

        Ok(handle)
    }
}

/// Graph ids of a declared configuration store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigStoreHandle {
    pub bucket: ResourceId,
    pub policy: ResourceId,
    pub deployment: ResourceId,
}

impl ConfigStoreHandle {
    /// Container name consumed by the automation runner
    pub fn name(&self) -> OutputRef {
        self.bucket.output(Attribute::Name)
    }

    pub fn arn(&self) -> OutputRef {
        self.bucket.output(Attribute::Arn)
    }

    /// Read access to the container and its objects
    ///
    /// Object keys are only known once the store is seeded, so object reads
    /// go through a justified sub-resource wildcard.
    pub fn read_statements(&self) -> Vec<PolicyStatement> {
        vec![
            PolicyStatement::allow(
                CONTAINER_READ_ACTIONS.iter().copied(),
                [ResourcePattern::Exact(self.arn())],
            ),
            PolicyStatement::allow(
                OBJECT_READ_ACTIONS.iter().copied(),
                [ResourcePattern::SubResources(self.arn())],
            )
            .justified("Configuration objects are addressed by key beneath the container"),
        ]
    }
}
