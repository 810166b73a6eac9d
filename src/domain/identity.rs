// Copyright (c) 2025 - Cowboy AI, Inc.
//! Identity & Trust Resolver
//!
//! One identity per role in the enclave. Each identity is declared as two
//! graph nodes:
//!
//! ```text
//!   Role        trust statement, exposes Arn / Name / UniqueId
//!   RolePolicy  permission statements, attached to the role by name
//! ```
//!
//! Keeping permissions out of the role node lets a data store name a role
//! as its administrator while the role's permissions reference that same
//! data store.
//!
//! Permissions are never granted directly. Consumers are bound to an
//! identity and state what they need; the identity's statements are the
//! union of those requirements plus `sts:AssumeRole` for every delegation.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::domain::annotations::Annotation;
use crate::domain::invariants::{validate_data_plane_actions, ValidationError, ValidationResult};
use crate::domain::resource_type::{Attribute, ResourceKind};
use crate::domain::DeclareError;
use crate::graph::{GraphBuilder, OutputRef, PropertyValue, ResourceId, ResourceNode};

/// Service principal of request-driven functions
pub const FUNCTION_SERVICE: &str = "lambda.amazonaws.com";

/// Service principal of build environments
pub const BUILD_SERVICE: &str = "codebuild.amazonaws.com";

/// Manage network interfaces for in-network placement; no resource-level ARNs exist
pub const NETWORK_ATTACHMENT_ACTIONS: &[&str] = &[
    "ec2:AttachNetworkInterface",
    "ec2:CreateNetworkInterface",
    "ec2:DeleteNetworkInterface",
    "ec2:DescribeInstances",
    "ec2:DescribeNetworkInterfaces",
];

/// Deliver execution logs
pub const LOG_DELIVERY_ACTIONS: &[&str] = &[
    "logs:CreateLogGroup",
    "logs:CreateLogStream",
    "logs:PutLogEvents",
];

/// HTTP data-plane actions for index maintenance
pub const DATA_PLANE_READ_WRITE: &[&str] = &[
    "es:ESHttpDelete",
    "es:ESHttpGet",
    "es:ESHttpHead",
    "es:ESHttpPatch",
    "es:ESHttpPost",
    "es:ESHttpPut",
];

/// HTTP data-plane actions for search; POST carries query bodies
pub const DATA_PLANE_READ: &[&str] = &["es:ESHttpGet", "es:ESHttpHead", "es:ESHttpPost"];

/// Locate and list a storage container
pub const CONTAINER_READ_ACTIONS: &[&str] = &["s3:GetBucketLocation", "s3:ListBucket"];

/// Read objects held in a storage container
pub const OBJECT_READ_ACTIONS: &[&str] = &["s3:GetObject"];

const ASSUME_ROLE: &str = "sts:AssumeRole";
const POLICY_VERSION: &str = "2012-10-17";
const WILDCARD_RULE: &str = "AwsSolutions-IAM5";

/// Who may assume an identity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Principal {
    /// A platform service (e.g. `lambda.amazonaws.com`)
    Service(String),
    /// Another identity declared in the same resolver
    Identity(ResourceId),
}

impl Principal {
    pub fn service(name: impl Into<String>) -> Self {
        Self::Service(name.into())
    }

    fn render(&self) -> PropertyValue {
        match self {
            Self::Service(name) => PropertyValue::map([("Service", PropertyValue::from(name))]),
            Self::Identity(id) => PropertyValue::map([("AWS", id.output(Attribute::Arn).into())]),
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service(name) => write!(f, "service:{}", name),
            Self::Identity(id) => write!(f, "identity:{}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "Allow",
            Self::Deny => "Deny",
        }
    }
}

/// Resources a statement applies to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourcePattern {
    /// Every resource (`*`)
    Any,
    /// One declared resource, by its ARN slot
    Exact(OutputRef),
    /// Everything beneath a declared resource (`<arn>/*`)
    SubResources(OutputRef),
    /// A literal ARN pattern
    Literal(String),
}

impl ResourcePattern {
    pub fn render(&self) -> PropertyValue {
        match self {
            Self::Any => PropertyValue::from("*"),
            Self::Exact(r) => PropertyValue::Ref(r.clone()),
            Self::SubResources(r) => {
                PropertyValue::Join(vec![PropertyValue::Ref(r.clone()), "/*".into()])
            }
            Self::Literal(s) => PropertyValue::from(s),
        }
    }

    fn is_wildcard(&self) -> bool {
        match self {
            Self::Any | Self::SubResources(_) => true,
            Self::Literal(s) => s.contains('*'),
            Self::Exact(_) => false,
        }
    }

    /// Compliance finding this pattern raises when it is a wildcard
    fn finding(&self) -> String {
        match self {
            Self::Any => "Resource::*".to_string(),
            Self::Exact(r) => format!("Resource::<{}>", r),
            Self::SubResources(r) => format!("Resource::<{}>/*", r),
            Self::Literal(s) => format!("Resource::{}", s),
        }
    }
}

impl fmt::Display for ResourcePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Exact(r) => write!(f, "{}", r),
            Self::SubResources(r) => write!(f, "{}/*", r),
            Self::Literal(s) => write!(f, "{}", s),
        }
    }
}

/// Resource-action-effect triple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyStatement {
    pub effect: Effect,
    pub actions: BTreeSet<String>,
    pub resources: Vec<ResourcePattern>,
    /// Required when the statement uses a wildcard
    pub justification: Option<String>,
}

impl PolicyStatement {
    pub fn allow<'a, A, R>(actions: A, resources: R) -> Self
    where
        A: IntoIterator<Item = &'a str>,
        R: IntoIterator<Item = ResourcePattern>,
    {
        let mut resources: Vec<ResourcePattern> = resources.into_iter().collect();
        resources.sort();
        resources.dedup();
        Self {
            effect: Effect::Allow,
            actions: actions.into_iter().map(str::to_string).collect(),
            resources,
            justification: None,
        }
    }

    /// Record why a wildcard grant is unavoidable
    pub fn justified(mut self, reason: impl Into<String>) -> Self {
        self.justification = Some(reason.into());
        self
    }

    /// True when any action or any resource is matched by a wildcard
    ///
    /// Partial action wildcards (`s3:List*`) and sub-resource patterns
    /// (`<arn>/*`) count.
    pub fn is_wildcard(&self) -> bool {
        !self.wildcard_findings().is_empty()
    }

    /// One finding per wildcard action and wildcard resource
    pub fn wildcard_findings(&self) -> Vec<String> {
        self.actions
            .iter()
            .filter(|a| a.contains('*'))
            .map(|a| format!("Action::{}", a))
            .chain(
                self.resources
                    .iter()
                    .filter(|r| r.is_wildcard())
                    .map(ResourcePattern::finding),
            )
            .collect()
    }

    /// Reject unjustified wildcards and service-wide data-plane grants
    pub fn check(&self, identity: &str) -> ValidationResult {
        if self.is_wildcard() && self.justification.is_none() {
            return Err(ValidationError::UnjustifiedWildcard {
                identity: identity.to_string(),
                statement: self.to_string(),
            });
        }
        validate_data_plane_actions(
            identity,
            self.actions
                .iter()
                .filter(|a| a.starts_with("es:"))
                .map(String::as_str),
        )
    }

    pub fn render(&self) -> PropertyValue {
        PropertyValue::map([
            ("Effect", PropertyValue::from(self.effect.as_str())),
            (
                "Action",
                PropertyValue::list(self.actions.iter().map(String::as_str)),
            ),
            (
                "Resource",
                PropertyValue::List(self.resources.iter().map(ResourcePattern::render).collect()),
            ),
        ])
    }

    fn merge_key(&self) -> (Effect, Vec<ResourcePattern>, Option<String>) {
        (self.effect, self.resources.clone(), self.justification.clone())
    }

    /// Whether this statement grants `action` on `resource`
    pub fn grants(&self, action: &str, resource: &ResourcePattern) -> bool {
        self.effect == Effect::Allow
            && self.actions.contains(action)
            && self.resources.contains(resource)
    }
}

impl fmt::Display for PolicyStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let actions: Vec<&str> = self.actions.iter().map(String::as_str).collect();
        let resources: Vec<String> = self.resources.iter().map(|r| r.to_string()).collect();
        write!(
            f,
            "{} [{}] on [{}]",
            self.effect.as_str(),
            actions.join(", "),
            resources.join(", ")
        )
    }
}

/// What a bound consumer needs from its identity
#[derive(Debug, Clone, PartialEq, Eq)]
struct Requirement {
    consumer: ResourceId,
    statement: PolicyStatement,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct IdentityDecl {
    id: ResourceId,
    description: String,
    trusted: BTreeSet<Principal>,
    bound: BTreeSet<ResourceId>,
    requirements: Vec<Requirement>,
    assumes: BTreeSet<ResourceId>,
    annotations: Vec<Annotation>,
}

/// Graph ids of a resolved identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityHandle {
    pub role: ResourceId,
    pub policy: ResourceId,
}

impl IdentityHandle {
    /// Assumable-role identifier
    pub fn arn(&self) -> OutputRef {
        self.role.output(Attribute::Arn)
    }

    pub fn name(&self) -> OutputRef {
        self.role.output(Attribute::Name)
    }

    pub fn unique_id(&self) -> OutputRef {
        self.role.output(Attribute::UniqueId)
    }
}

/// Builds least-privilege identities from consumer requirements
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityResolver {
    identities: BTreeMap<ResourceId, IdentityDecl>,
}

impl IdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an identity with no trust and no permissions
    pub fn identity(&mut self, id: ResourceId, description: impl Into<String>) -> ValidationResult {
        if self.identities.contains_key(&id) {
            return Err(ValidationError::DuplicateIdentity(id.to_string()));
        }
        self.identities.insert(
            id.clone(),
            IdentityDecl {
                id,
                description: description.into(),
                trusted: BTreeSet::new(),
                bound: BTreeSet::new(),
                requirements: Vec::new(),
                assumes: BTreeSet::new(),
                annotations: Vec::new(),
            },
        );
        Ok(())
    }

    fn get_mut(&mut self, id: &ResourceId) -> Result<&mut IdentityDecl, ValidationError> {
        self.identities
            .get_mut(id)
            .ok_or_else(|| ValidationError::UnknownIdentity(id.to_string()))
    }

    fn get(&self, id: &ResourceId) -> Result<&IdentityDecl, ValidationError> {
        self.identities
            .get(id)
            .ok_or_else(|| ValidationError::UnknownIdentity(id.to_string()))
    }

    /// Allow a principal to assume the identity
    pub fn trust(&mut self, id: &ResourceId, principal: Principal) -> ValidationResult {
        if let Principal::Identity(other) = &principal {
            self.get(other)?;
        }
        self.get_mut(id)?.trusted.insert(principal);
        Ok(())
    }

    /// Bind a consumer resource to the identity
    pub fn bind(&mut self, id: &ResourceId, consumer: ResourceId) -> ValidationResult {
        self.get_mut(id)?.bound.insert(consumer);
        Ok(())
    }

    /// Record what a bound consumer needs
    pub fn require(
        &mut self,
        id: &ResourceId,
        consumer: &ResourceId,
        statement: PolicyStatement,
    ) -> ValidationResult {
        statement.check(id.as_str())?;
        let decl = self.get_mut(id)?;
        if !decl.bound.contains(consumer) {
            return Err(ValidationError::UnboundConsumer {
                identity: id.to_string(),
                consumer: consumer.to_string(),
            });
        }
        decl.requirements.push(Requirement {
            consumer: consumer.clone(),
            statement,
        });
        Ok(())
    }

    /// Let `delegate` act through `target`
    ///
    /// `target` trusts `delegate`, and `delegate` is granted permission to
    /// assume `target`. Neither side alone is sufficient.
    pub fn delegate(&mut self, delegate: &ResourceId, target: &ResourceId) -> ValidationResult {
        if delegate == target {
            return Err(ValidationError::LeastPrivilege {
                identity: delegate.to_string(),
                detail: "identity cannot delegate to itself".to_string(),
            });
        }
        self.get(target)?;
        self.get_mut(delegate)?.assumes.insert(target.clone());
        self.get_mut(target)?
            .trusted
            .insert(Principal::Identity(delegate.clone()));
        Ok(())
    }

    /// Attach an annotation to the identity's permission policy
    pub fn annotate(&mut self, id: &ResourceId, annotation: Annotation) -> ValidationResult {
        self.get_mut(id)?.annotations.push(annotation);
        Ok(())
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.identities.contains_key(id)
    }

    pub fn trusted(&self, id: &ResourceId) -> Result<&BTreeSet<Principal>, ValidationError> {
        Ok(&self.get(id)?.trusted)
    }

    pub fn bound(&self, id: &ResourceId) -> Result<&BTreeSet<ResourceId>, ValidationError> {
        Ok(&self.get(id)?.bound)
    }

    /// Effective permission statements
    ///
    /// Requirements sharing effect, resources and justification are merged
    /// into one statement whose actions are the union of theirs.
    pub fn statements(&self, id: &ResourceId) -> Result<Vec<PolicyStatement>, ValidationError> {
        let decl = self.get(id)?;
        let mut merged: BTreeMap<(Effect, Vec<ResourcePattern>, Option<String>), PolicyStatement> =
            BTreeMap::new();

        let delegations = decl.assumes.iter().map(|target| {
            PolicyStatement::allow([ASSUME_ROLE], [ResourcePattern::Exact(target.output(Attribute::Arn))])
        });
        let required = decl.requirements.iter().map(|r| r.statement.clone());

        for statement in required.chain(delegations) {
            match merged.get_mut(&statement.merge_key()) {
                Some(existing) => existing.actions.extend(statement.actions),
                None => {
                    merged.insert(statement.merge_key(), statement);
                }
            }
        }
        Ok(merged.into_values().collect())
    }

    /// Audit a statement set against what the identity's consumers need
    ///
    /// Every granted (action, resource) pair must be required by a bound
    /// consumer or by a delegation.
    pub fn audit_statements(&self, id: &ResourceId, statements: &[PolicyStatement]) -> ValidationResult {
        let needed = self.statements(id)?;
        for statement in statements {
            statement.check(id.as_str())?;
            for action in &statement.actions {
                for resource in &statement.resources {
                    if !needed.iter().any(|n| n.grants(action, resource)) {
                        return Err(ValidationError::LeastPrivilege {
                            identity: id.to_string(),
                            detail: format!("{} on {} is not required by any bound consumer", action, resource),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Check every identity before anything is declared
    pub fn validate(&self) -> ValidationResult {
        for decl in self.identities.values() {
            if decl.trusted.is_empty() {
                return Err(ValidationError::EmptyTrust {
                    identity: decl.id.to_string(),
                });
            }
            for requirement in &decl.requirements {
                if !decl.bound.contains(&requirement.consumer) {
                    return Err(ValidationError::UnboundConsumer {
                        identity: decl.id.to_string(),
                        consumer: requirement.consumer.to_string(),
                    });
                }
                requirement.statement.check(decl.id.as_str())?;
            }
            for target in &decl.assumes {
                let trusted_back = self
                    .get(target)?
                    .trusted
                    .contains(&Principal::Identity(decl.id.clone()));
                if !trusted_back {
                    return Err(ValidationError::LeastPrivilege {
                        identity: decl.id.to_string(),
                        detail: format!("may assume {}, which does not trust it", target),
                    });
                }
            }
        }
        Ok(())
    }

    /// Handle of a declared identity
    pub fn handle(&self, id: &ResourceId) -> Result<IdentityHandle, DeclareError> {
        let decl = self.get(id)?;
        Ok(IdentityHandle {
            role: decl.id.clone(),
            policy: ResourceId::new(format!("{}Policy", decl.id))?,
        })
    }

    /// Validate, then record every role and its permission policy
    pub fn resolve(
        &self,
        graph: &mut GraphBuilder,
    ) -> Result<BTreeMap<ResourceId, IdentityHandle>, DeclareError> {
        self.validate()?;
        let mut handles = BTreeMap::new();

        for decl in self.identities.values() {
            let handle = self.handle(&decl.id)?;

            let trust = decl
                .trusted
                .iter()
                .map(|principal| {
                    PropertyValue::map([
                        ("Effect", PropertyValue::from("Allow")),
                        ("Principal", principal.render()),
                        ("Action", PropertyValue::from(ASSUME_ROLE)),
                    ])
                })
                .collect();
            graph.add(
                ResourceNode::new(handle.role.clone(), ResourceKind::Role)
                    .with("description", decl.description.clone())
                    .with(
                        "assume_role_policy_document",
                        PropertyValue::map([
                            ("Version", PropertyValue::from(POLICY_VERSION)),
                            ("Statement", PropertyValue::List(trust)),
                        ]),
                    ),
            )?;

            let statements = self.statements(&decl.id)?;
            let mut annotations = decl.annotations.clone();
            annotations.extend(statements.iter().filter_map(|s| {
                let reason = s.justification.as_ref()?;
                let findings = s.wildcard_findings();
                if findings.is_empty() {
                    return None;
                }
                Some(
                    findings
                        .into_iter()
                        .fold(Annotation::new(WILDCARD_RULE, reason.clone()), |a, f| a.applies_to(f)),
                )
            }));
            graph.add(
                ResourceNode::new(handle.policy.clone(), ResourceKind::RolePolicy)
                    .with("role_name", handle.name())
                    .with("policy_name", format!("{}Permissions", decl.id))
                    .with(
                        "policy_document",
                        PropertyValue::map([
                            ("Version", PropertyValue::from(POLICY_VERSION)),
                            (
                                "Statement",
                                PropertyValue::List(statements.iter().map(PolicyStatement::render).collect()),
                            ),
                        ]),
                    )
                    .annotated(annotations),
            )?;

            handles.insert(decl.id.clone(), handle);
        }
        Ok(handles)
    }
}
