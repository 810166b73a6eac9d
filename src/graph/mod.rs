// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Graph
//!
//! Declarations are turned into materialized resources in two phases:
//!
//! ```text
//! Builder phase                      Resolver phase
//! ─────────────                      ──────────────
//! GraphBuilder::add(node)            ResourceGraph::levels()
//!   records intent only                walks dependency levels
//!   properties may hold OutputRef      substitutes resolved outputs
//!        │                                   │
//!        ▼                                   ▼
//! GraphBuilder::finish() ──────────▶ ResourceGraph::resolve_node()
//!   validates references, cycles
//! ```
//!
//! A reference always names a resource *and* one of the output slots its
//! [`ResourceKind`] exposes, so a dangling or misspelled reference is caught
//! when the graph is finished rather than during provisioning.

pub mod resolver;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use thiserror::Error;

use crate::domain::annotations::Annotation;
use crate::domain::resource_type::{Attribute, ResourceKind};

pub use resolver::{dependency_levels, OutputTable};

/// Dependency resolution errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Invalid logical id '{0}': must start with a letter and be alphanumeric")]
    InvalidResourceId(String),

    #[error("Resource {0} is declared twice")]
    DuplicateResource(ResourceId),

    #[error("{from} references unknown resource {target}")]
    UnknownResource { from: ResourceId, target: ResourceId },

    #[error("{from} references {target}.{attribute}, which {target} does not expose")]
    UnknownOutput {
        from: ResourceId,
        target: ResourceId,
        attribute: Attribute,
    },

    #[error("Dependency cycle among: {0:?}")]
    Cycle(Vec<ResourceId>),

    #[error("{resource} needs {reference}, which has not been materialized")]
    Unresolved { resource: ResourceId, reference: String },

    #[error("{resource} joins a non-scalar value")]
    InvalidJoin { resource: ResourceId },

    #[error("Resource {0} is not part of the graph")]
    UnknownNode(ResourceId),
}

/// Logical identifier of a declared resource
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    /// Create a logical id
    ///
    /// # Invariants
    /// - Non-empty
    /// - Starts with an ASCII letter
    /// - ASCII alphanumeric only
    pub fn new(id: impl Into<String>) -> Result<Self, GraphError> {
        let id = id.into();
        let valid = id
            .chars()
            .next()
            .map(|c| c.is_ascii_alphabetic())
            .unwrap_or(false)
            && id.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid {
            return Err(GraphError::InvalidResourceId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reference one of this resource's output slots
    pub fn output(&self, attribute: Attribute) -> OutputRef {
        OutputRef {
            resource: self.clone(),
            attribute,
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ResourceId {
    type Error = GraphError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}

/// Typed reference to a post-creation attribute of another resource
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    pub resource: ResourceId,
    pub attribute: Attribute,
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.attribute)
    }
}

/// Declared property value, possibly containing unresolved references
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<PropertyValue>),
    Map(BTreeMap<String, PropertyValue>),
    /// Value of another resource's output slot
    Ref(OutputRef),
    /// String concatenation of scalar parts
    Join(Vec<PropertyValue>),
}

impl PropertyValue {
    /// Build a map value from key/value pairs
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, PropertyValue)>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build a list value
    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<PropertyValue>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Collect every output this value references
    pub fn references(&self, out: &mut BTreeSet<OutputRef>) {
        match self {
            Self::Ref(r) => {
                out.insert(r.clone());
            }
            Self::List(items) | Self::Join(items) => {
                items.iter().for_each(|item| item.references(out));
            }
            Self::Map(entries) => {
                entries.values().for_each(|v| v.references(out));
            }
            Self::Bool(_) | Self::Int(_) | Self::Str(_) => {}
        }
    }

    /// Render without resolving; references appear as `{"ref": "Id.Attr"}`
    pub fn render_unresolved(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => json!(i),
            Self::Str(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().map(Self::render_unresolved).collect()),
            Self::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.render_unresolved()))
                    .collect::<Map<_, _>>(),
            ),
            Self::Ref(r) => json!({ "ref": r.to_string() }),
            Self::Join(parts) => {
                json!({ "join": parts.iter().map(Self::render_unresolved).collect::<Vec<_>>() })
            }
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for PropertyValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u16> for PropertyValue {
    fn from(v: u16) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<&String> for PropertyValue {
    fn from(v: &String) -> Self {
        Self::Str(v.clone())
    }
}

impl From<OutputRef> for PropertyValue {
    fn from(v: OutputRef) -> Self {
        Self::Ref(v)
    }
}

/// One declared resource
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub properties: BTreeMap<String, PropertyValue>,
    /// Ordering-only dependencies that carry no value
    pub depends_on: BTreeSet<ResourceId>,
    pub annotations: Vec<Annotation>,
}

impl ResourceNode {
    pub fn new(id: ResourceId, kind: ResourceKind) -> Self {
        Self {
            id,
            kind,
            properties: BTreeMap::new(),
            depends_on: BTreeSet::new(),
            annotations: Vec::new(),
        }
    }

    /// Set a property
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Add an ordering-only dependency
    pub fn after(mut self, dependency: ResourceId) -> Self {
        self.depends_on.insert(dependency);
        self
    }

    /// Attach annotations declared with the resource
    pub fn annotated(mut self, annotations: impl IntoIterator<Item = Annotation>) -> Self {
        self.annotations.extend(annotations);
        self
    }

    /// Every output referenced from this node's properties
    pub fn output_references(&self) -> BTreeSet<OutputRef> {
        let mut refs = BTreeSet::new();
        self.properties.values().for_each(|v| v.references(&mut refs));
        refs
    }

    /// Every resource this node must be materialized after
    pub fn dependencies(&self) -> BTreeSet<ResourceId> {
        self.output_references()
            .into_iter()
            .map(|r| r.resource)
            .chain(self.depends_on.iter().cloned())
            .collect()
    }
}

/// Builder phase: records declarations, resolves nothing
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<ResourceNode>,
    index: HashMap<ResourceId, usize>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a declaration
    ///
    /// References may point at resources declared later; they are checked
    /// by [`GraphBuilder::finish`].
    pub fn add(&mut self, node: ResourceNode) -> Result<ResourceId, GraphError> {
        if self.index.contains_key(&node.id) {
            return Err(GraphError::DuplicateResource(node.id));
        }
        let id = node.id.clone();
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(id)
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.index.contains_key(id)
    }

    /// Validate references and compute dependency levels
    pub fn finish(self) -> Result<ResourceGraph, GraphError> {
        for node in &self.nodes {
            for reference in node.output_references() {
                let target = self
                    .index
                    .get(&reference.resource)
                    .map(|&i| &self.nodes[i])
                    .ok_or_else(|| GraphError::UnknownResource {
                        from: node.id.clone(),
                        target: reference.resource.clone(),
                    })?;
                if !target.kind.exposes(reference.attribute) {
                    return Err(GraphError::UnknownOutput {
                        from: node.id.clone(),
                        target: reference.resource.clone(),
                        attribute: reference.attribute,
                    });
                }
            }
            for dependency in &node.depends_on {
                if !self.index.contains_key(dependency) {
                    return Err(GraphError::UnknownResource {
                        from: node.id.clone(),
                        target: dependency.clone(),
                    });
                }
            }
        }

        let levels = dependency_levels(
            self.nodes
                .iter()
                .map(|n| (n.id.clone(), n.dependencies())),
        )?;

        Ok(ResourceGraph {
            nodes: self.nodes,
            index: self.index,
            levels,
        })
    }
}

/// Validated, acyclic resource graph
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    nodes: Vec<ResourceNode>,
    index: HashMap<ResourceId, usize>,
    levels: Vec<Vec<ResourceId>>,
}

impl ResourceGraph {
    /// Nodes in declaration order
    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.iter()
    }

    pub fn node(&self, id: &ResourceId) -> Option<&ResourceNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Creation order: every resource appears in a later level than all of
    /// its dependencies. Siblings within a level are unordered.
    pub fn levels(&self) -> &[Vec<ResourceId>] {
        &self.levels
    }

    /// Teardown order: dependents before dependencies
    pub fn teardown_levels(&self) -> Vec<Vec<ResourceId>> {
        self.levels.iter().rev().cloned().collect()
    }

    /// Level index of a resource in creation order
    pub fn level_of(&self, id: &ResourceId) -> Option<usize> {
        self.levels.iter().position(|level| level.contains(id))
    }

    pub fn dependencies(&self, id: &ResourceId) -> Result<BTreeSet<ResourceId>, GraphError> {
        self.node(id)
            .map(ResourceNode::dependencies)
            .ok_or_else(|| GraphError::UnknownNode(id.clone()))
    }

    /// Resources that must be removed before `id` can be
    pub fn dependents(&self, id: &ResourceId) -> BTreeSet<ResourceId> {
        self.nodes
            .iter()
            .filter(|n| n.dependencies().contains(id))
            .map(|n| n.id.clone())
            .collect()
    }

    /// Substitute resolved outputs into a node's properties
    pub fn resolve_node(&self, id: &ResourceId, outputs: &OutputTable) -> Result<Value, GraphError> {
        let node = self
            .node(id)
            .ok_or_else(|| GraphError::UnknownNode(id.clone()))?;
        resolver::resolve_properties(node, outputs)
    }

    /// Render the whole graph without resolving references
    pub fn render_plan(&self) -> Value {
        let resources: Map<String, Value> = self
            .nodes
            .iter()
            .map(|node| {
                let properties: Map<String, Value> = node
                    .properties
                    .iter()
                    .map(|(k, v)| (k.clone(), v.render_unresolved()))
                    .collect();
                let mut entry = json!({
                    "kind": node.kind,
                    "level": self.level_of(&node.id),
                    "depends_on": node.dependencies(),
                    "properties": properties,
                });
                if !node.annotations.is_empty() {
                    entry["annotations"] = json!(node.annotations);
                }
                (node.id.to_string(), entry)
            })
            .collect();

        json!({
            "levels": self.levels,
            "resources": resources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ResourceId {
        ResourceId::new(s).unwrap()
    }

    #[test]
    fn test_resource_id_validation() {
        assert!(ResourceId::new("SearchDomain").is_ok());
        assert!(ResourceId::new("Subnet1").is_ok());
        assert!(ResourceId::new("").is_err());
        assert!(ResourceId::new("1Subnet").is_err());
        assert!(ResourceId::new("search-domain").is_err());
    }

    #[test]
    fn test_duplicate_declaration_rejected() {
        let mut builder = GraphBuilder::new();
        builder
            .add(ResourceNode::new(id("Vpc"), ResourceKind::Network))
            .unwrap();
        let err = builder
            .add(ResourceNode::new(id("Vpc"), ResourceKind::Network))
            .unwrap_err();
        assert_eq!(err, GraphError::DuplicateResource(id("Vpc")));
    }

    #[test]
    fn test_forward_reference_allowed() {
        let mut builder = GraphBuilder::new();
        builder
            .add(
                ResourceNode::new(id("Fn"), ResourceKind::Function)
                    .with("endpoint", id("Domain").output(Attribute::Endpoint)),
            )
            .unwrap();
        builder
            .add(ResourceNode::new(id("Domain"), ResourceKind::SearchDomain))
            .unwrap();
        let graph = builder.finish().unwrap();
        assert_eq!(graph.level_of(&id("Domain")), Some(0));
        assert_eq!(graph.level_of(&id("Fn")), Some(1));
    }

    #[test]
    fn test_unknown_reference_rejected() {
        let mut builder = GraphBuilder::new();
        builder
            .add(
                ResourceNode::new(id("Fn"), ResourceKind::Function)
                    .with("endpoint", id("Missing").output(Attribute::Endpoint)),
            )
            .unwrap();
        assert!(matches!(
            builder.finish(),
            Err(GraphError::UnknownResource { .. })
        ));
    }

    #[test]
    fn test_unexposed_output_rejected() {
        let mut builder = GraphBuilder::new();
        builder
            .add(ResourceNode::new(id("Vpc"), ResourceKind::Network))
            .unwrap();
        builder
            .add(
                ResourceNode::new(id("Fn"), ResourceKind::Function)
                    .with("endpoint", id("Vpc").output(Attribute::Endpoint)),
            )
            .unwrap();
        assert!(matches!(
            builder.finish(),
            Err(GraphError::UnknownOutput { .. })
        ));
    }

    #[test]
    fn test_cycle_rejected() {
        let mut builder = GraphBuilder::new();
        builder
            .add(
                ResourceNode::new(id("A"), ResourceKind::Role)
                    .with("peer", id("B").output(Attribute::Arn)),
            )
            .unwrap();
        builder
            .add(
                ResourceNode::new(id("B"), ResourceKind::Role)
                    .with("peer", id("A").output(Attribute::Arn)),
            )
            .unwrap();
        assert!(matches!(builder.finish(), Err(GraphError::Cycle(_))));
    }

    #[test]
    fn test_dependents_and_teardown_order() {
        let mut builder = GraphBuilder::new();
        builder
            .add(ResourceNode::new(id("Vpc"), ResourceKind::Network))
            .unwrap();
        builder
            .add(
                ResourceNode::new(id("Subnet"), ResourceKind::Subnet)
                    .with("vpc", id("Vpc").output(Attribute::Id)),
            )
            .unwrap();
        let graph = builder.finish().unwrap();

        assert_eq!(graph.dependents(&id("Vpc")), BTreeSet::from([id("Subnet")]));
        let teardown = graph.teardown_levels();
        assert_eq!(teardown[0], vec![id("Subnet")]);
        assert_eq!(teardown[1], vec![id("Vpc")]);
    }

    #[test]
    fn test_render_plan_shows_references() {
        let mut builder = GraphBuilder::new();
        builder
            .add(ResourceNode::new(id("Vpc"), ResourceKind::Network))
            .unwrap();
        builder
            .add(
                ResourceNode::new(id("Subnet"), ResourceKind::Subnet)
                    .with("vpc", id("Vpc").output(Attribute::Id)),
            )
            .unwrap();
        let plan = builder.finish().unwrap().render_plan();
        assert_eq!(
            plan["resources"]["Subnet"]["properties"]["vpc"],
            json!({ "ref": "Vpc.Id" })
        );
        assert_eq!(plan["resources"]["Subnet"]["level"], json!(1));
    }
}
