// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resolver phase: dependency levels and value substitution

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::{GraphError, OutputRef, PropertyValue, ResourceId, ResourceNode};
use crate::domain::resource_type::Attribute;

/// Resolved output slots of materialized resources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTable {
    outputs: BTreeMap<ResourceId, BTreeMap<Attribute, String>>,
}

impl OutputTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outputs of a materialized resource, replacing earlier ones
    pub fn insert(&mut self, id: ResourceId, outputs: BTreeMap<Attribute, String>) {
        self.outputs.insert(id, outputs);
    }

    pub fn remove(&mut self, id: &ResourceId) {
        self.outputs.remove(id);
    }

    pub fn get(&self, reference: &OutputRef) -> Option<&str> {
        self.outputs
            .get(&reference.resource)
            .and_then(|slots| slots.get(&reference.attribute))
            .map(String::as_str)
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.outputs.contains_key(id)
    }
}

/// Group resources into creation levels
///
/// Level 0 holds resources without dependencies; every other resource sits
/// one level after its deepest dependency. Dependencies on ids outside the
/// given set are ignored. Ids within a level are sorted.
pub fn dependency_levels<I>(nodes: I) -> Result<Vec<Vec<ResourceId>>, GraphError>
where
    I: IntoIterator<Item = (ResourceId, BTreeSet<ResourceId>)>,
{
    let mut graph: DiGraph<ResourceId, ()> = DiGraph::new();
    let mut indices: HashMap<ResourceId, NodeIndex> = HashMap::new();
    let mut edges = Vec::new();

    for (id, dependencies) in nodes {
        let idx = graph.add_node(id.clone());
        indices.insert(id, idx);
        edges.push((idx, dependencies));
    }

    for (idx, dependencies) in edges {
        for dependency in dependencies {
            if let Some(&dep_idx) = indices.get(&dependency) {
                // dependency -> dependent
                graph.add_edge(dep_idx, idx, ());
            }
        }
    }

    let order = toposort(&graph, None).map_err(|cycle| {
        let start = cycle.node_id();
        let mut members: Vec<ResourceId> = graph
            .neighbors_directed(start, Direction::Incoming)
            .map(|i| graph[i].clone())
            .collect();
        members.push(graph[start].clone());
        members.sort();
        members.dedup();
        GraphError::Cycle(members)
    })?;

    let mut depth: HashMap<NodeIndex, usize> = HashMap::new();
    for idx in &order {
        let level = graph
            .neighbors_directed(*idx, Direction::Incoming)
            .filter_map(|dep| depth.get(&dep))
            .map(|d| d + 1)
            .max()
            .unwrap_or(0);
        depth.insert(*idx, level);
    }

    let mut levels: Vec<Vec<ResourceId>> = Vec::new();
    for (idx, level) in depth {
        if levels.len() <= level {
            levels.resize_with(level + 1, Vec::new);
        }
        levels[level].push(graph[idx].clone());
    }
    levels.iter_mut().for_each(|level| level.sort());
    Ok(levels)
}

/// Substitute outputs into every property of a node
pub(crate) fn resolve_properties(
    node: &ResourceNode,
    outputs: &OutputTable,
) -> Result<Value, GraphError> {
    let mut resolved = Map::new();
    for (key, value) in &node.properties {
        resolved.insert(key.clone(), resolve_value(&node.id, value, outputs)?);
    }
    Ok(Value::Object(resolved))
}

fn resolve_value(
    owner: &ResourceId,
    value: &PropertyValue,
    outputs: &OutputTable,
) -> Result<Value, GraphError> {
    match value {
        PropertyValue::Bool(b) => Ok(Value::Bool(*b)),
        PropertyValue::Int(i) => Ok(Value::from(*i)),
        PropertyValue::Str(s) => Ok(Value::String(s.clone())),
        PropertyValue::List(items) => items
            .iter()
            .map(|item| resolve_value(owner, item, outputs))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        PropertyValue::Map(entries) => {
            let mut map = Map::new();
            for (k, v) in entries {
                map.insert(k.clone(), resolve_value(owner, v, outputs)?);
            }
            Ok(Value::Object(map))
        }
        PropertyValue::Ref(reference) => outputs
            .get(reference)
            .map(|v| Value::String(v.to_string()))
            .ok_or_else(|| GraphError::Unresolved {
                resource: owner.clone(),
                reference: reference.to_string(),
            }),
        PropertyValue::Join(parts) => {
            let mut joined = String::new();
            for part in parts {
                match resolve_value(owner, part, outputs)? {
                    Value::String(s) => joined.push_str(&s),
                    Value::Number(n) => joined.push_str(&n.to_string()),
                    Value::Bool(b) => joined.push_str(&b.to_string()),
                    _ => {
                        return Err(GraphError::InvalidJoin {
                            resource: owner.clone(),
                        })
                    }
                }
            }
            Ok(Value::String(joined))
        }
    }
}
