// Copyright (c) 2025 - Cowboy AI, Inc.
//! Reachability Policy Composer
//!
//! Traffic between endpoint groups is declared once, as a [`PermittedFlow`].
//! Each flow renders two projections:
//!
//! ```text
//!   PermittedFlow(Compute -> DataStore, tcp/443)
//!        │
//!        ├──▶ egress  at Compute   (peer: DataStore, tcp/443)
//!        └──▶ ingress at DataStore (peer: Compute,   tcp/443)
//! ```
//!
//! A rule can therefore never be declared without its counterpart.
//!
//! Groups flagged `allow_all_outbound` get one blanket egress rule instead
//! of per-flow egress. Their flows still render the destination ingress:
//! open egress alone does not make a destination accept traffic, and a
//! missing ingress rule drops packets silently.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::invariants::{ValidationError, ValidationResult};
use crate::domain::network::NetworkHandle;
use crate::domain::resource_type::{Attribute, ResourceKind};
use crate::domain::DeclareError;
use crate::graph::{GraphBuilder, OutputRef, PropertyValue, ResourceId, ResourceNode};

/// Transport protocol of a flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Self::Tcp => "Tcp",
            Self::Udp => "Udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Named logical set of resource attachments
///
/// Rules attach to groups, so any resource placed in a group inherits the
/// group's rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointGroup {
    pub id: ResourceId,
    pub description: String,
    pub allow_all_outbound: bool,
}

impl EndpointGroup {
    /// Create a group with no outbound traffic beyond declared flows
    pub fn new(id: ResourceId, description: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
            allow_all_outbound: false,
        }
    }

    /// Open all outbound traffic for this group
    pub fn allow_all_outbound(mut self) -> Self {
        self.allow_all_outbound = true;
        self
    }
}

/// Identity of a flow, independent of its justification
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlowKey {
    pub source: ResourceId,
    pub destination: ResourceId,
    pub protocol: Protocol,
    pub port: u16,
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} {}/{}",
            self.source, self.destination, self.protocol, self.port
        )
    }
}

/// Required traffic between two groups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermittedFlow {
    pub key: FlowKey,
    /// Audit text carried on both rendered rules
    pub justification: String,
}

impl PermittedFlow {
    pub fn new(
        source: ResourceId,
        destination: ResourceId,
        protocol: Protocol,
        port: u16,
        justification: impl Into<String>,
    ) -> Self {
        Self {
            key: FlowKey {
                source,
                destination,
                protocol,
                port,
            },
            justification: justification.into(),
        }
    }
}

/// Rule direction relative to the group it is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ingress,
    Egress,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingress => write!(f, "ingress"),
            Self::Egress => write!(f, "egress"),
        }
    }
}

/// Other side of a rule
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Peer {
    Group(ResourceId),
    /// Any IPv4 address (`0.0.0.0/0`)
    AnyIpv4,
}

/// Protocol/port coverage of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortScope {
    All,
    Single(Protocol, u16),
}

impl PortScope {
    fn covers(&self, protocol: Protocol, port: u16) -> bool {
        match self {
            Self::All => true,
            Self::Single(p, n) => *p == protocol && *n == port,
        }
    }
}

/// One directional rule attached to a group
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RenderedRule {
    pub group: ResourceId,
    pub direction: Direction,
    pub peer: Peer,
    pub scope: PortScope,
    pub justification: String,
}

impl RenderedRule {
    /// Whether this rule lets the flow pass on its side of the connection
    pub fn covers(&self, flow: &FlowKey) -> bool {
        let (own, other) = match self.direction {
            Direction::Egress => (&flow.source, &flow.destination),
            Direction::Ingress => (&flow.destination, &flow.source),
        };
        let peer_matches = match &self.peer {
            Peer::Group(g) => g == other,
            Peer::AnyIpv4 => true,
        };
        &self.group == own && peer_matches && self.scope.covers(flow.protocol, flow.port)
    }

    /// The exact flow this rule was rendered from, if it is flow-scoped
    pub fn flow(&self) -> Option<FlowKey> {
        match (&self.peer, self.scope) {
            (Peer::Group(peer), PortScope::Single(protocol, port)) => {
                let (source, destination) = match self.direction {
                    Direction::Egress => (self.group.clone(), peer.clone()),
                    Direction::Ingress => (peer.clone(), self.group.clone()),
                };
                Some(FlowKey {
                    source,
                    destination,
                    protocol,
                    port,
                })
            }
            _ => None,
        }
    }

    fn logical_id(&self) -> Result<ResourceId, DeclareError> {
        let peer = match &self.peer {
            Peer::Group(g) => g.to_string(),
            Peer::AnyIpv4 => "AnyIpv4".to_string(),
        };
        let scope = match self.scope {
            PortScope::All => "All".to_string(),
            PortScope::Single(p, n) => format!("{}{}", p.title(), n),
        };
        let id = match self.direction {
            Direction::Egress => format!("{}To{}{}Egress", self.group, peer, scope),
            Direction::Ingress => format!("{}From{}{}Ingress", self.group, peer, scope),
        };
        Ok(ResourceId::new(id)?)
    }
}

impl fmt::Display for RenderedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let peer = match &self.peer {
            Peer::Group(g) => g.to_string(),
            Peer::AnyIpv4 => "0.0.0.0/0".to_string(),
        };
        let scope = match self.scope {
            PortScope::All => "all".to_string(),
            PortScope::Single(p, n) => format!("{}/{}", p, n),
        };
        write!(f, "{} {} {} {}", self.group, self.direction, peer, scope)
    }
}

/// Declared groups and flows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReachabilityPolicy {
    groups: BTreeMap<ResourceId, EndpointGroup>,
    flows: BTreeMap<FlowKey, PermittedFlow>,
}

impl ReachabilityPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_group(&mut self, group: EndpointGroup) -> ValidationResult {
        if self.groups.contains_key(&group.id) {
            return Err(ValidationError::DuplicateEndpointGroup(group.id.to_string()));
        }
        self.groups.insert(group.id.clone(), group);
        Ok(())
    }

    pub fn group(&self, id: &ResourceId) -> Option<&EndpointGroup> {
        self.groups.get(id)
    }

    pub fn groups(&self) -> impl Iterator<Item = &EndpointGroup> {
        self.groups.values()
    }

    pub fn flows(&self) -> impl Iterator<Item = &PermittedFlow> {
        self.flows.values()
    }

    /// Declare a required flow between two known groups
    ///
    /// Declaring the same (source, destination, protocol, port) twice keeps
    /// one flow; the latest justification wins.
    pub fn permit(
        &mut self,
        source: &ResourceId,
        destination: &ResourceId,
        protocol: Protocol,
        port: u16,
        justification: impl Into<String>,
    ) -> ValidationResult {
        for group in [source, destination] {
            if !self.groups.contains_key(group) {
                return Err(ValidationError::UnknownEndpointGroup(group.to_string()));
            }
        }
        let flow = PermittedFlow::new(
            source.clone(),
            destination.clone(),
            protocol,
            port,
            justification,
        );
        self.flows.insert(flow.key.clone(), flow);
        Ok(())
    }

    /// Declare the same TCP flow on several ports
    pub fn permit_tcp_ports(
        &mut self,
        source: &ResourceId,
        destination: &ResourceId,
        ports: &[u16],
        justification: &str,
    ) -> ValidationResult {
        ports
            .iter()
            .try_for_each(|port| self.permit(source, destination, Protocol::Tcp, *port, justification))
    }

    /// Render both projections of every flow, plus blanket egress rules
    pub fn render(&self) -> Vec<RenderedRule> {
        let mut rules = Vec::new();

        for group in self.groups.values().filter(|g| g.allow_all_outbound) {
            rules.push(RenderedRule {
                group: group.id.clone(),
                direction: Direction::Egress,
                peer: Peer::AnyIpv4,
                scope: PortScope::All,
                justification: "Allow all outbound traffic by default".to_string(),
            });
        }

        for flow in self.flows.values() {
            let key = &flow.key;
            let source_open = self
                .groups
                .get(&key.source)
                .map(|g| g.allow_all_outbound)
                .unwrap_or(false);
            if !source_open {
                rules.push(RenderedRule {
                    group: key.source.clone(),
                    direction: Direction::Egress,
                    peer: Peer::Group(key.destination.clone()),
                    scope: PortScope::Single(key.protocol, key.port),
                    justification: flow.justification.clone(),
                });
            }
            rules.push(RenderedRule {
                group: key.destination.clone(),
                direction: Direction::Ingress,
                peer: Peer::Group(key.source.clone()),
                scope: PortScope::Single(key.protocol, key.port),
                justification: flow.justification.clone(),
            });
        }

        rules
    }

    /// Audit view over the rendered rules
    pub fn audit(&self) -> ReachabilityAudit {
        ReachabilityAudit::from_rules(
            self.groups
                .values()
                .map(|g| (g.id.clone(), g.allow_all_outbound))
                .collect(),
            self.render(),
        )
    }

    /// Record groups and rules in the graph
    ///
    /// Blanket egress is rendered inline on the group; every flow-scoped rule
    /// becomes its own node so either side can be replaced independently.
    pub fn declare(
        &self,
        graph: &mut GraphBuilder,
        network: &NetworkHandle,
    ) -> Result<ReachabilityHandle, DeclareError> {
        for group in self.groups.values() {
            let egress = if group.allow_all_outbound {
                PropertyValue::List(vec![PropertyValue::map([
                    ("cidr_ip", PropertyValue::from("0.0.0.0/0")),
                    ("ip_protocol", PropertyValue::from("-1")),
                    (
                        "description",
                        PropertyValue::from("Allow all outbound traffic by default"),
                    ),
                ])])
            } else {
                PropertyValue::List(Vec::new())
            };
            graph.add(
                ResourceNode::new(group.id.clone(), ResourceKind::SecurityGroup)
                    .with("vpc_id", network.network_id())
                    .with("description", group.description.clone())
                    .with("allow_all_outbound", group.allow_all_outbound)
                    .with("egress", egress),
            )?;
        }

        let mut rules = Vec::new();
        for rule in self.render() {
            let (kind, peer) = match (&rule.direction, &rule.peer) {
                (_, Peer::AnyIpv4) => continue,
                (Direction::Egress, Peer::Group(peer)) => {
                    (ResourceKind::SecurityGroupEgress, ("destination_group_id", peer))
                }
                (Direction::Ingress, Peer::Group(peer)) => {
                    (ResourceKind::SecurityGroupIngress, ("source_group_id", peer))
                }
            };
            let (protocol, port) = match rule.scope {
                PortScope::Single(protocol, port) => (protocol.as_str(), i64::from(port)),
                PortScope::All => ("-1", -1),
            };
            let id = graph.add(
                ResourceNode::new(rule.logical_id()?, kind)
                    .with("group_id", rule.group.output(Attribute::Id))
                    .with(peer.0, peer.1.output(Attribute::Id))
                    .with("ip_protocol", protocol)
                    .with("from_port", port)
                    .with("to_port", port)
                    .with("description", rule.justification.clone()),
            )?;
            rules.push(id);
        }

        Ok(ReachabilityHandle {
            groups: self.groups.keys().cloned().collect(),
            rules,
        })
    }
}

/// Handle returned from declaring reachability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReachabilityHandle {
    pub groups: Vec<ResourceId>,
    pub rules: Vec<ResourceId>,
}

impl ReachabilityHandle {
    pub fn group_id(&self, group: &ResourceId) -> Result<OutputRef, ValidationError> {
        self.groups
            .iter()
            .find(|g| *g == group)
            .map(|g| g.output(Attribute::Id))
            .ok_or_else(|| ValidationError::UnknownEndpointGroup(group.to_string()))
    }
}

/// Answers reachability questions against rendered rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReachabilityAudit {
    open_outbound: BTreeMap<ResourceId, bool>,
    rules: Vec<RenderedRule>,
}

impl ReachabilityAudit {
    /// Audit an arbitrary rule set
    pub fn from_rules(open_outbound: BTreeMap<ResourceId, bool>, rules: Vec<RenderedRule>) -> Self {
        Self {
            open_outbound,
            rules,
        }
    }

    pub fn rules(&self) -> &[RenderedRule] {
        &self.rules
    }

    /// Rules attached to a group in one direction
    pub fn rules_for(&self, group: &ResourceId, direction: Direction) -> Vec<&RenderedRule> {
        self.rules
            .iter()
            .filter(|r| &r.group == group && r.direction == direction)
            .collect()
    }

    fn matching(&self, flow: &FlowKey, direction: Direction) -> usize {
        self.rules
            .iter()
            .filter(|r| r.direction == direction && r.covers(flow))
            .count()
    }

    /// Traffic passes only if the source may send and the destination accepts
    pub fn can_reach(
        &self,
        source: &ResourceId,
        destination: &ResourceId,
        protocol: Protocol,
        port: u16,
    ) -> bool {
        let flow = FlowKey {
            source: source.clone(),
            destination: destination.clone(),
            protocol,
            port,
        };
        self.matching(&flow, Direction::Egress) > 0 && self.matching(&flow, Direction::Ingress) > 0
    }

    /// Every flow has exactly one egress and one ingress rule
    pub fn verify_pairing<'a, I>(&self, flows: I) -> ValidationResult
    where
        I: IntoIterator<Item = &'a PermittedFlow>,
    {
        for flow in flows {
            for direction in [Direction::Egress, Direction::Ingress] {
                let matches = self.matching(&flow.key, direction);
                if matches != 1 {
                    return Err(ValidationError::UnpairedFlow {
                        flow: flow.key.to_string(),
                        direction: direction.to_string(),
                        matches,
                    });
                }
            }
        }
        Ok(())
    }

    /// No rule permits anything outside the declared flows
    ///
    /// The only exception is the blanket egress of a group explicitly
    /// flagged `allow_all_outbound`.
    pub fn verify_no_over_permission<'a, I>(&self, flows: I) -> ValidationResult
    where
        I: IntoIterator<Item = &'a PermittedFlow>,
    {
        let declared: Vec<&FlowKey> = flows.into_iter().map(|f| &f.key).collect();
        for rule in &self.rules {
            let permitted = match rule.flow() {
                Some(flow) => declared.contains(&&flow),
                None => {
                    rule.direction == Direction::Egress
                        && rule.peer == Peer::AnyIpv4
                        && self.open_outbound.get(&rule.group).copied().unwrap_or(false)
                }
            };
            if !permitted {
                return Err(ValidationError::OverPermission {
                    rule: rule.to_string(),
                });
            }
        }
        Ok(())
    }

    /// The group accepts ingress from groups only, never from address ranges
    pub fn verify_no_public_ingress(&self, group: &ResourceId) -> ValidationResult {
        let open = self
            .rules_for(group, Direction::Ingress)
            .into_iter()
            .any(|r| r.peer == Peer::AnyIpv4);
        if open {
            return Err(ValidationError::AddressRangeIngress {
                group: group.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn id(s: &str) -> ResourceId {
        ResourceId::new(s).unwrap()
    }

    fn policy() -> ReachabilityPolicy {
        let mut policy = ReachabilityPolicy::new();
        policy
            .add_group(EndpointGroup::new(id("ComputeGroup"), "compute units"))
            .unwrap();
        policy
            .add_group(EndpointGroup::new(id("DataStoreGroup"), "search domain"))
            .unwrap();
        policy
            .add_group(EndpointGroup::new(id("RunnerGroup"), "automation runner").allow_all_outbound())
            .unwrap();
        policy
    }

    #[test]
    fn test_flow_renders_both_projections() {
        let mut policy = policy();
        policy
            .permit(&id("ComputeGroup"), &id("DataStoreGroup"), Protocol::Tcp, 443, "query")
            .unwrap();
        let rules: Vec<RenderedRule> = policy
            .render()
            .into_iter()
            .filter(|r| r.peer != Peer::AnyIpv4)
            .collect();

        assert_eq!(
            rules,
            vec![
                RenderedRule {
                    group: id("ComputeGroup"),
                    direction: Direction::Egress,
                    peer: Peer::Group(id("DataStoreGroup")),
                    scope: PortScope::Single(Protocol::Tcp, 443),
                    justification: "query".to_string(),
                },
                RenderedRule {
                    group: id("DataStoreGroup"),
                    direction: Direction::Ingress,
                    peer: Peer::Group(id("ComputeGroup")),
                    scope: PortScope::Single(Protocol::Tcp, 443),
                    justification: "query".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_unknown_group_rejected() {
        let mut policy = policy();
        let err = policy
            .permit(&id("ComputeGroup"), &id("Nowhere"), Protocol::Tcp, 443, "x")
            .unwrap_err();
        assert_eq!(err, ValidationError::UnknownEndpointGroup("Nowhere".to_string()));
    }

    #[test]
    fn test_duplicate_group_rejected() {
        let mut policy = policy();
        assert!(policy
            .add_group(EndpointGroup::new(id("ComputeGroup"), "again"))
            .is_err());
    }

    #[test]
    fn test_duplicate_flow_collapses() {
        let mut policy = policy();
        policy
            .permit(&id("ComputeGroup"), &id("DataStoreGroup"), Protocol::Tcp, 443, "first")
            .unwrap();
        policy
            .permit(&id("ComputeGroup"), &id("DataStoreGroup"), Protocol::Tcp, 443, "second")
            .unwrap();
        assert_eq!(policy.flows().count(), 1);
        assert_eq!(policy.flows().next().unwrap().justification, "second");
    }

    #[test]
    fn test_open_outbound_group_still_needs_ingress() {
        let mut policy = policy();
        policy
            .permit(&id("RunnerGroup"), &id("DataStoreGroup"), Protocol::Tcp, 443, "apply")
            .unwrap();
        let audit = policy.audit();

        // Egress covered by the blanket rule, ingress rendered explicitly
        assert!(audit.rules_for(&id("RunnerGroup"), Direction::Egress).len() == 1);
        assert!(audit.can_reach(&id("RunnerGroup"), &id("DataStoreGroup"), Protocol::Tcp, 443));

        // Without the ingress projection the destination drops the traffic
        let open = BTreeMap::from([(id("RunnerGroup"), true)]);
        let egress_only: Vec<RenderedRule> = audit
            .rules()
            .iter()
            .filter(|r| r.direction == Direction::Egress)
            .cloned()
            .collect();
        let broken = ReachabilityAudit::from_rules(open, egress_only);
        assert!(!broken.can_reach(&id("RunnerGroup"), &id("DataStoreGroup"), Protocol::Tcp, 443));
        assert!(matches!(
            broken.verify_pairing(policy.flows()),
            Err(ValidationError::UnpairedFlow { matches: 0, .. })
        ));
    }

    #[test]
    fn test_reverse_direction_not_reachable() {
        let mut policy = policy();
        policy
            .permit(&id("ComputeGroup"), &id("DataStoreGroup"), Protocol::Tcp, 443, "query")
            .unwrap();
        let audit = policy.audit();
        assert!(!audit.can_reach(&id("DataStoreGroup"), &id("ComputeGroup"), Protocol::Tcp, 443));
        assert!(!audit.can_reach(&id("ComputeGroup"), &id("DataStoreGroup"), Protocol::Tcp, 9200));
    }

    #[test]
    fn test_tampered_rule_is_over_permission() {
        let mut policy = policy();
        policy
            .permit(&id("ComputeGroup"), &id("DataStoreGroup"), Protocol::Tcp, 443, "query")
            .unwrap();
        let mut rules = policy.render();
        rules.push(RenderedRule {
            group: id("DataStoreGroup"),
            direction: Direction::Ingress,
            peer: Peer::AnyIpv4,
            scope: PortScope::Single(Protocol::Tcp, 443),
            justification: "oops".to_string(),
        });
        let audit = ReachabilityAudit::from_rules(BTreeMap::new(), rules);
        assert!(audit.verify_no_over_permission(policy.flows()).is_err());
        assert!(audit.verify_no_public_ingress(&id("DataStoreGroup")).is_err());
    }

    #[test]
    fn test_declare_creates_rule_nodes() {
        use crate::domain::network::{Cidr, NetworkFabricSpec};

        let mut graph = GraphBuilder::new();
        let network = NetworkFabricSpec::new(id("Vpc"), Cidr::parse("10.0.0.0/16").unwrap(), "us-east-2", 2)
            .unwrap()
            .declare(&mut graph)
            .unwrap();

        let mut policy = policy();
        policy
            .permit_tcp_ports(&id("ComputeGroup"), &id("DataStoreGroup"), &[80, 443], "query")
            .unwrap();
        let handle = policy.declare(&mut graph, &network).unwrap();
        assert_eq!(handle.rules.len(), 4);
        assert!(handle.rules.contains(&id("ComputeGroupToDataStoreGroupTcp443Egress")));
        assert!(handle.rules.contains(&id("DataStoreGroupFromComputeGroupTcp80Ingress")));

        let graph = graph.finish().unwrap();
        let ingress = graph
            .node(&id("DataStoreGroupFromComputeGroupTcp80Ingress"))
            .unwrap();
        assert_eq!(ingress.kind, ResourceKind::SecurityGroupIngress);
        assert!(ingress.dependencies().contains(&id("ComputeGroup")));
        assert!(ingress.dependencies().contains(&id("DataStoreGroup")));
    }
}
