// Copyright (c) 2025 - Cowboy AI, Inc.
//! Reachability of the composed enclave
//!
//! Checks the rendered rule set of the default environment: which groups
//! can talk to the search domain, on which ports, and nothing more.

mod fixtures;

use cim_search_enclave::domain::{Direction, Protocol, ReachabilityAudit};
use cim_search_enclave::topology::DATA_STORE_PORTS;
use fixtures::*;
use pretty_assertions::assert_eq;
use test_case::test_case;

fn audit() -> ReachabilityAudit {
    enclave().audit()
}

#[test]
fn test_compute_group_egress_is_exactly_the_data_store_ports() {
    let enclave = enclave();
    let audit = enclave.audit();
    let ids = enclave.ids();

    let egress = audit.rules_for(&ids.compute_group, Direction::Egress);
    assert_eq!(egress.len(), DATA_STORE_PORTS.len());
    for rule in egress {
        let flow = rule.flow().expect("compute egress must be flow-scoped");
        assert_eq!(flow.destination, ids.data_group);
        assert!(DATA_STORE_PORTS.contains(&flow.port));
        assert_eq!(rule.justification, "Allow Lambda access to OpenSearch domain");
    }
}

#[test]
fn test_data_store_ingress_pairs_each_source() {
    let enclave = enclave();
    let audit = enclave.audit();
    let ids = enclave.ids();

    let ingress = audit.rules_for(&ids.data_group, Direction::Ingress);
    for source in [&ids.compute_group, &ids.runner_group] {
        let from_source: Vec<_> = ingress
            .iter()
            .filter_map(|r| r.flow())
            .filter(|f| &f.source == source)
            .collect();
        assert_eq!(from_source.len(), 2, "ingress from {}", source);
    }
    assert_eq!(ingress.len(), 4);
}

#[test_case(80, true ; "http")]
#[test_case(443, true ; "https")]
#[test_case(22, false ; "ssh")]
#[test_case(9200, false ; "native search port")]
fn test_compute_reaches_data_store_only_on_declared_ports(port: u16, expected: bool) {
    let enclave = enclave();
    let ids = enclave.ids();
    assert_eq!(
        audit().can_reach(&ids.compute_group, &ids.data_group, Protocol::Tcp, port),
        expected
    );
}

#[test]
fn test_runner_reaches_data_store_through_open_outbound() {
    let enclave = enclave();
    let audit = enclave.audit();
    let ids = enclave.ids();

    assert!(audit.can_reach(&ids.runner_group, &ids.data_group, Protocol::Tcp, 443));
    assert!(!audit.can_reach(&ids.runner_group, &ids.data_group, Protocol::Tcp, 5601));
    assert!(audit.rules_for(&ids.data_group, Direction::Egress).is_empty());
}

#[test]
fn test_nothing_reaches_compute_or_runner() {
    let enclave = enclave();
    let audit = enclave.audit();
    let ids = enclave.ids();

    assert!(audit.rules_for(&ids.compute_group, Direction::Ingress).is_empty());
    assert!(audit.rules_for(&ids.runner_group, Direction::Ingress).is_empty());
    assert!(!audit.can_reach(&ids.data_group, &ids.compute_group, Protocol::Tcp, 443));
}

#[test]
fn test_baseline_invariants_hold() {
    let enclave = enclave();
    let audit = enclave.audit();
    let flows: Vec<_> = enclave.reachability().flows().cloned().collect();

    assert_eq!(flows.len(), 4);
    audit.verify_pairing(&flows).unwrap();
    audit.verify_no_over_permission(&flows).unwrap();
    audit.verify_no_public_ingress(&enclave.ids().data_group).unwrap();
}

#[test]
fn test_undeclared_flow_is_over_permission() {
    let enclave = enclave();
    let audit = enclave.audit();
    let mut flows: Vec<_> = enclave.reachability().flows().cloned().collect();
    flows.retain(|f| f.key.port != 80);

    assert!(audit.verify_no_over_permission(&flows).is_err());
}
