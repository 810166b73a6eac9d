// Copyright (c) 2025 - Cowboy AI, Inc.
//! Rendering any set of flows yields a paired, minimal rule set

use cim_search_enclave::domain::{EndpointGroup, Protocol, ReachabilityPolicy};
use cim_search_enclave::graph::ResourceId;
use proptest::prelude::*;

const GROUPS: usize = 4;

fn group_id(index: usize) -> ResourceId {
    ResourceId::new(format!("Group{}", index)).unwrap()
}

/// (source, destination, port) triples between distinct groups
fn flows() -> impl Strategy<Value = Vec<(usize, usize, u16)>> {
    prop::collection::vec((0..GROUPS, 0..GROUPS, 1u16..1024), 0..12)
        .prop_map(|flows| flows.into_iter().filter(|(s, d, _)| s != d).collect())
}

fn policy(open: &[bool], flows: &[(usize, usize, u16)]) -> ReachabilityPolicy {
    let mut policy = ReachabilityPolicy::new();
    for (index, open) in open.iter().enumerate() {
        let group = EndpointGroup::new(group_id(index), format!("group {}", index));
        let group = if *open { group.allow_all_outbound() } else { group };
        policy.add_group(group).unwrap();
    }
    for (source, destination, port) in flows {
        policy
            .permit(
                &group_id(*source),
                &group_id(*destination),
                Protocol::Tcp,
                *port,
                "generated",
            )
            .unwrap();
    }
    policy
}

proptest! {
    #[test]
    fn prop_every_flow_is_paired(
        open in prop::collection::vec(any::<bool>(), GROUPS),
        flows in flows(),
    ) {
        let policy = policy(&open, &flows);
        let audit = policy.audit();

        prop_assert!(audit.verify_pairing(policy.flows()).is_ok());
        prop_assert!(audit.verify_no_over_permission(policy.flows()).is_ok());
        for index in 0..GROUPS {
            prop_assert!(audit.verify_no_public_ingress(&group_id(index)).is_ok());
        }
    }

    #[test]
    fn prop_closed_sources_reach_only_declared_ports(
        flows in flows(),
        candidate in (0..GROUPS, 0..GROUPS, 1u16..1024),
    ) {
        let policy = policy(&[false; GROUPS], &flows);
        let audit = policy.audit();
        let (source, destination, port) = candidate;

        let declared = flows.contains(&(source, destination, port));
        prop_assert_eq!(
            audit.can_reach(&group_id(source), &group_id(destination), Protocol::Tcp, port),
            declared
        );
    }

    #[test]
    fn prop_redeclaring_a_flow_keeps_one_rule_pair(
        flows in flows(),
    ) {
        let once = policy(&[false; GROUPS], &flows);
        let doubled: Vec<_> = flows.iter().chain(flows.iter()).cloned().collect();
        let twice = policy(&[false; GROUPS], &doubled);

        prop_assert_eq!(once.render(), twice.render());
    }
}
