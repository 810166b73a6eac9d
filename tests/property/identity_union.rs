// Copyright (c) 2025 - Cowboy AI, Inc.
//! A shared identity grants exactly the union of its consumers' needs

use cim_search_enclave::domain::identity::FUNCTION_SERVICE;
use cim_search_enclave::domain::{IdentityResolver, PolicyStatement, Principal, ResourcePattern};
use cim_search_enclave::graph::ResourceId;
use proptest::prelude::*;

const ACTIONS: &[&str] = &[
    "es:ESHttpGet",
    "es:ESHttpHead",
    "es:ESHttpPost",
    "es:ESHttpPut",
    "es:ESHttpDelete",
    "logs:PutLogEvents",
];

fn id(s: &str) -> ResourceId {
    ResourceId::new(s).unwrap()
}

fn resource() -> ResourcePattern {
    ResourcePattern::Literal("arn:aws:es:us-east-2:123456789012:domain/search".to_string())
}

/// Per consumer, a non-empty subset of actions
fn needs() -> impl Strategy<Value = Vec<Vec<usize>>> {
    prop::collection::vec(
        prop::collection::btree_set(0..ACTIONS.len(), 1..ACTIONS.len())
            .prop_map(|set| set.into_iter().collect()),
        1..4,
    )
}

fn resolver(needs: &[Vec<usize>]) -> (IdentityResolver, ResourceId) {
    let role = id("SharedRole");
    let mut resolver = IdentityResolver::new();
    resolver.identity(role.clone(), "shared").unwrap();
    resolver.trust(&role, Principal::service(FUNCTION_SERVICE)).unwrap();
    for (index, actions) in needs.iter().enumerate() {
        let consumer = id(&format!("Consumer{}", index));
        resolver.bind(&role, consumer.clone()).unwrap();
        let statement = PolicyStatement::allow(actions.iter().map(|a| ACTIONS[*a]), [resource()]);
        resolver.require(&role, &consumer, statement).unwrap();
    }
    (resolver, role)
}

proptest! {
    #[test]
    fn prop_statements_are_the_union_of_needs(needs in needs()) {
        let (resolver, role) = resolver(&needs);
        let statements = resolver.statements(&role).unwrap();

        prop_assert_eq!(statements.len(), 1);
        let granted = &statements[0].actions;
        for (index, action) in ACTIONS.iter().enumerate() {
            let needed = needs.iter().any(|n| n.contains(&index));
            prop_assert_eq!(granted.contains(*action), needed);
        }
        prop_assert!(resolver.audit_statements(&role, &statements).is_ok());
    }

    #[test]
    fn prop_unneeded_action_fails_audit(needs in needs()) {
        let (resolver, role) = resolver(&needs);
        let unneeded = (0..ACTIONS.len()).find(|i| !needs.iter().any(|n| n.contains(i)));
        if let Some(index) = unneeded {
            let extra = PolicyStatement::allow([ACTIONS[index]], [resource()]);
            prop_assert!(resolver.audit_statements(&role, &[extra]).is_err());
        }
    }
}
