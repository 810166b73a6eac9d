// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for cim-search-enclave
//!
//! Every fixture composes from the default environment with a seeded
//! in-memory configuration store, so tests never touch the filesystem.

#![allow(dead_code)]

use cim_search_enclave::domain::{ConfigObject, ConfigStoreSpec};
use cim_search_enclave::graph::ResourceId;
use cim_search_enclave::{
    EnvironmentConfig, InMemoryEventSink, InMemoryProvider, Provisioner, SearchEnclave,
};

pub const INDEX_CONFIG: &str = r#"resource "opensearch_index" "movies" {
  name = "movies"
}
"#;

pub fn id(s: &str) -> ResourceId {
    ResourceId::new(s).expect("Invalid resource id in test fixture")
}

pub fn config() -> EnvironmentConfig {
    EnvironmentConfig::default()
}

/// Configuration store holding the object the runner fetches
pub fn seeded_store() -> ConfigStoreSpec {
    let store_id = SearchEnclave::config_store_id().expect("Invalid store id");
    ConfigStoreSpec::new(store_id).with_object(ConfigObject::new("opensearch_index.tf", INDEX_CONFIG))
}

pub fn enclave() -> SearchEnclave {
    SearchEnclave::compose(&config(), seeded_store()).expect("Default enclave must compose")
}

pub fn provisioner() -> Provisioner<InMemoryProvider, InMemoryEventSink> {
    let config = config();
    Provisioner::new(
        InMemoryProvider::new(&config.region, &config.account),
        InMemoryEventSink::new(),
    )
}
