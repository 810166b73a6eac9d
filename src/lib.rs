// Copyright (c) 2025 - Cowboy AI, Inc.
//! Search Enclave
//!
//! Declares, validates and provisions a private search environment: a
//! network fabric spanning several zones, a search cluster reachable only
//! from inside it, two compute units that talk to the cluster, a
//! configuration store, and an automation runner that applies index
//! configuration from that store.
//!
//! # Structure
//!
//! - [`domain`]: what each part of the enclave is and which resources it
//!   declares
//! - [`graph`]: the resource dependency graph and reference resolution
//! - [`topology`]: composition of the whole enclave from [`EnvironmentConfig`]
//! - [`engine`]: level-by-level provisioning against a [`CloudProvider`]
//! - [`runner`]: triggering the automation runner
//! - [`events`]: provisioning facts published to an [`EventSink`]
//!
//! # Example
//!
//! ```rust,no_run
//! use cim_search_enclave::{
//!     domain::ConfigStoreSpec, EnvironmentConfig, InMemoryEventSink, InMemoryProvider,
//!     Provisioner, SearchEnclave,
//! };
//!
//! # async fn run() -> cim_search_enclave::EnclaveResult<()> {
//! let config = EnvironmentConfig::default();
//! let store = ConfigStoreSpec::from_dir(SearchEnclave::config_store_id()?, &config.config_seed_dir)?;
//! let enclave = SearchEnclave::compose(&config, store)?;
//!
//! let provisioner = Provisioner::new(
//!     InMemoryProvider::new(&config.region, &config.account),
//!     InMemoryEventSink::new(),
//! );
//! let changes = provisioner.apply(&enclave).await?;
//! println!("{} resources changed", changes.changed().count());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod events;
pub mod graph;
#[cfg(feature = "nats")]
pub mod nats;
pub mod provider;
pub mod runner;
pub mod state_machine;
pub mod subjects;
pub mod topology;

// Re-export commonly used types
pub use config::EnvironmentConfig;
pub use engine::{ChangeAction, ChangeSet, Provisioner};
pub use errors::{EnclaveError, EnclaveResult, ProviderError};
pub use events::{EventSink, InMemoryEventSink, ProvisioningEvent};
pub use provider::{CloudProvider, InMemoryProvider};
pub use runner::AutomationRunner;
pub use topology::SearchEnclave;

#[cfg(feature = "nats")]
pub use nats::{NatsConfig, NatsEventSink};
