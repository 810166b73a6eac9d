// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provisioning Events
//!
//! Immutable facts emitted while an enclave is applied, destroyed or its
//! automation runner is triggered.
//!
//! # Event Principles
//!
//! 1. **Events are immutable**: Once created, events never change
//! 2. **Events are past tense**: Named for what happened (Created, not Create)
//! 3. **Events include metadata**: correlation_id, causation_id, timestamp
//! 4. **Events are versioned**: event_version field for schema evolution
//!
//! # Correlation and Causation
//!
//! Every event of one run shares the run's `correlation_id`. Each event's
//! `causation_id` is the event that preceded it in the run:
//!
//! ```text
//! RunStarted        correlation: run-1  causation: None   id: evt-1
//!   ↓
//! ResourceCreated   correlation: run-1  causation: evt-1  id: evt-2
//!   ↓
//! RunCompleted      correlation: run-1  causation: evt-2  id: evt-3
//! ```

pub mod provisioning;
pub mod sink;

pub use provisioning::{EventChain, ProvisioningEvent, ProvisioningEventKind, RunOperation};
pub use sink::{EventSink, InMemoryEventSink};
