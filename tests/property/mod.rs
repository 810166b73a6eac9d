// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests Module
//!
//! Properties of the reachability renderer and the identity resolver that
//! must hold for every declared policy, not only the default enclave.

mod identity_union;
mod rule_pairing;
