// Copyright (c) 2025 - Cowboy AI, Inc.
//! Construction-time resource annotations
//!
//! Compliance-checker acknowledgements (rule id + reason) travel with the
//! resource declaration that needs them. They are rendered alongside the
//! node and never change provisioning behavior.

use serde::{Deserialize, Serialize};

/// Acknowledgement of a compliance rule that a resource knowingly deviates from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Rule identifier (e.g. `AwsSolutions-IAM5`)
    pub rule_id: String,

    /// Why the deviation is acceptable
    pub reason: String,

    /// Narrow the acknowledgement to specific findings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applies_to: Vec<String>,
}

impl Annotation {
    /// Create an annotation covering every finding of a rule
    pub fn new(rule_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            reason: reason.into(),
            applies_to: Vec::new(),
        }
    }

    /// Restrict the annotation to one finding
    pub fn applies_to(mut self, finding: impl Into<String>) -> Self {
        self.applies_to.push(finding.into());
        self
    }
}
