//! Outcomes of multi-resource operations
//!
//! `apply_application` stops at the first failure and reports what it built in
//! [`AppliedResources`]. `delete_application` attempts every step and collects
//! the outcome of each in an [`OperationSummary`].

use serde_json::Value as JsonValue;
use std::fmt;

use crate::cluster::ResourceRef;
use crate::error::{KubeError, Result};

/// What an upsert did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyAction {
    /// The resource was absent and has been created
    Created,
    /// The resource existed and has been patched
    Patched,
    /// The resource existed and is left as is (shared namespaces)
    Kept,
}

impl fmt::Display for ApplyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Patched => "patched",
            Self::Kept => "kept",
        })
    }
}

/// Result of upserting a single resource
#[derive(Debug, Clone)]
pub struct ApplyResult {
    /// The resource
    pub resource: ResourceRef,
    /// Whether it was created or patched
    pub action: ApplyAction,
    /// Document returned by the cluster
    pub document: JsonValue,
}

impl ApplyResult {
    /// Whether the resource was created
    pub fn created(&self) -> bool {
        self.action == ApplyAction::Created
    }
}

/// Documents produced by one `apply_application` run
#[derive(Debug, Clone, Default)]
pub struct AppliedResources {
    pub namespace: Option<JsonValue>,
    pub service_account: Option<JsonValue>,
    pub role: Option<JsonValue>,
    pub role_binding: Option<JsonValue>,
    pub service: Option<JsonValue>,
    pub secrets: Vec<JsonValue>,
    pub deployment: Option<JsonValue>,
    pub ingress: Option<JsonValue>,
    /// Every upsert, in the order it ran
    pub results: Vec<(ResourceRef, ApplyAction)>,
}

impl AppliedResources {
    pub(crate) fn record(&mut self, result: &ApplyResult) {
        self.results.push((result.resource.clone(), result.action));
    }

    /// Resources that were created by this run
    pub fn created(&self) -> Vec<&ResourceRef> {
        self.results
            .iter()
            .filter(|(_, action)| *action == ApplyAction::Created)
            .map(|(resource, _)| resource)
            .collect()
    }

    /// Format as human-readable summary
    pub fn summary(&self) -> String {
        let created = self.created().len();
        let patched = self
            .results
            .iter()
            .filter(|(_, action)| *action == ApplyAction::Patched)
            .count();
        format!("{} created, {} patched", created, patched)
    }
}

/// Summary of a delete run
#[derive(Debug, Clone, Default)]
pub struct OperationSummary {
    /// Successfully deleted resources
    pub succeeded: Vec<String>,
    /// Failed resources with errors
    pub failed: Vec<(String, String)>,
    /// Skipped resources with the reason
    pub skipped: Vec<(String, String)>,
}

impl OperationSummary {
    /// Check if all operations succeeded
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Get total count
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.skipped.len()
    }

    /// Record the outcome of a delete step
    ///
    /// `Ok(true)` is a deletion, `Ok(false)` means nothing was there.
    pub fn record(&mut self, name: impl Into<String>, outcome: Result<bool>) {
        let name = name.into();
        match outcome {
            Ok(true) => self.succeeded.push(name),
            Ok(false) => self.skipped.push((name, "not found".to_string())),
            Err(e) => self.failed.push((name, e.to_string())),
        }
    }

    /// Turn failures into a [`KubeError::PartialFailure`]
    pub fn into_result(self, operation: impl Into<String>) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        Err(KubeError::PartialFailure {
            operation: operation.into(),
            failures: self
                .failed
                .iter()
                .map(|(name, error)| format!("{}: {}", name, error))
                .collect(),
        })
    }

    /// Format as human-readable summary
    pub fn summary(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        if !self.succeeded.is_empty() {
            parts.push(format!("{} deleted", self.succeeded.len()));
        }
        if !self.failed.is_empty() {
            parts.push(format!("{} failed", self.failed.len()));
        }
        if !self.skipped.is_empty() {
            parts.push(format!("{} skipped", self.skipped.len()));
        }
        if parts.is_empty() {
            "No resources processed".to_string()
        } else {
            parts.join(", ")
        }
    }
}
