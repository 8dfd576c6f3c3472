//! Cluster access for reconciliation
//!
//! The reconciler never talks to the API server directly. It asks a
//! [`Cluster`] for the adapter of one [`ResourceKind`] and calls the verbs of
//! [`ResourceApi`] on it:
//! - **KubeCluster**: real API server access through `kube`
//! - **MockCluster**: in-memory cluster for tests

mod client;
mod mock;

pub use client::{KubeCluster, KubeResourceApi};
pub use mock::{FailureSpec, MockCluster, OperationCounts, Verb};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;

/// Resource kinds managed for an application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Namespace,
    ServiceAccount,
    Role,
    ClusterRole,
    RoleBinding,
    ClusterRoleBinding,
    Service,
    Secret,
    Deployment,
    Ingress,
}

impl ResourceKind {
    /// All kinds, in creation order
    pub const ALL: [ResourceKind; 10] = [
        ResourceKind::Namespace,
        ResourceKind::ServiceAccount,
        ResourceKind::Role,
        ResourceKind::ClusterRole,
        ResourceKind::RoleBinding,
        ResourceKind::ClusterRoleBinding,
        ResourceKind::Service,
        ResourceKind::Secret,
        ResourceKind::Deployment,
        ResourceKind::Ingress,
    ];

    /// The `apiVersion` of documents of this kind
    pub const fn api_version(&self) -> &'static str {
        match self {
            Self::Namespace | Self::ServiceAccount | Self::Service | Self::Secret => "v1",
            Self::Role | Self::ClusterRole | Self::RoleBinding | Self::ClusterRoleBinding => {
                "rbac.authorization.k8s.io/v1"
            }
            Self::Deployment => "apps/v1",
            Self::Ingress => "networking.k8s.io/v1",
        }
    }

    /// The `kind` of documents of this kind
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Namespace => "Namespace",
            Self::ServiceAccount => "ServiceAccount",
            Self::Role => "Role",
            Self::ClusterRole => "ClusterRole",
            Self::RoleBinding => "RoleBinding",
            Self::ClusterRoleBinding => "ClusterRoleBinding",
            Self::Service => "Service",
            Self::Secret => "Secret",
            Self::Deployment => "Deployment",
            Self::Ingress => "Ingress",
        }
    }

    /// Whether resources of this kind live in a namespace
    pub const fn is_namespaced(&self) -> bool {
        !matches!(
            self,
            Self::Namespace | Self::ClusterRole | Self::ClusterRoleBinding
        )
    }

    /// Parse from a document `kind` value
    pub fn parse(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == kind)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cascading policy for deletes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Delete the owner now, dependents asynchronously
    Background,
    /// Delete dependents first
    Foreground,
    /// Leave dependents in place
    Orphan,
}

/// Options for a delete call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Cascading policy; `None` uses the server default
    pub propagation: Option<Propagation>,
}

impl DeleteOptions {
    /// Background cascade, for controller-owned resources
    pub fn background() -> Self {
        Self {
            propagation: Some(Propagation::Background),
        }
    }
}

/// Verbs available on one resource kind
///
/// Cluster-scoped kinds ignore the `namespace` argument. Every call may fail
/// with a not-found error (expected) or any other error.
#[async_trait]
pub trait ResourceApi: Send + Sync {
    /// The kind this adapter serves
    fn kind(&self) -> ResourceKind;

    /// Read a resource by name
    async fn read(&self, name: &str, namespace: Option<&str>) -> Result<JsonValue>;

    /// Create a resource, returning the stored document
    async fn create(&self, namespace: Option<&str>, document: &JsonValue) -> Result<JsonValue>;

    /// Patch an existing resource with a full document or a fragment
    async fn patch(
        &self,
        name: &str,
        namespace: Option<&str>,
        patch: &JsonValue,
    ) -> Result<JsonValue>;

    /// Delete a resource by name
    async fn delete(&self, name: &str, namespace: Option<&str>, options: DeleteOptions)
    -> Result<()>;

    /// List resources matching an equality label selector
    async fn list(&self, namespace: Option<&str>, label_selector: &str) -> Result<Vec<JsonValue>>;
}

/// Source of per-kind adapters
pub trait Cluster: Send + Sync {
    /// The adapter for one resource kind
    fn api(&self, kind: ResourceKind) -> Arc<dyn ResourceApi>;
}

/// Human-readable identifier of one resource, used in logs and errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    /// Resource kind
    pub kind: ResourceKind,
    /// Resource name
    pub name: String,
    /// Resource namespace (None for cluster-scoped)
    pub namespace: Option<String>,
}

impl ResourceRef {
    /// Reference a resource, dropping the namespace for cluster-scoped kinds
    pub fn new(kind: ResourceKind, name: impl Into<String>, namespace: Option<&str>) -> Self {
        Self {
            kind,
            name: name.into(),
            namespace: namespace
                .filter(|_| kind.is_namespaced())
                .map(str::to_string),
        }
    }

    /// Namespace as a borrowed option
    pub fn ns(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", ns, self.kind, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Name from a document's metadata
pub fn document_name(document: &JsonValue) -> Option<&str> {
    document
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(JsonValue::as_str)
}
