//! Deckhand Kube - Kubernetes reconciliation for Deckhand
//!
//! This crate provides:
//! - **Cluster access**: one adapter per resource kind, backed by `kube` or held in memory
//! - **Templates**: desired-state documents with index-aligned override merging
//! - **Reconciler**: read, then create or patch; label-scoped delete
//! - **Retry**: exponential backoff around cluster calls
//! - **Rollout**: Deployment rollout verification

pub mod cluster;
pub mod config;
pub mod error;
pub mod reconciler;
pub mod resources;
pub mod retry;
pub mod rollout;
pub mod templates;

pub use cluster::{
    Cluster, DeleteOptions, FailureSpec, KubeCluster, KubeResourceApi, MockCluster,
    OperationCounts, Propagation, ResourceApi, ResourceKind, ResourceRef, Verb,
};
pub use config::ReconcileConfig;
pub use error::{ErrorKind, KubeError, Result};
pub use reconciler::Reconciler;
pub use resources::{AppliedResources, ApplyAction, ApplyResult, OperationSummary};
pub use retry::{RetryPolicy, retry};
pub use rollout::{RolloutConfig, RolloutStatus, RolloutVerifier};
pub use templates::{IdentityPolicy, TemplateBuilder};
