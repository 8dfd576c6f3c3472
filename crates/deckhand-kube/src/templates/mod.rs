//! Desired-state documents for an application
//!
//! Each builder starts from a typed `k8s-openapi` default carrying the labels
//! from [`LabelManager`], converts it to JSON and deep merges the caller's
//! override on top. Arrays merge index-aligned, so an override can tweak the
//! first container without restating the rest of it.
//!
//! Whether an override may change `apiVersion`/`kind` depends on the kind; see
//! [`IdentityPolicy`].

mod deployment;
mod ingress;
mod namespace;
mod rbac;
mod secret;
mod service;

use deckhand_core::{ApplicationDescriptor, LabelManager, LabelSet, RoleKind, deep_merge};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::{Value as JsonValue, json};

use crate::cluster::ResourceKind;
use crate::error::Result;

/// Name of the container port, service port and probe target
pub const HTTP_PORT_NAME: &str = "http";

/// Whether an override may replace a document's `apiVersion` and `kind`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityPolicy {
    /// The builder's values are restored after merging
    Pinned,
    /// An override value for either field wins
    OverrideWins,
}

impl IdentityPolicy {
    /// Policy for a resource kind
    pub const fn for_kind(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Deployment
            | ResourceKind::Role
            | ResourceKind::ClusterRole
            | ResourceKind::RoleBinding
            | ResourceKind::ClusterRoleBinding => Self::OverrideWins,
            ResourceKind::Namespace
            | ResourceKind::Service
            | ResourceKind::Ingress
            | ResourceKind::ServiceAccount
            | ResourceKind::Secret => Self::Pinned,
        }
    }
}

/// Kind of the application's role
pub fn role_kind(role: RoleKind) -> ResourceKind {
    match role {
        RoleKind::Role => ResourceKind::Role,
        RoleKind::ClusterRole => ResourceKind::ClusterRole,
    }
}

/// Kind of the binding for the application's role
pub fn binding_kind(role: RoleKind) -> ResourceKind {
    match role {
        RoleKind::Role => ResourceKind::RoleBinding,
        RoleKind::ClusterRole => ResourceKind::ClusterRoleBinding,
    }
}

/// Builds desired-state documents from a descriptor
#[derive(Debug, Clone, Default)]
pub struct TemplateBuilder {
    labels: LabelManager,
}

impl TemplateBuilder {
    /// Create a builder that labels documents with `labels`
    pub fn new(labels: LabelManager) -> Self {
        Self { labels }
    }

    /// Get the label manager
    pub fn labels(&self) -> &LabelManager {
        &self.labels
    }

    /// Namespace document; never carries overrides
    pub fn namespace(&self, app: &ApplicationDescriptor) -> Result<JsonValue> {
        let default = namespace::build(app, &self.labels)?;
        Ok(finish(ResourceKind::Namespace, default, &[]))
    }

    /// Service account the pods run as
    pub fn service_account(&self, app: &ApplicationDescriptor) -> Result<JsonValue> {
        let default = rbac::service_account(app, &self.labels)?;
        Ok(finish(
            ResourceKind::ServiceAccount,
            default,
            &[app.overrides.service_account.as_ref()],
        ))
    }

    /// Role or ClusterRole from the descriptor's role spec
    ///
    /// The role spec is merged first, then the role override.
    pub fn role(&self, app: &ApplicationDescriptor) -> Result<Option<JsonValue>> {
        let Some(spec) = &app.role_spec else {
            return Ok(None);
        };
        let kind = spec.kind()?;
        let default = rbac::role(app, kind, &self.labels)?;
        Ok(Some(finish(
            role_kind(kind),
            default,
            &[Some(spec.document()), app.overrides.role.as_ref()],
        )))
    }

    /// RoleBinding or ClusterRoleBinding granting the role to the service account
    pub fn role_binding(&self, app: &ApplicationDescriptor) -> Result<Option<JsonValue>> {
        let Some(spec) = &app.role_spec else {
            return Ok(None);
        };
        let kind = spec.kind()?;
        let default = rbac::role_binding(app, kind, &self.labels)?;
        Ok(Some(finish(
            binding_kind(kind),
            default,
            &[app.overrides.role_binding.as_ref()],
        )))
    }

    /// Service exposing the `http` port; `None` without a port
    pub fn service(&self, app: &ApplicationDescriptor) -> Result<Option<JsonValue>> {
        let Some(port) = app.port else {
            return Ok(None);
        };
        let default = service::build(app, port, &self.labels)?;
        Ok(Some(finish(
            ResourceKind::Service,
            default,
            &[app.overrides.service.as_ref()],
        )))
    }

    /// Ingress routing the path to the service; `None` without a path
    pub fn ingress(&self, app: &ApplicationDescriptor) -> Result<Option<JsonValue>> {
        let Some(path) = app.path.as_deref() else {
            return Ok(None);
        };
        let default = ingress::build(app, path, &self.labels)?;
        Ok(Some(finish(
            ResourceKind::Ingress,
            default,
            &[app.overrides.ingress.as_ref()],
        )))
    }

    /// Deployment running the application image
    pub fn deployment(&self, app: &ApplicationDescriptor) -> Result<JsonValue> {
        let default = deployment::build(app, &self.labels)?;
        Ok(finish(
            ResourceKind::Deployment,
            default,
            &[app.overrides.deployment.as_ref()],
        ))
    }

    /// Secret from one of the descriptor's secret payloads
    ///
    /// `stringData` is promoted into base64 `data`.
    pub fn secret(&self, app: &ApplicationDescriptor, payload: &JsonValue) -> Result<JsonValue> {
        let default = secret::build(app, payload, &self.labels)?;
        let mut document = finish(ResourceKind::Secret, default, &[Some(payload)]);
        deckhand_core::secrets::promote_string_data(&mut document);
        Ok(document)
    }
}

/// Merge overlays in order and apply the kind's identity policy
fn finish(
    kind: ResourceKind,
    mut document: JsonValue,
    overlays: &[Option<&JsonValue>],
) -> JsonValue {
    let api_version = document.get("apiVersion").cloned();
    let doc_kind = document.get("kind").cloned();

    for overlay in overlays.iter().flatten() {
        deep_merge(&mut document, overlay);
    }

    if IdentityPolicy::for_kind(kind) == IdentityPolicy::Pinned
        && let JsonValue::Object(map) = &mut document
    {
        map.insert(
            "apiVersion".to_string(),
            api_version.unwrap_or_else(|| json!(kind.api_version())),
        );
        map.insert(
            "kind".to_string(),
            doc_kind.unwrap_or_else(|| json!(kind.as_str())),
        );
    }
    document
}

/// Metadata shared by every per-application document
fn metadata(name: &str, namespace: Option<&str>, labels: LabelSet) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        labels: Some(labels),
        ..Default::default()
    }
}
