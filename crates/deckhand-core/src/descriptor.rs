//! Application descriptors
//!
//! An [`ApplicationDescriptor`] is the caller's logical description of one
//! application's desired Kubernetes footprint. It is immutable for the
//! duration of a reconciliation.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::path::Path;

use crate::error::{CoreError, Result};

/// Caller-supplied specification of one application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDescriptor {
    /// Application name, also the name of every per-application resource
    pub name: String,

    /// Namespace the application lives in
    #[serde(alias = "ns")]
    pub namespace: String,

    /// Workspace the application belongs to
    pub workspace_id: String,

    /// Environment tag (e.g., "testing", "production")
    pub environment: String,

    /// Container image
    pub image: String,

    /// Container port exposed as the named port `http`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,

    /// Ingress path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Ingress host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// External protocol, "http" or "https"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    /// Name of a TLS secret for the ingress
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_secret: Option<String>,

    /// Desired replica count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Name of an image pull secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_secret: Option<String>,

    /// Partial Role or ClusterRole document; enables RBAC resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_spec: Option<RoleSpec>,

    /// Component label value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,

    /// Instance label value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,

    /// Version label value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Per-kind override documents
    #[serde(default)]
    pub overrides: Overrides,

    /// Partial Secret documents, each carrying its own name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<JsonValue>,
}

impl ApplicationDescriptor {
    /// Create a descriptor with the required fields set
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        workspace_id: impl Into<String>,
        environment: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            workspace_id: workspace_id.into(),
            environment: environment.into(),
            image: image.into(),
            port: None,
            path: None,
            host: None,
            protocol: None,
            tls_secret: None,
            replicas: None,
            image_pull_secret: None,
            role_spec: None,
            component: None,
            instance: None,
            version: None,
            overrides: Overrides::default(),
            secrets: Vec::new(),
        }
    }

    /// Load a descriptor from a YAML (or JSON) file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse a descriptor from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse a descriptor from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Check the descriptor before any cluster call is made
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::MissingField {
                field: "name".to_string(),
            });
        }
        if self.namespace.trim().is_empty() {
            return Err(CoreError::MissingField {
                field: "namespace".to_string(),
            });
        }
        if self.image.trim().is_empty() {
            return Err(CoreError::MissingField {
                field: "image".to_string(),
            });
        }
        if let Some(port) = self.port
            && !(1..=65535).contains(&port)
        {
            return Err(CoreError::invalid(format!(
                "port {} is outside 1-65535",
                port
            )));
        }
        if let Some(role) = &self.role_spec {
            role.kind()?;
        }
        for (index, secret) in self.secrets.iter().enumerate() {
            secret_name(secret).ok_or_else(|| {
                CoreError::invalid(format!("secret {} has no metadata.name", index))
            })?;
        }
        Ok(())
    }

    /// Name of the service account the pods run as
    ///
    /// Taken from the service account override when it names one, otherwise
    /// the application name.
    pub fn service_account_name(&self) -> String {
        self.overrides
            .service_account
            .as_ref()
            .and_then(|sa| sa.get("metadata"))
            .and_then(|m| m.get("name"))
            .and_then(JsonValue::as_str)
            .unwrap_or(&self.name)
            .to_string()
    }

    /// External URL of the application, when it is exposed by an ingress
    pub fn external_url(&self) -> Option<String> {
        if self.host.is_none() && self.path.is_none() {
            return None;
        }
        let protocol = self.protocol.as_deref().unwrap_or("http");
        let host = self.host.as_deref().unwrap_or("");
        let path = self.path.as_deref().unwrap_or("/");
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        Some(format!("{}://{}{}", protocol, host, path))
    }
}

/// Per-kind override documents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<JsonValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<JsonValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<JsonValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<JsonValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_binding: Option<JsonValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<JsonValue>,
}

/// Scope of the application's role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleKind {
    /// Namespaced `Role` bound with a `RoleBinding`
    Role,
    /// Cluster-scoped `ClusterRole` bound with a `ClusterRoleBinding`
    ClusterRole,
}

impl RoleKind {
    /// Parse from a document `kind` value
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "Role" => Some(Self::Role),
            "ClusterRole" => Some(Self::ClusterRole),
            _ => None,
        }
    }

    /// Kind of the role document
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Role => "Role",
            Self::ClusterRole => "ClusterRole",
        }
    }

    /// Kind of the matching binding document
    pub const fn binding_kind(&self) -> &'static str {
        match self {
            Self::Role => "RoleBinding",
            Self::ClusterRole => "ClusterRoleBinding",
        }
    }

    /// Whether the role lives in a namespace
    pub const fn is_namespaced(&self) -> bool {
        matches!(self, Self::Role)
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partial Role or ClusterRole document
///
/// Must carry a `kind`; usually carries `rules`. Merged over the default role
/// document, so it may set anything a Role document can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSpec(pub JsonValue);

impl RoleSpec {
    /// Build a role spec from a kind and a list of rules
    pub fn new(kind: RoleKind, rules: Vec<JsonValue>) -> Self {
        Self(serde_json::json!({
            "kind": kind.as_str(),
            "rules": rules,
        }))
    }

    /// The role kind, which must be present and valid
    pub fn kind(&self) -> Result<RoleKind> {
        let kind = self
            .0
            .get("kind")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| CoreError::invalid("role spec has no kind"))?;
        RoleKind::parse(kind).ok_or_else(|| {
            CoreError::invalid(format!(
                "role spec kind '{}' is neither Role nor ClusterRole",
                kind
            ))
        })
    }

    /// The raw document
    pub fn document(&self) -> &JsonValue {
        &self.0
    }
}

/// Name of a partial Secret document
pub fn secret_name(secret: &JsonValue) -> Option<&str> {
    secret
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(JsonValue::as_str)
        .filter(|name| !name.is_empty())
}
