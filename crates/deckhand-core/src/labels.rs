//! Label computation for application resources
//!
//! Two label sets are derived from a descriptor:
//! - **match labels**: the minimal selector set (name + workspace id)
//! - **application labels**: match labels plus the recommended
//!   `app.kubernetes.io/*` metadata and the environment
//!
//! Every value goes through [`sanitize_label_value`], so any descriptor
//! produces labels the API server accepts.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::descriptor::ApplicationDescriptor;

/// Label key → sanitized value
pub type LabelSet = BTreeMap<String, String>;

/// Standard label for the name of the application
pub const K8S_NAME: &str = "app.kubernetes.io/name";

/// Standard label for the higher-level application this one is part of
pub const K8S_PART_OF: &str = "app.kubernetes.io/part-of";

/// Standard label for the tool managing the resource
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the component within the architecture
pub const K8S_COMPONENT: &str = "app.kubernetes.io/component";

/// Standard label for a unique instance name
pub const K8S_INSTANCE: &str = "app.kubernetes.io/instance";

/// Standard label for the application version
pub const K8S_VERSION: &str = "app.kubernetes.io/version";

/// Default vendor prefix for Deckhand-specific labels
pub const DEFAULT_VENDOR: &str = "deckhand.io";

/// Maximum length of a label value
pub const MAX_LABEL_VALUE_LEN: usize = 63;

static LEADING_INVALID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^A-Za-z0-9]+").expect("valid regex"));
static TRAILING_INVALID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9]+$").expect("valid regex"));
static INNER_INVALID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^-A-Za-z0-9_.]+").expect("valid regex"));

/// Make an arbitrary string a valid label value
///
/// Strips leading and trailing characters outside `[A-Za-z0-9]`, then replaces
/// every remaining run of characters outside `[-A-Za-z0-9_.]` with `_`.
/// Values longer than 63 characters are truncated and re-stripped.
pub fn sanitize_label_value(value: &str) -> String {
    let stripped = strip_ends(value);
    let replaced = INNER_INVALID.replace_all(&stripped, "_");

    if replaced.len() <= MAX_LABEL_VALUE_LEN {
        return replaced.into_owned();
    }

    // Only ASCII remains at this point, so byte truncation is safe
    strip_ends(&replaced[..MAX_LABEL_VALUE_LEN])
}

fn strip_ends(value: &str) -> String {
    let leading = LEADING_INVALID.replace(value, "");
    TRAILING_INVALID.replace(&leading, "").into_owned()
}

/// Configuration for label computation
///
/// The creator identity is passed in explicitly rather than read from the
/// process environment when labels are computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelConfig {
    /// Prefix for vendor labels (`<vendor>/workspaceId`, `<vendor>/environment`)
    #[serde(default = "default_vendor")]
    pub vendor: String,

    /// Identity recorded in `app.kubernetes.io/managed-by`
    #[serde(default = "default_creator")]
    pub creator: String,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            vendor: default_vendor(),
            creator: default_creator(),
        }
    }
}

fn default_vendor() -> String {
    DEFAULT_VENDOR.to_string()
}

fn default_creator() -> String {
    format!("{}_{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// Derives label sets from application descriptors
#[derive(Debug, Clone, Default)]
pub struct LabelManager {
    config: LabelConfig,
}

impl LabelManager {
    /// Create a label manager with the given configuration
    pub fn new(config: LabelConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &LabelConfig {
        &self.config
    }

    /// Key of the workspace id label
    pub fn workspace_key(&self) -> String {
        format!("{}/workspaceId", self.config.vendor)
    }

    /// Key of the environment label
    pub fn environment_key(&self) -> String {
        format!("{}/environment", self.config.vendor)
    }

    /// Labels used to select the application's own pods and children
    pub fn match_labels(&self, app: &ApplicationDescriptor) -> LabelSet {
        let mut labels = LabelSet::new();
        labels.insert(K8S_NAME.to_string(), sanitize_label_value(&app.name));
        labels.insert(
            self.workspace_key(),
            sanitize_label_value(&app.workspace_id),
        );
        labels
    }

    /// Full recommended label set for resource metadata
    pub fn application_labels(&self, app: &ApplicationDescriptor) -> LabelSet {
        let mut labels = self.match_labels(app);
        labels.insert(K8S_PART_OF.to_string(), sanitize_label_value(&app.name));
        labels.insert(
            K8S_MANAGED_BY.to_string(),
            sanitize_label_value(&self.config.creator),
        );
        labels.insert(
            self.environment_key(),
            sanitize_label_value(&app.environment),
        );

        let optional = [
            (K8S_COMPONENT, app.component.as_deref()),
            (K8S_INSTANCE, app.instance.as_deref()),
            (K8S_VERSION, app.version.as_deref()),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                labels.insert(key.to_string(), sanitize_label_value(value));
            }
        }

        labels
    }
}

/// Render a label set as an equality-based label selector
pub fn selector(labels: &LabelSet) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}
