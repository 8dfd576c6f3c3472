//! Namespace template
//!
//! A namespace may be shared by several applications, so it only carries the
//! labels that do not identify a single application.

use deckhand_core::labels::K8S_MANAGED_BY;
use deckhand_core::{ApplicationDescriptor, LabelManager};
use k8s_openapi::api::core::v1::Namespace;
use serde_json::Value as JsonValue;

use super::metadata;
use crate::error::Result;

pub(super) fn build(app: &ApplicationDescriptor, labels: &LabelManager) -> Result<JsonValue> {
    let shared_keys = [
        K8S_MANAGED_BY.to_string(),
        labels.workspace_key(),
        labels.environment_key(),
    ];
    let mut namespace_labels = labels.application_labels(app);
    namespace_labels.retain(|key, _| shared_keys.contains(key));

    let namespace = Namespace {
        metadata: metadata(&app.namespace, None, namespace_labels),
        ..Default::default()
    };
    Ok(serde_json::to_value(namespace)?)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{app, builder};
    use serde_json::json;

    #[test]
    fn test_namespace_document() {
        let doc = builder().namespace(&app()).unwrap();
        assert_eq!(
            doc,
            json!({
                "apiVersion": "v1",
                "kind": "Namespace",
                "metadata": {
                    "name": "prod",
                    "labels": {
                        "app.kubernetes.io/managed-by": "deckhand_test",
                        "deckhand.io/environment": "testing",
                        "deckhand.io/workspaceId": "W1"
                    }
                }
            })
        );
    }
}
