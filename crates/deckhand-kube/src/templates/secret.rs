//! Secret template

use deckhand_core::{ApplicationDescriptor, CoreError, LabelManager, secret_name};
use k8s_openapi::api::core::v1::Secret;
use serde_json::Value as JsonValue;

use super::metadata;
use crate::error::Result;

/// Secret skeleton; the payload is merged on top
///
/// The skeleton carries the application labels, so the match-label selector
/// finds every secret of the application.
pub(super) fn build(
    app: &ApplicationDescriptor,
    payload: &JsonValue,
    labels: &LabelManager,
) -> Result<JsonValue> {
    let name = secret_name(payload).ok_or_else(|| CoreError::MissingField {
        field: "secret metadata.name".to_string(),
    })?;

    let secret = Secret {
        metadata: metadata(name, Some(app.namespace.as_str()), labels.application_labels(app)),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    };
    Ok(serde_json::to_value(secret)?)
}
