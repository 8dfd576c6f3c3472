//! Service account, role and role binding templates

use deckhand_core::{ApplicationDescriptor, LabelManager, RoleKind};
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{
    ClusterRole, ClusterRoleBinding, Role, RoleBinding, RoleRef, Subject,
};
use serde_json::Value as JsonValue;

use super::metadata;
use crate::error::Result;

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

pub(super) fn service_account(
    app: &ApplicationDescriptor,
    labels: &LabelManager,
) -> Result<JsonValue> {
    let account = ServiceAccount {
        metadata: metadata(
            &app.service_account_name(),
            Some(app.namespace.as_str()),
            labels.application_labels(app),
        ),
        ..Default::default()
    };
    Ok(serde_json::to_value(account)?)
}

/// Role skeleton; rules come from the role spec merged on top
pub(super) fn role(
    app: &ApplicationDescriptor,
    kind: RoleKind,
    labels: &LabelManager,
) -> Result<JsonValue> {
    let app_labels = labels.application_labels(app);
    let value = match kind {
        RoleKind::Role => serde_json::to_value(Role {
            metadata: metadata(&app.name, Some(app.namespace.as_str()), app_labels),
            rules: None,
        })?,
        RoleKind::ClusterRole => serde_json::to_value(ClusterRole {
            metadata: metadata(&app.name, None, app_labels),
            ..Default::default()
        })?,
    };
    Ok(value)
}

pub(super) fn role_binding(
    app: &ApplicationDescriptor,
    kind: RoleKind,
    labels: &LabelManager,
) -> Result<JsonValue> {
    let app_labels = labels.application_labels(app);
    let role_ref = RoleRef {
        api_group: RBAC_API_GROUP.to_string(),
        kind: kind.as_str().to_string(),
        name: app.name.clone(),
    };
    let subjects = Some(vec![Subject {
        kind: "ServiceAccount".to_string(),
        name: app.service_account_name(),
        namespace: Some(app.namespace.clone()),
        api_group: None,
    }]);

    let value = match kind {
        RoleKind::Role => serde_json::to_value(RoleBinding {
            metadata: metadata(&app.name, Some(app.namespace.as_str()), app_labels),
            role_ref,
            subjects,
        })?,
        RoleKind::ClusterRole => serde_json::to_value(ClusterRoleBinding {
            metadata: metadata(&app.name, None, app_labels),
            role_ref,
            subjects,
        })?,
    };
    Ok(value)
}
