//! Service template

use deckhand_core::{ApplicationDescriptor, LabelManager};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde_json::Value as JsonValue;

use super::{HTTP_PORT_NAME, metadata};
use crate::error::Result;

pub(super) fn build(
    app: &ApplicationDescriptor,
    port: i32,
    labels: &LabelManager,
) -> Result<JsonValue> {
    let service = Service {
        metadata: metadata(&app.name, Some(app.namespace.as_str()), labels.application_labels(app)),
        spec: Some(ServiceSpec {
            type_: Some("NodePort".to_string()),
            session_affinity: Some("None".to_string()),
            selector: Some(labels.match_labels(app)),
            ports: Some(vec![ServicePort {
                name: Some(HTTP_PORT_NAME.to_string()),
                port,
                protocol: Some("TCP".to_string()),
                target_port: Some(IntOrString::String(HTTP_PORT_NAME.to_string())),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    };

    Ok(serde_json::to_value(service)?)
}
