//! Ingress template

use deckhand_core::{ApplicationDescriptor, LabelManager};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use serde_json::Value as JsonValue;

use super::{HTTP_PORT_NAME, metadata};
use crate::error::Result;

pub(super) fn build(
    app: &ApplicationDescriptor,
    path: &str,
    labels: &LabelManager,
) -> Result<JsonValue> {
    let backend = IngressBackend {
        service: Some(IngressServiceBackend {
            name: app.name.clone(),
            port: Some(ServiceBackendPort {
                name: Some(HTTP_PORT_NAME.to_string()),
                number: None,
            }),
        }),
        resource: None,
    };

    let rule = IngressRule {
        host: app.host.clone(),
        http: Some(HTTPIngressRuleValue {
            paths: vec![HTTPIngressPath {
                path: Some(path.to_string()),
                path_type: "ImplementationSpecific".to_string(),
                backend,
            }],
        }),
    };

    let tls = app.tls_secret.as_ref().map(|secret| {
        vec![IngressTLS {
            hosts: app.host.as_ref().map(|host| vec![host.clone()]),
            secret_name: Some(secret.clone()),
        }]
    });

    let ingress = Ingress {
        metadata: metadata(&app.name, Some(app.namespace.as_str()), labels.application_labels(app)),
        spec: Some(IngressSpec {
            rules: Some(vec![rule]),
            tls,
            ..Default::default()
        }),
        status: None,
    };

    Ok(serde_json::to_value(ingress)?)
}
