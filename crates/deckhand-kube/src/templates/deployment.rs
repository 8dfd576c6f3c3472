//! Deployment template

use deckhand_core::{ApplicationDescriptor, LabelManager};
use k8s_openapi::api::apps::v1::{
    Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment,
};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, HTTPGetAction, LocalObjectReference, PodSpec,
    PodTemplateSpec, Probe, ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use super::{HTTP_PORT_NAME, metadata};
use crate::error::Result;

/// Old ReplicaSets kept for rollback
const REVISION_HISTORY_LIMIT: i32 = 3;

/// Env var carrying the workspace id
pub const WORKSPACE_ID_ENV: &str = "DECKHAND_WORKSPACE_ID";

/// Env var carrying the environment tag
pub const ENVIRONMENT_ENV: &str = "DECKHAND_ENVIRONMENT";

pub(super) fn build(app: &ApplicationDescriptor, labels: &LabelManager) -> Result<JsonValue> {
    let match_labels = labels.match_labels(app);
    let app_labels = labels.application_labels(app);

    let pod_spec = PodSpec {
        containers: vec![container(app)],
        dns_policy: Some("ClusterFirst".to_string()),
        restart_policy: Some("Always".to_string()),
        image_pull_secrets: app.image_pull_secret.as_ref().map(|name| {
            vec![LocalObjectReference {
                name: name.clone(),
            }]
        }),
        service_account_name: app
            .role_spec
            .as_ref()
            .map(|_| app.service_account_name()),
        ..Default::default()
    };

    let deployment = Deployment {
        metadata: metadata(&app.name, Some(app.namespace.as_str()), app_labels.clone()),
        spec: Some(DeploymentSpec {
            replicas: Some(app.replicas.unwrap_or(1)),
            revision_history_limit: Some(REVISION_HISTORY_LIMIT),
            selector: LabelSelector {
                match_labels: Some(match_labels),
                ..Default::default()
            },
            strategy: Some(DeploymentStrategy {
                type_: Some("RollingUpdate".to_string()),
                rolling_update: Some(RollingUpdateDeployment {
                    max_unavailable: Some(IntOrString::Int(0)),
                    max_surge: Some(IntOrString::Int(1)),
                }),
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(app_labels),
                    ..Default::default()
                }),
                spec: Some(pod_spec),
            },
            ..Default::default()
        }),
        status: None,
    };

    Ok(serde_json::to_value(deployment)?)
}

fn container(app: &ApplicationDescriptor) -> Container {
    Container {
        name: app.name.clone(),
        image: Some(app.image.clone()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        env: Some(vec![
            env_var(WORKSPACE_ID_ENV, &app.workspace_id),
            env_var(ENVIRONMENT_ENV, &app.environment),
        ]),
        resources: Some(ResourceRequirements {
            requests: Some(quantities("100m", "320Mi")),
            limits: Some(quantities("1000m", "384Mi")),
            ..Default::default()
        }),
        ports: app.port.map(|port| {
            vec![ContainerPort {
                name: Some(HTTP_PORT_NAME.to_string()),
                container_port: port,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]
        }),
        readiness_probe: app.port.map(|_| http_probe()),
        liveness_probe: app.port.map(|_| http_probe()),
        ..Default::default()
    }
}

fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        value_from: None,
    }
}

fn quantities(cpu: &str, memory: &str) -> BTreeMap<String, Quantity> {
    BTreeMap::from([
        ("cpu".to_string(), Quantity(cpu.to_string())),
        ("memory".to_string(), Quantity(memory.to_string())),
    ])
}

/// `GET /` on the named `http` port
fn http_probe() -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some("/".to_string()),
            port: IntOrString::String(HTTP_PORT_NAME.to_string()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(30),
        timeout_seconds: Some(3),
        period_seconds: Some(10),
        success_threshold: Some(1),
        failure_threshold: Some(3),
        ..Default::default()
    }
}
