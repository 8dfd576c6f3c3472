//! Cluster adapter backed by the Kubernetes API server
//!
//! Each kind gets its own [`KubeResourceApi`], built on `Api<DynamicObject>`
//! with the kind's `ApiResource`, so documents travel as plain JSON without
//! compile-time knowledge of their shape.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Secret, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use kube::{
    Client,
    api::{
        Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams,
        PropagationPolicy,
    },
    discovery::ApiResource,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;

use super::{Cluster, DeleteOptions, Propagation, ResourceApi, ResourceKind};
use crate::error::Result;

/// Field manager recorded on every write
const FIELD_MANAGER: &str = "deckhand";

/// Cluster backed by a live API server
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Connect using the default kubeconfig or in-cluster configuration
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self { client })
    }

    /// Create with an existing client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Get the underlying Kubernetes client
    pub fn kube_client(&self) -> &Client {
        &self.client
    }
}

impl Cluster for KubeCluster {
    fn api(&self, kind: ResourceKind) -> Arc<dyn ResourceApi> {
        Arc::new(KubeResourceApi::new(self.client.clone(), kind))
    }
}

/// Adapter serving one resource kind
pub struct KubeResourceApi {
    client: Client,
    kind: ResourceKind,
    resource: ApiResource,
}

impl KubeResourceApi {
    /// Create the adapter for a kind
    pub fn new(client: Client, kind: ResourceKind) -> Self {
        Self {
            client,
            kind,
            resource: api_resource(kind),
        }
    }

    /// Create an Api client scoped to the kind and namespace
    fn api(&self, namespace: Option<&str>) -> Api<DynamicObject> {
        if !self.kind.is_namespaced() {
            return Api::all_with(self.client.clone(), &self.resource);
        }
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &self.resource),
            None => Api::default_namespaced_with(self.client.clone(), &self.resource),
        }
    }
}

#[async_trait]
impl ResourceApi for KubeResourceApi {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    async fn read(&self, name: &str, namespace: Option<&str>) -> Result<JsonValue> {
        let obj = self.api(namespace).get(name).await?;
        Ok(serde_json::to_value(obj)?)
    }

    async fn create(&self, namespace: Option<&str>, document: &JsonValue) -> Result<JsonValue> {
        let obj: DynamicObject = serde_json::from_value(document.clone())?;
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        let created = self.api(namespace).create(&params, &obj).await?;
        Ok(serde_json::to_value(created)?)
    }

    async fn patch(
        &self,
        name: &str,
        namespace: Option<&str>,
        patch: &JsonValue,
    ) -> Result<JsonValue> {
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        let patched = self
            .api(namespace)
            .patch(name, &params, &Patch::Strategic(patch))
            .await?;
        Ok(serde_json::to_value(patched)?)
    }

    async fn delete(
        &self,
        name: &str,
        namespace: Option<&str>,
        options: DeleteOptions,
    ) -> Result<()> {
        let params = DeleteParams {
            propagation_policy: options.propagation.map(propagation_policy),
            ..Default::default()
        };
        self.api(namespace).delete(name, &params).await?;
        Ok(())
    }

    async fn list(&self, namespace: Option<&str>, label_selector: &str) -> Result<Vec<JsonValue>> {
        let params = ListParams::default().labels(label_selector);
        let list = self.api(namespace).list(&params).await?;
        list.items
            .into_iter()
            .map(|obj| serde_json::to_value(obj).map_err(Into::into))
            .collect()
    }
}

fn propagation_policy(propagation: Propagation) -> PropagationPolicy {
    match propagation {
        Propagation::Background => PropagationPolicy::Background,
        Propagation::Foreground => PropagationPolicy::Foreground,
        Propagation::Orphan => PropagationPolicy::Orphan,
    }
}

/// API resource metadata for a kind
fn api_resource(kind: ResourceKind) -> ApiResource {
    match kind {
        ResourceKind::Namespace => ApiResource::erase::<Namespace>(&()),
        ResourceKind::ServiceAccount => ApiResource::erase::<ServiceAccount>(&()),
        ResourceKind::Role => ApiResource::erase::<Role>(&()),
        ResourceKind::ClusterRole => ApiResource::erase::<ClusterRole>(&()),
        ResourceKind::RoleBinding => ApiResource::erase::<RoleBinding>(&()),
        ResourceKind::ClusterRoleBinding => ApiResource::erase::<ClusterRoleBinding>(&()),
        ResourceKind::Service => ApiResource::erase::<Service>(&()),
        ResourceKind::Secret => ApiResource::erase::<Secret>(&()),
        ResourceKind::Deployment => ApiResource::erase::<Deployment>(&()),
        ResourceKind::Ingress => ApiResource::erase::<Ingress>(&()),
    }
}
