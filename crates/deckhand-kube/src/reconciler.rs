//! Create-or-patch reconciliation of an application's resources
//!
//! Every upsert follows the same protocol:
//! 1. read the resource by name
//! 2. not found: build the desired document and create it
//! 3. found: patch it with the rebuilt document (or an override fragment)
//!
//! Only a not-found read selects the create branch. Any other read failure is
//! returned as an error. Existence reads are made once; create, patch, delete
//! and list calls go through [`retry`].
//!
//! Deletes read first as well, so deleting something that is already gone is
//! a no-op.

use deckhand_core::{ApplicationDescriptor, LabelManager, selector};
use futures::future::join_all;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, info};

use crate::cluster::{Cluster, DeleteOptions, ResourceApi, ResourceKind, ResourceRef, document_name};
use crate::config::ReconcileConfig;
use crate::error::{KubeError, Result};
use crate::resources::{AppliedResources, ApplyAction, ApplyResult, OperationSummary};
use crate::retry::{RetryPolicy, retry};
use crate::rollout::RolloutVerifier;
use crate::templates::{TemplateBuilder, binding_kind, role_kind};

/// Reconciles application descriptors against a cluster
pub struct Reconciler<C: Cluster> {
    cluster: C,
    templates: TemplateBuilder,
    retry: RetryPolicy,
    rollout: RolloutVerifier,
}

impl<C: Cluster> Reconciler<C> {
    /// Create a reconciler
    pub fn new(cluster: C, config: ReconcileConfig) -> Self {
        Self {
            cluster,
            templates: TemplateBuilder::new(LabelManager::new(config.labels)),
            retry: config.retry,
            rollout: RolloutVerifier::new(config.rollout),
        }
    }

    /// Get the cluster
    pub fn cluster(&self) -> &C {
        &self.cluster
    }

    /// Get the template builder
    pub fn templates(&self) -> &TemplateBuilder {
        &self.templates
    }

    /// Get the retry policy
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    // =========================================================================
    // Upserts
    // =========================================================================

    /// Create the namespace if it does not exist; an existing one is kept as is
    pub async fn upsert_namespace(&self, app: &ApplicationDescriptor) -> Result<ApplyResult> {
        app.validate()?;
        let desired = self.templates.namespace(app)?;
        let reference = ResourceRef::new(ResourceKind::Namespace, app.namespace.clone(), None);
        let api = self.cluster.api(ResourceKind::Namespace);

        if let Some(existing) = self.read_existing(api.as_ref(), &reference).await? {
            debug!(resource = %reference, "Namespace exists, keeping it");
            return Ok(ApplyResult {
                resource: reference,
                action: ApplyAction::Kept,
                document: existing,
            });
        }
        self.create(api.as_ref(), reference, &desired).await
    }

    /// Upsert the service account
    ///
    /// An existing account is patched with the override fragment when there is
    /// one, otherwise with the full document.
    pub async fn upsert_service_account(&self, app: &ApplicationDescriptor) -> Result<ApplyResult> {
        app.validate()?;
        let desired = self.templates.service_account(app)?;
        let patch = app.overrides.service_account.as_ref().unwrap_or(&desired);
        let reference = ResourceRef::new(
            ResourceKind::ServiceAccount,
            app.service_account_name(),
            Some(app.namespace.as_str()),
        );
        self.upsert(reference, &desired, patch).await
    }

    /// Upsert the Role or ClusterRole; `None` without a role spec
    pub async fn upsert_role(&self, app: &ApplicationDescriptor) -> Result<Option<ApplyResult>> {
        app.validate()?;
        let (Some(desired), Some(spec)) = (self.templates.role(app)?, &app.role_spec) else {
            return Ok(None);
        };
        let reference = app_ref(role_kind(spec.kind()?), app);
        self.upsert(reference, &desired, &desired).await.map(Some)
    }

    /// Upsert the RoleBinding or ClusterRoleBinding; `None` without a role spec
    pub async fn upsert_role_binding(
        &self,
        app: &ApplicationDescriptor,
    ) -> Result<Option<ApplyResult>> {
        app.validate()?;
        let (Some(desired), Some(spec)) = (self.templates.role_binding(app)?, &app.role_spec)
        else {
            return Ok(None);
        };
        let reference = app_ref(binding_kind(spec.kind()?), app);
        self.upsert(reference, &desired, &desired).await.map(Some)
    }

    /// Upsert the service; `None`, with no cluster call, without a port
    pub async fn upsert_service(&self, app: &ApplicationDescriptor) -> Result<Option<ApplyResult>> {
        app.validate()?;
        let Some(desired) = self.templates.service(app)? else {
            debug!(app = %app.name, "No port, skipping service");
            return Ok(None);
        };
        let reference = app_ref(ResourceKind::Service, app);
        self.upsert(reference, &desired, &desired).await.map(Some)
    }

    /// Upsert the ingress; `None`, with no cluster call, without a path
    pub async fn upsert_ingress(&self, app: &ApplicationDescriptor) -> Result<Option<ApplyResult>> {
        app.validate()?;
        let Some(desired) = self.templates.ingress(app)? else {
            debug!(app = %app.name, "No path, skipping ingress");
            return Ok(None);
        };
        let reference = app_ref(ResourceKind::Ingress, app);
        self.upsert(reference, &desired, &desired).await.map(Some)
    }

    /// Upsert the deployment
    pub async fn upsert_deployment(&self, app: &ApplicationDescriptor) -> Result<ApplyResult> {
        app.validate()?;
        let desired = self.templates.deployment(app)?;
        let reference = app_ref(ResourceKind::Deployment, app);
        self.upsert(reference, &desired, &desired).await
    }

    /// Upsert one secret payload
    pub async fn upsert_secret(
        &self,
        app: &ApplicationDescriptor,
        payload: &JsonValue,
    ) -> Result<ApplyResult> {
        app.validate()?;
        let desired = self.templates.secret(app, payload)?;
        let name = document_name(&desired).unwrap_or_default().to_string();
        let reference = ResourceRef::new(ResourceKind::Secret, name, Some(app.namespace.as_str()));
        self.upsert(reference, &desired, &desired).await
    }

    /// Upsert every secret payload concurrently
    ///
    /// All upserts run to completion; the first failure, in payload order, is
    /// returned.
    pub async fn upsert_secrets(&self, app: &ApplicationDescriptor) -> Result<Vec<ApplyResult>> {
        app.validate()?;
        let outcomes = join_all(
            app.secrets
                .iter()
                .map(|payload| self.upsert_secret(app, payload)),
        )
        .await;
        outcomes.into_iter().collect()
    }

    // =========================================================================
    // Deletes
    // =========================================================================

    /// Delete the deployment, cascading to its pods in the background.
    /// Returns the deleted document, or `None` if it was already gone.
    pub async fn delete_deployment(
        &self,
        app: &ApplicationDescriptor,
    ) -> Result<Option<JsonValue>> {
        app.validate()?;
        let reference = app_ref(ResourceKind::Deployment, app);
        self.delete(reference, DeleteOptions::background()).await
    }

    /// Delete the service
    pub async fn delete_service(&self, app: &ApplicationDescriptor) -> Result<Option<JsonValue>> {
        app.validate()?;
        let reference = app_ref(ResourceKind::Service, app);
        self.delete(reference, DeleteOptions::default()).await
    }

    /// Delete the ingress
    pub async fn delete_ingress(&self, app: &ApplicationDescriptor) -> Result<Option<JsonValue>> {
        app.validate()?;
        let reference = app_ref(ResourceKind::Ingress, app);
        self.delete(reference, DeleteOptions::default()).await
    }

    /// Delete the service account
    pub async fn delete_service_account(
        &self,
        app: &ApplicationDescriptor,
    ) -> Result<Option<JsonValue>> {
        app.validate()?;
        let reference = ResourceRef::new(
            ResourceKind::ServiceAccount,
            app.service_account_name(),
            Some(app.namespace.as_str()),
        );
        self.delete(reference, DeleteOptions::default()).await
    }

    /// Delete the Role or ClusterRole; `None` without a role spec
    pub async fn delete_role(&self, app: &ApplicationDescriptor) -> Result<Option<JsonValue>> {
        app.validate()?;
        let Some(spec) = &app.role_spec else {
            return Ok(None);
        };
        let reference = app_ref(role_kind(spec.kind()?), app);
        self.delete(reference, DeleteOptions::default()).await
    }

    /// Delete the RoleBinding or ClusterRoleBinding; `None` without a role spec
    pub async fn delete_role_binding(
        &self,
        app: &ApplicationDescriptor,
    ) -> Result<Option<JsonValue>> {
        app.validate()?;
        let Some(spec) = &app.role_spec else {
            return Ok(None);
        };
        let reference = app_ref(binding_kind(spec.kind()?), app);
        self.delete(reference, DeleteOptions::default()).await
    }

    /// Delete every secret carrying the application's match labels
    ///
    /// Returns the deleted documents, possibly none.
    pub async fn delete_secrets(&self, app: &ApplicationDescriptor) -> Result<Vec<JsonValue>> {
        app.validate()?;
        let api = self.cluster.api(ResourceKind::Secret);
        let api = api.as_ref();
        let label_selector = selector(&self.templates.labels().match_labels(app));
        let namespace = app.namespace.as_str();

        let description = format!("list {}/Secret with {}", namespace, label_selector);
        let found = retry(&self.retry, &description, || {
            api.list(Some(namespace), &label_selector)
        })
        .await
        .map_err(|e| e.for_resource("list", format!("{}/Secret", namespace)))?;

        let mut deleted = Vec::with_capacity(found.len());
        for secret in found {
            let Some(name) = document_name(&secret) else {
                continue;
            };
            let reference = ResourceRef::new(ResourceKind::Secret, name, Some(namespace));
            self.delete_existing(api, &reference, DeleteOptions::default())
                .await?;
            deleted.push(secret);
        }
        Ok(deleted)
    }

    // =========================================================================
    // Whole application
    // =========================================================================

    /// Reconcile every resource of the application, dependencies first
    ///
    /// Order: namespace, service account and RBAC (with a role spec), service,
    /// secrets, deployment, ingress. Stops at the first failure.
    pub async fn apply_application(
        &self,
        app: &ApplicationDescriptor,
    ) -> Result<AppliedResources> {
        app.validate()?;
        let mut applied = AppliedResources::default();

        let namespace = self.upsert_namespace(app).await?;
        applied.record(&namespace);
        applied.namespace = Some(namespace.document);

        if app.role_spec.is_some() {
            let account = self.upsert_service_account(app).await?;
            applied.record(&account);
            applied.service_account = Some(account.document);

            if let Some(role) = self.upsert_role(app).await? {
                applied.record(&role);
                applied.role = Some(role.document);
            }
            if let Some(binding) = self.upsert_role_binding(app).await? {
                applied.record(&binding);
                applied.role_binding = Some(binding.document);
            }
        }

        if let Some(service) = self.upsert_service(app).await? {
            applied.record(&service);
            applied.service = Some(service.document);
        }

        for secret in self.upsert_secrets(app).await? {
            applied.record(&secret);
            applied.secrets.push(secret.document);
        }

        let deployment = self.upsert_deployment(app).await?;
        applied.record(&deployment);
        applied.deployment = Some(deployment.document);

        if let Some(ingress) = self.upsert_ingress(app).await? {
            applied.record(&ingress);
            applied.ingress = Some(ingress.document);
        }

        info!(
            app = %app.name,
            namespace = %app.namespace,
            summary = %applied.summary(),
            "Applied application"
        );
        Ok(applied)
    }

    /// Delete every resource of the application, dependents first
    ///
    /// Every step is attempted even when an earlier one fails; failures are
    /// reported together as [`KubeError::PartialFailure`]. The namespace is
    /// never deleted.
    pub async fn delete_application(
        &self,
        app: &ApplicationDescriptor,
    ) -> Result<OperationSummary> {
        app.validate()?;
        let mut summary = OperationSummary::default();
        let slug = |kind: ResourceKind, name: &str| {
            ResourceRef::new(kind, name, Some(app.namespace.as_str()))
        };

        summary.record(
            slug(ResourceKind::Ingress, &app.name).to_string(),
            self.delete_ingress(app).await.map(|d| d.is_some()),
        );
        summary.record(
            slug(ResourceKind::Deployment, &app.name).to_string(),
            self.delete_deployment(app).await.map(|d| d.is_some()),
        );

        let secrets_slug = format!("{}/Secret/*", app.namespace);
        match self.delete_secrets(app).await {
            Ok(deleted) if deleted.is_empty() => summary
                .skipped
                .push((secrets_slug, "no matching secrets".to_string())),
            Ok(deleted) => {
                for secret in &deleted {
                    let name = document_name(secret).unwrap_or_default();
                    summary
                        .succeeded
                        .push(slug(ResourceKind::Secret, name).to_string());
                }
            }
            Err(e) => summary.failed.push((secrets_slug, e.to_string())),
        }

        summary.record(
            slug(ResourceKind::Service, &app.name).to_string(),
            self.delete_service(app).await.map(|d| d.is_some()),
        );

        if let Some(spec) = &app.role_spec {
            let kind = spec.kind()?;
            summary.record(
                slug(binding_kind(kind), &app.name).to_string(),
                self.delete_role_binding(app).await.map(|d| d.is_some()),
            );
            summary.record(
                slug(role_kind(kind), &app.name).to_string(),
                self.delete_role(app).await.map(|d| d.is_some()),
            );
            summary.record(
                slug(ResourceKind::ServiceAccount, &app.service_account_name()).to_string(),
                self.delete_service_account(app).await.map(|d| d.is_some()),
            );
        }

        info!(
            app = %app.name,
            namespace = %app.namespace,
            summary = %summary.summary(),
            "Deleted application"
        );
        summary.into_result(format!("delete application {}", app.name))
    }

    // =========================================================================
    // Rollout
    // =========================================================================

    /// Wait for the deployment to roll out, with the configured timeout
    pub async fn wait_for_rollout(&self, app: &ApplicationDescriptor) -> bool {
        let timeout = self.rollout.config().timeout;
        self.wait_for_rollout_within(app, timeout).await
    }

    /// Wait for the deployment to roll out within `timeout`
    pub async fn wait_for_rollout_within(
        &self,
        app: &ApplicationDescriptor,
        timeout: Duration,
    ) -> bool {
        let api = self.cluster.api(ResourceKind::Deployment);
        self.rollout
            .wait_for(api.as_ref(), &app.name, &app.namespace, timeout)
            .await
    }

    // =========================================================================
    // Protocol
    // =========================================================================

    /// Existence probe: `None` on not-found, error on anything else
    async fn read_existing(
        &self,
        api: &dyn ResourceApi,
        reference: &ResourceRef,
    ) -> Result<Option<JsonValue>> {
        match api.read(&reference.name, reference.ns()).await {
            Ok(document) => Ok(Some(document)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.for_resource("read", reference.to_string())),
        }
    }

    async fn upsert(
        &self,
        reference: ResourceRef,
        desired: &JsonValue,
        patch: &JsonValue,
    ) -> Result<ApplyResult> {
        let api = self.cluster.api(reference.kind);
        let api = api.as_ref();

        if self.read_existing(api, &reference).await?.is_none() {
            return self.create(api, reference, desired).await;
        }

        debug!(resource = %reference, "Resource exists, patching");
        let slug = reference.to_string();
        let document = retry(&self.retry, &format!("patch {}", slug), || {
            api.patch(&reference.name, reference.ns(), patch)
        })
        .await
        .map_err(|e| e.for_resource("patch", slug.clone()))?;

        info!(resource = %slug, "Patched");
        Ok(ApplyResult {
            resource: reference,
            action: ApplyAction::Patched,
            document,
        })
    }

    async fn create(
        &self,
        api: &dyn ResourceApi,
        reference: ResourceRef,
        desired: &JsonValue,
    ) -> Result<ApplyResult> {
        debug!(resource = %reference, "Resource absent, creating");
        let slug = reference.to_string();
        let document = retry(&self.retry, &format!("create {}", slug), || {
            api.create(reference.ns(), desired)
        })
        .await
        .map_err(|e| e.for_resource("create", slug.clone()))?;

        info!(resource = %slug, "Created");
        Ok(ApplyResult {
            resource: reference,
            action: ApplyAction::Created,
            document,
        })
    }

    async fn delete(
        &self,
        reference: ResourceRef,
        options: DeleteOptions,
    ) -> Result<Option<JsonValue>> {
        let api = self.cluster.api(reference.kind);
        let api = api.as_ref();

        let Some(existing) = self.read_existing(api, &reference).await? else {
            debug!(resource = %reference, "Already absent, nothing to delete");
            return Ok(None);
        };
        self.delete_existing(api, &reference, options).await?;
        Ok(Some(existing))
    }

    /// Delete with retry; a not-found answer means the work is done
    async fn delete_existing(
        &self,
        api: &dyn ResourceApi,
        reference: &ResourceRef,
        options: DeleteOptions,
    ) -> Result<()> {
        let slug = reference.to_string();
        let name = reference.name.as_str();
        let namespace = reference.ns();

        retry(&self.retry, &format!("delete {}", slug), || async move {
            match api.delete(name, namespace, options).await {
                Err(e) if e.is_not_found() => Ok(()),
                other => other,
            }
        })
        .await
        .map_err(|e: KubeError| e.for_resource("delete", slug.clone()))?;

        info!(resource = %slug, "Deleted");
        Ok(())
    }
}

/// A resource named after the application, in its namespace
fn app_ref(kind: ResourceKind, app: &ApplicationDescriptor) -> ResourceRef {
    ResourceRef::new(kind, app.name.clone(), Some(app.namespace.as_str()))
}
