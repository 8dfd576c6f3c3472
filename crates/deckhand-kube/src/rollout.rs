//! Deployment rollout verification
//!
//! A rollout is complete when, on the same poll:
//! - all desired replicas exist
//! - all of them run the current pod template
//! - all of them are available
//! - the controller has observed the latest generation
//!
//! A read error ends the wait as "not rolled out". It is not retried here.

use chrono::Utc;
use k8s_openapi::api::apps::v1::DeploymentStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cluster::ResourceApi;
use crate::error::Result;

/// Rollout polling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RolloutConfig {
    /// Time between polls
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Give up after this long
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Replica counters of one Deployment at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloutStatus {
    /// `spec.replicas`
    pub desired: i32,
    /// `status.replicas`
    pub replicas: i32,
    /// `status.updatedReplicas`
    pub updated: i32,
    /// `status.availableReplicas`
    pub available: i32,
    /// `metadata.generation`
    pub generation: i64,
    /// `status.observedGeneration`
    pub observed_generation: i64,
}

impl RolloutStatus {
    /// Extract the counters from a Deployment document
    ///
    /// Missing `spec.replicas` means 1; missing counters mean 0.
    pub fn from_document(document: &JsonValue) -> Result<Self> {
        let status: DeploymentStatus = match document.get("status") {
            Some(s) if !s.is_null() => serde_json::from_value(s.clone())?,
            _ => DeploymentStatus::default(),
        };
        let desired = document
            .pointer("/spec/replicas")
            .and_then(JsonValue::as_i64)
            .unwrap_or(1);
        let generation = document
            .pointer("/metadata/generation")
            .and_then(JsonValue::as_i64)
            .unwrap_or(0);

        Ok(Self {
            desired: i32::try_from(desired).unwrap_or(i32::MAX),
            replicas: status.replicas.unwrap_or(0),
            updated: status.updated_replicas.unwrap_or(0),
            available: status.available_replicas.unwrap_or(0),
            generation,
            observed_generation: status.observed_generation.unwrap_or(0),
        })
    }

    /// Whether every counter has converged on the desired count
    pub fn is_complete(&self) -> bool {
        self.updated == self.desired
            && self.replicas == self.desired
            && self.available == self.desired
            && self.observed_generation >= self.generation
    }

    /// Human-readable progress line
    pub fn summary(&self) -> String {
        if self.is_complete() {
            return format!("Rolled out: {}/{} available", self.available, self.desired);
        }
        format!(
            "Waiting: {}/{} updated, {}/{} replicas, {}/{} available, generation {}/{}",
            self.updated,
            self.desired,
            self.replicas,
            self.desired,
            self.available,
            self.desired,
            self.observed_generation,
            self.generation
        )
    }
}

/// Polls a Deployment until its rollout completes or a deadline passes
#[derive(Debug, Clone, Default)]
pub struct RolloutVerifier {
    config: RolloutConfig,
}

impl RolloutVerifier {
    /// Create a verifier
    pub fn new(config: RolloutConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &RolloutConfig {
        &self.config
    }

    /// Read the Deployment once
    pub async fn check_once(
        &self,
        deployments: &dyn ResourceApi,
        name: &str,
        namespace: &str,
    ) -> Result<RolloutStatus> {
        let document = deployments.read(name, Some(namespace)).await?;
        RolloutStatus::from_document(&document)
    }

    /// Wait using the configured timeout
    pub async fn wait(&self, deployments: &dyn ResourceApi, name: &str, namespace: &str) -> bool {
        self.wait_for(deployments, name, namespace, self.config.timeout)
            .await
    }

    /// Poll until the rollout completes (true) or `timeout` elapses (false)
    pub async fn wait_for(
        &self,
        deployments: &dyn ResourceApi,
        name: &str,
        namespace: &str,
        timeout: Duration,
    ) -> bool {
        let start = Utc::now();
        // A timeout past the representable range means no deadline
        let deadline = chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|timeout| start.checked_add_signed(timeout));

        loop {
            match self.check_once(deployments, name, namespace).await {
                Ok(status) if status.is_complete() => {
                    info!(
                        deployment = name,
                        namespace,
                        elapsed_ms = Utc::now().signed_duration_since(start).num_milliseconds(),
                        "Rollout complete"
                    );
                    return true;
                }
                Ok(status) => {
                    debug!(
                        deployment = name,
                        namespace,
                        status = %status.summary(),
                        "Rollout in progress"
                    );
                }
                Err(e) => {
                    warn!(
                        deployment = name,
                        namespace,
                        error = %e,
                        "Failed to read deployment status"
                    );
                    return false;
                }
            }

            let mut pause = self.config.interval;
            if let Some(deadline) = deadline {
                let now = Utc::now();
                if now >= deadline {
                    warn!(deployment = name, namespace, ?timeout, "Rollout timed out");
                    return false;
                }
                pause = pause.min((deadline - now).to_std().unwrap_or_default());
            }
            tokio::time::sleep(pause).await;
        }
    }
}
