//! Reconciliation tests against the in-memory cluster

use deckhand_core::{ApplicationDescriptor, RoleKind, RoleSpec};
use deckhand_kube::{
    ApplyAction, ErrorKind, KubeError, MockCluster, Propagation, ReconcileConfig, Reconciler,
    ResourceKind, RetryPolicy, RolloutConfig, Verb,
};
use serde_json::{Value as JsonValue, json};
use std::time::Duration;

fn config() -> ReconcileConfig {
    ReconcileConfig {
        retry: RetryPolicy {
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: false,
            ..Default::default()
        },
        rollout: RolloutConfig {
            interval: Duration::from_millis(10),
            timeout: Duration::from_millis(200),
        },
        ..Default::default()
    }
}

fn setup() -> (MockCluster, Reconciler<MockCluster>) {
    let cluster = MockCluster::new();
    let reconciler = Reconciler::new(cluster.clone(), config());
    (cluster, reconciler)
}

/// Minimal descriptor: no port, path, role or secrets
fn bare_app() -> ApplicationDescriptor {
    ApplicationDescriptor::new("app1", "prod", "W1", "testing", "img:1")
}

/// Descriptor exercising every resource kind
fn full_app() -> ApplicationDescriptor {
    let mut app = bare_app();
    app.port = Some(8080);
    app.path = Some("/app1".to_string());
    app.role_spec = Some(RoleSpec::new(
        RoleKind::Role,
        vec![json!({"apiGroups": [""], "resources": ["pods"], "verbs": ["get"]})],
    ));
    app.secrets = vec![
        json!({"metadata": {"name": "db"}, "stringData": {"password": "hunter2"}}),
        json!({"metadata": {"name": "api"}, "data": {"token": "dG9rZW4="}}),
    ];
    app
}

fn kinds(refs: Vec<deckhand_kube::ResourceRef>) -> Vec<ResourceKind> {
    refs.into_iter().map(|r| r.kind).collect()
}

fn rolled_out(doc: &mut JsonValue) {
    doc["metadata"]["generation"] = json!(2);
    doc["status"] = json!({
        "replicas": 1,
        "updatedReplicas": 1,
        "availableReplicas": 1,
        "observedGeneration": 2
    });
}

mod upsert {
    use super::*;

    #[tokio::test]
    async fn test_create_then_patch_yields_same_document() {
        let (cluster, reconciler) = setup();
        let app = full_app();

        let first = reconciler.upsert_deployment(&app).await.unwrap();
        let second = reconciler.upsert_deployment(&app).await.unwrap();

        assert_eq!(first.action, ApplyAction::Created);
        assert_eq!(second.action, ApplyAction::Patched);
        assert_eq!(first.document, second.document);

        let counts = cluster.operation_counts(ResourceKind::Deployment);
        assert_eq!(counts.reads, 2);
        assert_eq!(counts.creates, 1);
        assert_eq!(counts.patches, 1);
    }

    #[tokio::test]
    async fn test_deployment_scenario() {
        let (_, reconciler) = setup();
        let mut app = bare_app();
        app.port = Some(8080);

        let result = reconciler.upsert_deployment(&app).await.unwrap();
        let containers = result.document["spec"]["template"]["spec"]["containers"]
            .as_array()
            .unwrap()
            .clone();

        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0]["name"], "app1");
        assert_eq!(containers[0]["image"], "img:1");
        assert_eq!(containers[0]["ports"][0]["name"], "http");
        assert_eq!(containers[0]["ports"][0]["containerPort"], 8080);
        assert_eq!(containers[0]["readinessProbe"]["httpGet"]["port"], "http");
        assert_eq!(containers[0]["livenessProbe"]["httpGet"]["path"], "/");
    }

    #[tokio::test]
    async fn test_read_failure_is_not_absence() {
        let (cluster, reconciler) = setup();
        cluster.fail_next(ResourceKind::Deployment, Verb::Read, 1, 403);

        let err = reconciler.upsert_deployment(&full_app()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Permanent);
        assert!(err.to_string().contains("failed to read prod/Deployment/app1"));
        assert_eq!(cluster.operation_counts(ResourceKind::Deployment).creates, 0);
    }

    #[tokio::test]
    async fn test_unavailable_read_is_not_absence() {
        let (cluster, reconciler) = setup();
        cluster.fail_next(ResourceKind::Deployment, Verb::Read, 1, 503);

        let err = reconciler.upsert_deployment(&full_app()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(err.to_string().contains("failed to read prod/Deployment/app1"));
        let counts = cluster.operation_counts(ResourceKind::Deployment);
        assert_eq!(counts.reads, 1);
        assert_eq!(counts.creates, 0);
        assert!(!cluster.contains(ResourceKind::Deployment, Some("prod"), "app1"));
    }

    #[tokio::test]
    async fn test_transient_create_failures_are_retried() {
        let (cluster, reconciler) = setup();
        cluster.fail_next(ResourceKind::Deployment, Verb::Create, 2, 503);

        let result = reconciler.upsert_deployment(&full_app()).await.unwrap();

        assert_eq!(result.action, ApplyAction::Created);
        assert_eq!(cluster.operation_counts(ResourceKind::Deployment).creates, 3);
        assert!(cluster.contains(ResourceKind::Deployment, Some("prod"), "app1"));
    }

    #[tokio::test]
    async fn test_create_gives_up_after_max_attempts() {
        let (cluster, reconciler) = setup();
        cluster.fail_next(ResourceKind::Service, Verb::Create, 10, 500);

        let err = reconciler.upsert_service(&full_app()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(err.to_string().contains("failed to create prod/Service/app1"));
        assert_eq!(cluster.operation_counts(ResourceKind::Service).creates, 5);
    }

    #[tokio::test]
    async fn test_service_and_ingress_skipped_without_port_or_path() {
        let (cluster, reconciler) = setup();
        let app = bare_app();

        assert!(reconciler.upsert_service(&app).await.unwrap().is_none());
        assert!(reconciler.upsert_ingress(&app).await.unwrap().is_none());
        assert_eq!(cluster.total_counts().reads, 0);
        assert_eq!(cluster.total_counts().writes(), 0);
    }

    #[tokio::test]
    async fn test_service_account_patched_with_override_fragment() {
        let (cluster, reconciler) = setup();
        cluster.insert(
            ResourceKind::ServiceAccount,
            Some("prod"),
            json!({
                "apiVersion": "v1",
                "kind": "ServiceAccount",
                "metadata": {"name": "runner", "namespace": "prod", "annotations": {"keep": "me"}}
            }),
        );
        let mut app = full_app();
        app.overrides.service_account = Some(json!({
            "metadata": {"name": "runner"},
            "automountServiceAccountToken": false
        }));

        let result = reconciler.upsert_service_account(&app).await.unwrap();

        assert_eq!(result.action, ApplyAction::Patched);
        assert_eq!(result.document["metadata"]["annotations"]["keep"], "me");
        assert_eq!(result.document["automountServiceAccountToken"], false);
        assert!(result.document["metadata"].get("labels").is_none());
    }

    #[tokio::test]
    async fn test_cluster_role_is_cluster_scoped() {
        let (cluster, reconciler) = setup();
        let mut app = full_app();
        app.role_spec = Some(RoleSpec::new(RoleKind::ClusterRole, vec![]));

        reconciler.upsert_role(&app).await.unwrap().unwrap();
        reconciler.upsert_role_binding(&app).await.unwrap().unwrap();

        assert!(cluster.contains(ResourceKind::ClusterRole, None, "app1"));
        assert!(cluster.contains(ResourceKind::ClusterRoleBinding, None, "app1"));
        assert!(!cluster.contains(ResourceKind::Role, Some("prod"), "app1"));
    }

    #[tokio::test]
    async fn test_existing_namespace_is_kept() {
        let (cluster, reconciler) = setup();
        cluster.insert(
            ResourceKind::Namespace,
            None,
            json!({"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": "prod"}}),
        );

        let result = reconciler.upsert_namespace(&bare_app()).await.unwrap();

        assert_eq!(result.action, ApplyAction::Kept);
        let counts = cluster.operation_counts(ResourceKind::Namespace);
        assert_eq!(counts.writes(), 0);
    }

    #[tokio::test]
    async fn test_secrets_upserted_with_labels() {
        let (cluster, reconciler) = setup();

        let results = reconciler.upsert_secrets(&full_app()).await.unwrap();

        assert_eq!(results.len(), 2);
        let db = cluster.get(ResourceKind::Secret, Some("prod"), "db").unwrap();
        assert_eq!(db["data"]["password"], "aHVudGVyMg==");
        assert_eq!(db["metadata"]["labels"]["deckhand.io/workspaceId"], "W1");
        assert!(cluster.contains(ResourceKind::Secret, Some("prod"), "api"));
    }

    #[tokio::test]
    async fn test_one_failing_secret_does_not_cancel_others() {
        let (cluster, reconciler) = setup();
        cluster.insert(
            ResourceKind::Secret,
            Some("prod"),
            json!({"apiVersion": "v1", "kind": "Secret", "metadata": {"name": "db"}}),
        );
        cluster.fail_next(ResourceKind::Secret, Verb::Patch, 5, 422);

        let err = reconciler.upsert_secrets(&full_app()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Permanent);
        assert!(err.to_string().contains("failed to patch prod/Secret/db"));
        assert_eq!(cluster.operation_counts(ResourceKind::Secret).patches, 5);
        assert!(cluster.contains(ResourceKind::Secret, Some("prod"), "api"));
    }

    #[tokio::test]
    async fn test_secret_with_invalid_descriptor_makes_no_call() {
        let (cluster, reconciler) = setup();
        let mut app = full_app();
        app.namespace = String::new();

        let err = reconciler
            .upsert_secret(&app, &app.secrets[0])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("namespace"));
        assert!(cluster.calls().is_empty());
    }
}

mod apply {
    use super::*;

    #[tokio::test]
    async fn test_apply_order() {
        let (cluster, reconciler) = setup();

        let applied = reconciler.apply_application(&full_app()).await.unwrap();

        assert_eq!(
            kinds(cluster.calls_of(Verb::Create)),
            vec![
                ResourceKind::Namespace,
                ResourceKind::ServiceAccount,
                ResourceKind::Role,
                ResourceKind::RoleBinding,
                ResourceKind::Service,
                ResourceKind::Secret,
                ResourceKind::Secret,
                ResourceKind::Deployment,
                ResourceKind::Ingress,
            ]
        );
        assert_eq!(applied.created().len(), 9);
        assert_eq!(applied.secrets.len(), 2);
        assert!(applied.ingress.is_some());
        assert_eq!(applied.summary(), "9 created, 0 patched");
    }

    #[tokio::test]
    async fn test_second_apply_patches_to_same_state() {
        let (cluster, reconciler) = setup();
        let app = full_app();

        let first = reconciler.apply_application(&app).await.unwrap();
        let count_after_first = cluster.resource_count();
        let second = reconciler.apply_application(&app).await.unwrap();

        assert_eq!(cluster.resource_count(), count_after_first);
        assert_eq!(first.deployment, second.deployment);
        assert_eq!(first.service, second.service);
        assert_eq!(first.secrets, second.secrets);
        assert!(second.created().is_empty());
        // namespace is kept, the other eight resources are patched
        assert_eq!(second.summary(), "0 created, 8 patched");
    }

    #[tokio::test]
    async fn test_apply_stops_at_first_failure() {
        let (cluster, reconciler) = setup();
        cluster.fail_next(ResourceKind::Service, Verb::Create, 5, 500);

        let err = reconciler.apply_application(&full_app()).await.unwrap_err();

        assert!(err.to_string().contains("prod/Service/app1"));
        assert!(cluster.contains(ResourceKind::Role, Some("prod"), "app1"));
        assert!(!cluster.contains(ResourceKind::Deployment, Some("prod"), "app1"));
        assert_eq!(cluster.operation_counts(ResourceKind::Secret).creates, 0);
    }

    #[tokio::test]
    async fn test_invalid_descriptor_fails_before_any_call() {
        let (cluster, reconciler) = setup();
        let mut app = full_app();
        app.role_spec = Some(RoleSpec(json!({"rules": []})));

        let err = reconciler.apply_application(&app).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(cluster.calls().is_empty());
    }
}

mod delete {
    use super::*;

    #[tokio::test]
    async fn test_delete_absent_is_noop() {
        let (cluster, reconciler) = setup();

        let deleted = reconciler.delete_deployment(&full_app()).await.unwrap();

        assert!(deleted.is_none());
        assert_eq!(cluster.operation_counts(ResourceKind::Deployment).deletes, 0);
    }

    #[tokio::test]
    async fn test_double_delete_is_safe() {
        let (cluster, reconciler) = setup();
        let app = full_app();
        reconciler.upsert_service(&app).await.unwrap();

        let first = reconciler.delete_service(&app).await.unwrap();
        let second = reconciler.delete_service(&app).await.unwrap();

        assert_eq!(first.unwrap()["metadata"]["name"], "app1");
        assert!(second.is_none());
        assert_eq!(cluster.operation_counts(ResourceKind::Service).deletes, 1);
    }

    #[tokio::test]
    async fn test_deployment_delete_cascades_in_background() {
        let (cluster, reconciler) = setup();
        let app = full_app();
        reconciler.upsert_deployment(&app).await.unwrap();

        reconciler.delete_deployment(&app).await.unwrap().unwrap();

        let options = cluster.delete_options();
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].0.to_string(), "prod/Deployment/app1");
        assert_eq!(options[0].1.propagation, Some(Propagation::Background));
    }

    #[tokio::test]
    async fn test_delete_secrets_by_match_labels() {
        let (cluster, reconciler) = setup();
        let app = full_app();
        reconciler.upsert_secrets(&app).await.unwrap();

        let mut other = full_app();
        other.name = "app2".to_string();
        other.secrets = vec![json!({"metadata": {"name": "other"}, "data": {}})];
        reconciler.upsert_secrets(&other).await.unwrap();

        let deleted = reconciler.delete_secrets(&app).await.unwrap();

        let mut names: Vec<_> = deleted
            .iter()
            .map(|s| s["metadata"]["name"].as_str().unwrap().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["api", "db"]);
        assert!(cluster.contains(ResourceKind::Secret, Some("prod"), "other"));

        assert!(reconciler.delete_secrets(&app).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_application_order() {
        let (cluster, reconciler) = setup();
        let app = full_app();
        reconciler.apply_application(&app).await.unwrap();
        cluster.reset_counts();

        let summary = reconciler.delete_application(&app).await.unwrap();

        assert_eq!(
            kinds(cluster.calls_of(Verb::Delete)),
            vec![
                ResourceKind::Ingress,
                ResourceKind::Deployment,
                ResourceKind::Secret,
                ResourceKind::Secret,
                ResourceKind::Service,
                ResourceKind::RoleBinding,
                ResourceKind::Role,
                ResourceKind::ServiceAccount,
            ]
        );
        assert_eq!(summary.succeeded.len(), 8);
        assert!(summary.is_success());
        assert!(cluster.contains(ResourceKind::Namespace, None, "prod"));
        assert_eq!(cluster.resource_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_application_twice() {
        let (_, reconciler) = setup();
        let app = full_app();
        reconciler.apply_application(&app).await.unwrap();
        reconciler.delete_application(&app).await.unwrap();

        let summary = reconciler.delete_application(&app).await.unwrap();

        assert!(summary.succeeded.is_empty());
        assert_eq!(summary.skipped.len(), 7);
    }

    #[tokio::test]
    async fn test_delete_application_attempts_every_step() {
        let (cluster, reconciler) = setup();
        let app = full_app();
        reconciler.apply_application(&app).await.unwrap();
        cluster.fail_next(ResourceKind::Service, Verb::Delete, 5, 500);

        let err = reconciler.delete_application(&app).await.unwrap_err();

        match &err {
            KubeError::PartialFailure { failures, .. } => {
                assert_eq!(failures.len(), 1);
                assert!(failures[0].starts_with("prod/Service/app1"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(cluster.contains(ResourceKind::Service, Some("prod"), "app1"));
        assert!(!cluster.contains(ResourceKind::Role, Some("prod"), "app1"));
        assert!(!cluster.contains(ResourceKind::ServiceAccount, Some("prod"), "app1"));
    }
}

mod rollout {
    use super::*;

    #[tokio::test]
    async fn test_rollout_complete() {
        let (cluster, reconciler) = setup();
        let app = full_app();
        reconciler.upsert_deployment(&app).await.unwrap();
        cluster.update(ResourceKind::Deployment, Some("prod"), "app1", rolled_out);

        assert!(reconciler.wait_for_rollout(&app).await);
    }

    #[tokio::test]
    async fn test_rollout_completes_while_polling() {
        let (cluster, reconciler) = setup();
        let app = full_app();
        reconciler.upsert_deployment(&app).await.unwrap();

        let controller = cluster.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            controller.update(ResourceKind::Deployment, Some("prod"), "app1", rolled_out);
        });

        assert!(
            reconciler
                .wait_for_rollout_within(&app, Duration::from_secs(2))
                .await
        );
        assert!(cluster.operation_counts(ResourceKind::Deployment).reads >= 2);
    }

    #[tokio::test]
    async fn test_rollout_times_out() {
        let (cluster, reconciler) = setup();
        let app = full_app();
        reconciler.upsert_deployment(&app).await.unwrap();
        cluster.update(ResourceKind::Deployment, Some("prod"), "app1", |doc| {
            rolled_out(doc);
            doc["status"]["availableReplicas"] = json!(0);
        });

        assert!(
            !reconciler
                .wait_for_rollout_within(&app, Duration::from_millis(50))
                .await
        );
    }

    #[tokio::test]
    async fn test_rollout_read_error_is_false() {
        let (cluster, reconciler) = setup();

        assert!(!reconciler.wait_for_rollout(&full_app()).await);
        assert_eq!(cluster.operation_counts(ResourceKind::Deployment).reads, 1);
    }

    #[tokio::test]
    async fn test_rollout_with_huge_timeout() {
        let (cluster, reconciler) = setup();
        let app = full_app();
        reconciler.upsert_deployment(&app).await.unwrap();
        cluster.update(ResourceKind::Deployment, Some("prod"), "app1", rolled_out);

        for timeout in [Duration::from_secs(10_000_000_000_000), Duration::MAX] {
            assert!(reconciler.wait_for_rollout_within(&app, timeout).await);
        }
    }
}
