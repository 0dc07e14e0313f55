//! Post-install migration health.
//!
//! Installed workloads run their schema migrations in an init container
//! named `migration`. This module walks every deployment and stateful set
//! in a namespace, finds the pods behind them and reports each pod whose
//! migration container terminated unsuccessfully, along with its logs.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ContainerStateTerminated, ContainerStatus, Pod, PodTemplateSpec};
use kube::ResourceExt;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::client::Cluster;
use crate::config::ProbeConfig;
use crate::error::Result;
use crate::resources::ProbeResources;
use crate::retry::RetryPolicy;

/// Name of the init container that runs migrations.
pub const MIGRATION_CONTAINER: &str = "migration";

const COMPLETED: &str = "Completed";

/// A pod whose migration init container did not complete cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitContainerFailure {
    pub pod: String,
    pub container: String,
    pub reason: Option<String>,
    pub exit_code: i32,
    pub logs: String,
}

fn failed_termination(terminated: &ContainerStateTerminated) -> bool {
    terminated.reason.as_deref() != Some(COMPLETED) || terminated.exit_code != 0
}

/// The failed termination recorded for a container, current state first.
fn failed_state(status: &ContainerStatus) -> Option<&ContainerStateTerminated> {
    let current = status.state.as_ref().and_then(|s| s.terminated.as_ref());
    let last = status.last_state.as_ref().and_then(|s| s.terminated.as_ref());
    [current, last]
        .into_iter()
        .flatten()
        .find(|terminated| failed_termination(terminated))
}

/// Failed migration termination of a pod, if any.
#[must_use]
pub fn migration_failure(pod: &Pod) -> Option<&ContainerStateTerminated> {
    pod.status
        .as_ref()?
        .init_container_statuses
        .as_ref()?
        .iter()
        .filter(|status| status.name == MIGRATION_CONTAINER)
        .find_map(failed_state)
}

/// Label selector matching the pods of a workload template.
fn template_selector(template: &PodTemplateSpec) -> Option<String> {
    let labels = template.metadata.as_ref()?.labels.as_ref()?;
    if labels.is_empty() {
        return None;
    }
    Some(
        labels
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// Scan every workload in `namespace` for failed migrations.
///
/// # Errors
///
/// Any list or log call that still fails after `retry` aborts the scan.
pub async fn find_migration_failures<C: Cluster>(
    cluster: &C,
    namespace: &str,
    retry: &RetryPolicy,
) -> Result<Vec<InitContainerFailure>> {
    let config = ProbeConfig::for_namespace(namespace).with_retry(retry.clone());
    let res = ProbeResources::new(cluster, &config);

    let mut selectors = Vec::new();
    for deploy in res.list::<Deployment>(None).await? {
        let selector = deploy.spec.as_ref().and_then(|s| template_selector(&s.template));
        selectors.push((deploy.name_any(), selector));
    }
    for sts in res.list::<StatefulSet>(None).await? {
        let selector = sts.spec.as_ref().and_then(|s| template_selector(&s.template));
        selectors.push((sts.name_any(), selector));
    }

    let mut pods = BTreeMap::new();
    for (workload, selector) in selectors {
        let Some(selector) = selector else {
            debug!(workload = %workload, "Workload has no template labels, skipping");
            continue;
        };
        for pod in res.list::<Pod>(Some(selector.as_str())).await? {
            pods.entry(pod.name_any()).or_insert(pod);
        }
    }

    let mut failures = Vec::new();
    for (name, pod) in &pods {
        let Some(terminated) = migration_failure(pod) else {
            continue;
        };
        warn!(
            pod = %name,
            reason = terminated.reason.as_deref().unwrap_or("<none>"),
            exit_code = terminated.exit_code,
            "Migration init container failed"
        );
        let logs = res.logs(name, Some(MIGRATION_CONTAINER)).await?;
        failures.push(InitContainerFailure {
            pod: name.clone(),
            container: MIGRATION_CONTAINER.to_string(),
            reason: terminated.reason.clone(),
            exit_code: terminated.exit_code,
            logs,
        });
    }

    info!(
        namespace,
        pods = pods.len(),
        failed = failures.len(),
        "Migration health scan finished"
    );
    Ok(failures)
}

/// Map each pod with a failed migration to its migration logs.
///
/// An empty map means every migration completed.
///
/// # Errors
///
/// See [`find_migration_failures`].
pub async fn run_migration_health_check<C: Cluster>(
    cluster: &C,
    namespace: &str,
    retry: &RetryPolicy,
) -> Result<BTreeMap<String, String>> {
    Ok(find_migration_failures(cluster, namespace, retry)
        .await?
        .into_iter()
        .map(|failure| (failure.pod, failure.logs))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::fake::{FakeCluster, Op};
    use crate::manifests;
    use serde_json::json;

    const NS: &str = "cto";

    fn app_pod(name: &str, app: &str, migration: serde_json::Value) -> Pod {
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": name,
                "labels": { "app": app, "app.kubernetes.io/managed-by": "cto-preflight" }
            },
            "spec": { "containers": [{ "name": "app", "image": "app:1" }] },
            "status": {
                "phase": "Pending",
                "initContainerStatuses": [{
                    "name": "migration",
                    "image": "app:1",
                    "imageID": "",
                    "ready": false,
                    "restartCount": 1,
                    "state": migration,
                }]
            }
        }))
        .unwrap()
    }

    fn terminated(reason: &str, exit_code: i32) -> serde_json::Value {
        json!({ "terminated": { "reason": reason, "exitCode": exit_code } })
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_migration_reported_with_logs() {
        let cluster = FakeCluster::new();
        cluster.insert(&manifests::deployment("api", "app:1", &[]), NS);
        cluster.insert(&app_pod("api-7d9f", "api", terminated("Error", 1)), NS);
        cluster.set_logs(NS, "api-7d9f", "relation \"users\" already exists\n");

        let failures = run_migration_health_check(&cluster, NS, &RetryPolicy::default())
            .await
            .unwrap();

        assert_eq!(failures.len(), 1);
        assert!(!failures["api-7d9f"].is_empty());
        assert_eq!(cluster.count("logs api-7d9f/migration"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_migration_is_healthy() {
        let cluster = FakeCluster::new();
        cluster.insert(&manifests::deployment("api", "app:1", &[]), NS);
        cluster.insert(&app_pod("api-7d9f", "api", terminated("Completed", 0)), NS);

        let failures = run_migration_health_check(&cluster, NS, &RetryPolicy::default())
            .await
            .unwrap();

        assert!(failures.is_empty());
        assert_eq!(cluster.count("logs"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_state_failure_counts() {
        let mut pod = app_pod("db-0", "db", json!({ "running": {} }));
        if let Some(status) = pod
            .status
            .as_mut()
            .and_then(|s| s.init_container_statuses.as_mut())
        {
            status[0].last_state = serde_json::from_value(terminated("OOMKilled", 137)).ok();
        }

        let cluster = FakeCluster::new();
        cluster.insert(&manifests::stateful_set("db", "mongo:7").unwrap(), NS);
        cluster.insert(&pod, NS);

        let failures = find_migration_failures(&cluster, NS, &RetryPolicy::default())
            .await
            .unwrap();

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].reason.as_deref(), Some("OOMKilled"));
        assert_eq!(failures[0].exit_code, 137);
    }

    #[test]
    fn test_completed_with_nonzero_exit_is_failure() {
        let pod = app_pod("p", "p", terminated("Completed", 2));
        assert!(migration_failure(&pod).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pods_of_other_workloads_ignored() {
        let cluster = FakeCluster::new();
        cluster.insert(&manifests::deployment("api", "app:1", &[]), NS);
        cluster.insert(&app_pod("worker-1", "worker", terminated("Error", 1)), NS);

        let failures = run_migration_health_check(&cluster, NS, &RetryPolicy::default())
            .await
            .unwrap();
        assert!(failures.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_error_aborts_scan() {
        let cluster = FakeCluster::new();
        cluster.fail(Op::List, "StatefulSet", 403, "Forbidden", 1);

        let err = run_migration_health_check(&cluster, NS, &RetryPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Api { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_error_aborts_scan() {
        let cluster = FakeCluster::new();
        cluster.insert(&manifests::deployment("api", "app:1", &[]), NS);
        cluster.insert(&app_pod("api-7d9f", "api", terminated("Error", 1)), NS);
        cluster.fail(Op::Logs, "Pod", 500, "InternalError", 1);

        let err = run_migration_health_check(&cluster, NS, &RetryPolicy::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("read logs of pod api-7d9f"));
    }
}
