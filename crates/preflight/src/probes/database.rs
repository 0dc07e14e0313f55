//! External database connectivity probe.

use k8s_openapi::api::core::v1::Pod;
use tracing::{debug, info};

use crate::client::Cluster;
use crate::error::{Error, Result};
use crate::images::{require_image, MONGO};
use crate::manifests;
use crate::resources::finish;

use super::ProbeContext;

pub const DATABASE_POD_NAME: &str = "preflight-db-pod";

/// Environment variable carrying the connection string into the pod.
const URI_ENV: &str = "MONGODB_URI";

/// Printed by the probe pod once the server answered a ping.
pub const SUCCESS_MARKER: &str = "preflight-database-reachable";

fn ping_script() -> String {
    format!(
        "mongosh \"${URI_ENV}\" --quiet --eval 'db.runCommand({{ ping: 1 }}).ok' && echo {SUCCESS_MARKER}"
    )
}

/// The configured database accepts connections from inside the cluster.
///
/// # Errors
///
/// Returns [`Error::Configuration`] when no connection string or image is
/// available, [`Error::ProbeFailed`] when the ping did not succeed, or the
/// underlying creation, wait or API error.
pub async fn database<C: Cluster>(ctx: &ProbeContext<'_, C>, cleanup_only: bool) -> Result<()> {
    let res = &ctx.resources;
    if cleanup_only {
        res.delete_quietly::<Pod>(DATABASE_POD_NAME).await;
        return Ok(());
    }

    let uri = ctx
        .database
        .connection_string()?
        .filter(|uri| !uri.trim().is_empty())
        .ok_or_else(|| Error::Configuration("no database connection string configured".into()))?;
    let image = require_image(ctx.images, MONGO)?;
    let script = ping_script();

    res.clear_leftover::<Pod>(DATABASE_POD_NAME).await?;
    let outcome: Result<()> = async {
        let pod = manifests::pod_with_env(
            DATABASE_POD_NAME,
            &image,
            &["sh", "-c", script.as_str()],
            &[(URI_ENV, uri.as_str())],
        );
        res.create(&pod).await?;
        res.wait_terminated(DATABASE_POD_NAME).await?;

        let logs = res.logs(DATABASE_POD_NAME, None).await?;
        debug!(logs = %logs.trim_end(), "Database probe finished");
        if logs.contains(SUCCESS_MARKER) {
            info!("Database reachable");
            Ok(())
        } else {
            Err(Error::ProbeFailed {
                probe: "database".to_string(),
                reason: format!("database did not answer: {}", logs.trim()),
            })
        }
    }
    .await;

    let teardown = res.teardown::<Pod>(DATABASE_POD_NAME).await;
    finish(outcome, teardown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeConfig;
    use crate::fake::FakeCluster;
    use crate::images::{MockConnectionSource, StaticConnection, StaticImages};
    use crate::retry::RetryPolicy;
    use serde_json::json;
    use std::time::Duration;

    const NS: &str = "probe-ns";

    fn finished_pods() -> FakeCluster {
        let cluster = FakeCluster::new();
        cluster.on_create("Pod", |pod| {
            pod["status"] = json!({ "phase": "Succeeded" });
        });
        cluster
    }

    #[test]
    fn test_ping_script_reads_env() {
        let script = ping_script();
        assert!(script.contains("\"$MONGODB_URI\""));
        assert!(script.contains("{ ping: 1 }"));
        assert!(script.ends_with(SUCCESS_MARKER));
    }

    #[tokio::test(start_paused = true)]
    async fn test_database_reachable() {
        let cluster = finished_pods();
        cluster.set_logs(NS, DATABASE_POD_NAME, &format!("1\n{SUCCESS_MARKER}\n"));
        let config = ProbeConfig::for_namespace(NS);
        let images = StaticImages::default();
        let mut db = MockConnectionSource::new();
        db.expect_connection_string()
            .times(1)
            .returning(|| Ok(Some("mongodb://probe:secret@db:27017".to_string())));
        let ctx = ProbeContext::new(&cluster, &config, &images, &db);

        database(&ctx, false).await.unwrap();
        assert!(!cluster.exists("Pod", NS, DATABASE_POD_NAME));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_ping() {
        let cluster = FakeCluster::new();
        cluster.on_create("Pod", |pod| {
            pod["status"] = json!({ "phase": "Failed" });
        });
        cluster.set_logs(NS, DATABASE_POD_NAME, "MongoServerSelectionError: connection refused\n");
        let config = ProbeConfig::for_namespace(NS).with_retry(RetryPolicy::none());
        let images = StaticImages::default();
        let db = StaticConnection(Some("mongodb://db:27017".into()));
        let ctx = ProbeContext::new(&cluster, &config, &images, &db);

        let err = database(&ctx, false).await.unwrap_err();
        assert!(matches!(err, Error::ProbeFailed { .. }));
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(cluster.count("create Pod/preflight-db-pod"), 1);
        assert!(!cluster.exists("Pod", NS, DATABASE_POD_NAME));
    }

    #[tokio::test(start_paused = true)]
    async fn test_env_carries_uri() {
        let cluster = finished_pods();
        cluster.keep_after_delete("Pod");
        cluster.set_logs(NS, DATABASE_POD_NAME, SUCCESS_MARKER);
        let config = ProbeConfig::for_namespace(NS).with_wait_timeout(Duration::from_secs(10));
        let images = StaticImages::default();
        let db = StaticConnection(Some("mongodb://db:27017".into()));
        let ctx = ProbeContext::new(&cluster, &config, &images, &db);

        // The pod outlives its teardown, so it can be inspected afterwards.
        let _ = database(&ctx, false).await;
        let pod: Pod = ctx.resources.get(DATABASE_POD_NAME).await.unwrap();
        let env = pod.spec.unwrap().containers[0].env.clone().unwrap();
        assert_eq!(env[0].name, "MONGODB_URI");
        assert_eq!(env[0].value.as_deref(), Some("mongodb://db:27017"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_pod_is_replaced() {
        let cluster = finished_pods();
        cluster.insert(&manifests::pod(DATABASE_POD_NAME, "mongo:6", &[]), NS);
        cluster.set_logs(NS, DATABASE_POD_NAME, SUCCESS_MARKER);
        let config = ProbeConfig::for_namespace(NS);
        let images = StaticImages::default();
        let db = StaticConnection(Some("mongodb://db:27017".into()));
        let ctx = ProbeContext::new(&cluster, &config, &images, &db);

        database(&ctx, false).await.unwrap();
        assert_eq!(cluster.count("create Pod/preflight-db-pod"), 1);
        assert_eq!(cluster.count("delete Pod/preflight-db-pod"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_uri_creates_nothing() {
        let cluster = finished_pods();
        let config = ProbeConfig::for_namespace(NS);
        let images = StaticImages::default();
        let db = StaticConnection(None);
        let ctx = ProbeContext::new(&cluster, &config, &images, &db);

        let err = database(&ctx, false).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(cluster.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_decryption_failure_propagates() {
        let cluster = finished_pods();
        let config = ProbeConfig::for_namespace(NS);
        let images = StaticImages::default();
        let mut db = MockConnectionSource::new();
        db.expect_connection_string()
            .returning(|| Err(Error::Configuration("cannot decrypt database secret".into())));
        let ctx = ProbeContext::new(&cluster, &config, &images, &db);

        let err = database(&ctx, false).await.unwrap_err();
        assert!(err.to_string().contains("cannot decrypt"));
    }
}
