//! CLI subcommands.

pub mod checks;
pub mod postflight;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use preflight::{ClusterConnection, KubeCluster, Output, ProbeConfig, VersionPolicy};
use tracing::info;

/// Cluster connection and probe settings shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct ClusterArgs {
    /// Path to kubeconfig file. Uses the in-cluster service account when unset.
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use instead of the current one.
    #[arg(long, env = "PREFLIGHT_CONTEXT")]
    context: Option<String>,

    /// Namespace probe objects are created in.
    #[arg(short, long, env = "PREFLIGHT_NAMESPACE", default_value = "default")]
    namespace: String,

    /// Ceiling for each readiness or deletion wait, in seconds.
    #[arg(long, env = "PREFLIGHT_TIMEOUT_SECS", default_value = "120")]
    timeout_secs: u64,

    /// Output report as JSON.
    #[arg(long, default_value = "false")]
    json: bool,
}

impl ClusterArgs {
    /// Connect with the configured credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the kubeconfig cannot be read or the cluster
    /// connection cannot be established.
    pub async fn connect(&self) -> Result<KubeCluster> {
        let connection = match &self.kubeconfig {
            Some(path) => {
                info!("   Kubeconfig: {}", path.display());
                let bytes = std::fs::read(path)
                    .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
                ClusterConnection::from_kubeconfig(bytes, self.context.clone())
            }
            None => {
                info!("   Kubeconfig: <in-cluster>");
                ClusterConnection::in_cluster()
            }
        };

        Ok(connection.connect().await?)
    }

    #[must_use]
    pub fn probe_config(&self, version_policy: VersionPolicy) -> ProbeConfig {
        ProbeConfig::for_namespace(&self.namespace)
            .with_wait_timeout(Duration::from_secs(self.timeout_secs))
            .with_version_policy(version_policy)
    }

    #[must_use]
    pub fn output(&self) -> Output {
        if self.json {
            Output::Json
        } else {
            Output::Text
        }
    }
}
