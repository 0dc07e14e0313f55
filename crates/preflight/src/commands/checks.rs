//! Preflight commands - can this cluster host the platform?

use anyhow::Result;
use clap::Args;
use preflight::{
    run_all_preflight, run_single_preflight, ui, Check, KubeCluster, Output, ProbeConfig,
    StaticConnection, StaticImages, VersionPolicy,
};
use tracing::info;

use super::ClusterArgs;

/// Probe settings shared by `preflight` and `check`.
#[derive(Args, Debug, Clone)]
pub struct ProbeArgs {
    /// Override a probe image, as `name=reference` (nginx, netcat, mongo).
    #[arg(
        long = "image",
        value_name = "NAME=REF",
        env = "PREFLIGHT_IMAGES",
        value_delimiter = ','
    )]
    images: Vec<String>,

    /// Database connection string for the database check.
    #[arg(long, env = "PREFLIGHT_DATABASE_URI", hide_env_values = true)]
    database_uri: Option<String>,

    /// How the server version is compared with the minimum (at-least, strictly-newer).
    #[arg(long, default_value = "at-least")]
    version_policy: VersionPolicy,
}

impl ProbeArgs {
    fn images(&self) -> Result<StaticImages> {
        Ok(StaticImages::default().with_overrides(self.images.iter().map(String::as_str))?)
    }

    fn database(&self) -> StaticConnection {
        StaticConnection(self.database_uri.clone())
    }
}

/// Run every preflight check.
#[derive(Args, Debug)]
pub struct PreflightCommand {
    #[command(flatten)]
    cluster: ClusterArgs,

    #[command(flatten)]
    probe: ProbeArgs,

    /// Skip a check by name (repeatable).
    #[arg(long, value_name = "CHECK")]
    skip: Vec<Check>,
}

impl PreflightCommand {
    /// Run the preflight command.
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster is unreachable or any check failed.
    pub async fn run(&self) -> Result<()> {
        let images = self.probe.images()?;
        let database = self.probe.database();
        let config = self.cluster.probe_config(self.probe.version_policy);
        let cluster = connect(&self.cluster, &config, false).await?;

        run_all_preflight(
            &cluster,
            &config,
            &images,
            &database,
            &self.skip,
            self.cluster.output(),
        )
        .await?;
        Ok(())
    }
}

/// Run a single preflight check.
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// Check to run.
    check: Check,

    /// Only remove objects left behind by an interrupted run.
    #[arg(long)]
    cleanup_only: bool,

    #[command(flatten)]
    cluster: ClusterArgs,

    #[command(flatten)]
    probe: ProbeArgs,
}

impl CheckCommand {
    /// Run the check command.
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster is unreachable or the check failed.
    pub async fn run(&self) -> Result<()> {
        let images = self.probe.images()?;
        let database = self.probe.database();
        let config = self.cluster.probe_config(self.probe.version_policy);
        let cluster = connect(&self.cluster, &config, self.cleanup_only).await?;

        run_single_preflight(
            &cluster,
            &config,
            &images,
            &database,
            self.check,
            self.cleanup_only,
            self.cluster.output(),
        )
        .await?;
        Ok(())
    }
}

async fn connect(
    cluster_args: &ClusterArgs,
    config: &ProbeConfig,
    cleanup_only: bool,
) -> Result<KubeCluster> {
    info!("🔍 Starting cluster preflight checks...");
    info!("   Namespace: {}", config.namespace);
    if cleanup_only {
        info!("   Mode: cleanup only");
    }

    let cluster = cluster_args.connect().await?;
    if cluster_args.output() == Output::Text {
        ui::print_section("Preflight");
        ui::print_kv("Namespace", &config.namespace);
        ui::print_kv("Cluster", &cluster.config().cluster_url.to_string());
        if cleanup_only {
            ui::print_kv("Mode", "cleanup only");
        }
        println!();
    }
    Ok(cluster)
}
