//! Postflight command - did the installed workloads finish migrating?

use anyhow::Result;
use clap::Args;
use preflight::{run_all_postflight, ui, Output, VersionPolicy};
use tracing::info;

use super::ClusterArgs;

/// Check installed workloads for failed migrations.
#[derive(Args, Debug)]
pub struct PostflightCommand {
    #[command(flatten)]
    cluster: ClusterArgs,
}

impl PostflightCommand {
    /// Run the postflight command.
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster is unreachable or a migration failed.
    pub async fn run(&self) -> Result<()> {
        let config = self.cluster.probe_config(VersionPolicy::default());
        info!("🔍 Starting postflight checks...");
        info!("   Namespace: {}", config.namespace);

        let cluster = self.cluster.connect().await?;
        if self.cluster.output() == Output::Text {
            ui::print_section("Postflight");
            ui::print_kv("Namespace", &config.namespace);
            println!();
        }

        run_all_postflight(&cluster, &config, self.cluster.output()).await?;
        Ok(())
    }
}
