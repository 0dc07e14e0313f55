//! CTO Platform preflight CLI.
//!
//! Checks that a cluster can host the platform before installation, and
//! that the installed workloads finished their migrations afterwards.

// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::checks::{CheckCommand, PreflightCommand};
use commands::postflight::PostflightCommand;

/// CTO Platform - cluster readiness checks.
#[derive(Parser, Debug)]
#[command(
    name = "cto-preflight",
    version,
    about = "CTO Platform cluster readiness checks",
    long_about = "Probe a Kubernetes cluster before and after installing the CTO Platform.\n\n\
                  Preflight checks create short-lived deployments, services, pods and RBAC\n\
                  objects, wait for them to become ready and remove them again.\n\n\
                  Postflight checks inspect installed workloads for failed migrations."
)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run every preflight check.
    Preflight(PreflightCommand),

    /// Run a single preflight check.
    ///
    /// With --cleanup-only, remove objects a previous run left behind
    /// without creating anything.
    Check(CheckCommand),

    /// Check installed workloads for failed migrations.
    Postflight(PostflightCommand),

    /// List the available preflight checks.
    ListChecks,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("info,preflight=debug,cto_preflight=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn,preflight=info,cto_preflight=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Preflight(cmd) => cmd.run().await,
        Commands::Check(cmd) => cmd.run().await,
        Commands::Postflight(cmd) => cmd.run().await,
        Commands::ListChecks => {
            preflight::ui::print_checks();
            Ok(())
        }
    }
}
