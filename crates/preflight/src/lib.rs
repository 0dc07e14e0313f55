//! CTO Platform cluster readiness probes.
//!
//! Preflight probes provision short-lived objects (deployments, services,
//! pods, roles, role bindings, service accounts) to confirm a cluster can
//! host the platform, then tear them down. The postflight probe inspects an
//! installed namespace for workloads whose migration init container failed.
//!
//! # Example
//!
//! ```ignore
//! use preflight::{
//!     run_all_preflight, ClusterConnection, Output, ProbeConfig, StaticConnection, StaticImages,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cluster = ClusterConnection::in_cluster().connect().await?;
//!     let config = ProbeConfig::for_namespace("cto");
//!     let report = run_all_preflight(
//!         &cluster,
//!         &config,
//!         &StaticImages::default(),
//!         &StaticConnection(None),
//!         &[],
//!         Output::Text,
//!     )
//!     .await?;
//!     println!("{}/{} checks passed", report.passed(), report.total());
//!     Ok(())
//! }
//! ```

// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]

pub mod client;
pub mod config;
pub mod error;
pub mod images;
pub mod manifests;
pub mod migration;
pub mod probes;
pub mod resources;
pub mod retry;
pub mod runner;
pub mod ui;
pub mod wait;

#[cfg(test)]
mod fake;

// Re-export commonly used types at the crate root
pub use client::{Cluster, ClusterConnection, KubeCluster};
pub use config::{ProbeConfig, VersionPolicy};
pub use error::{Error, Result};
pub use images::{ConnectionSource, ImageResolver, StaticConnection, StaticImages};
pub use migration::{run_migration_health_check, InitContainerFailure};
pub use retry::RetryPolicy;
pub use runner::{
    run_all_postflight, run_all_preflight, run_single_preflight, Check, Output, ProbeReport,
    ProbeResult, ProbeRunner,
};
