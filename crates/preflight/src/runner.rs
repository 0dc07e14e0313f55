//! Sequencing probes and folding their results into a report.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::client::Cluster;
use crate::config::ProbeConfig;
use crate::error::{Error, Result};
use crate::images::{ConnectionSource, ImageResolver};
use crate::migration::run_migration_health_check;
use crate::probes::{self, ProbeContext};
use crate::ui;

/// A preflight check, addressable by a stable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Check {
    Deployment,
    Service,
    Pod,
    Dns,
    Database,
    Version,
    Role,
    RoleBinding,
    ServiceAccount,
}

impl Check {
    /// Every preflight check, in run order.
    pub const ALL: [Self; 9] = [
        Self::Deployment,
        Self::Service,
        Self::Pod,
        Self::Dns,
        Self::Database,
        Self::Version,
        Self::Role,
        Self::RoleBinding,
        Self::ServiceAccount,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Deployment => "deployment",
            Self::Service => "service",
            Self::Pod => "pod",
            Self::Dns => "dns",
            Self::Database => "database",
            Self::Version => "version",
            Self::Role => "role",
            Self::RoleBinding => "role-binding",
            Self::ServiceAccount => "service-account",
        }
    }

    /// One-line description for listings.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Deployment => "a deployment reaches a ready replica",
            Self::Service => "a service can be created and read back",
            Self::Pod => "a pod gets scheduled",
            Self::Dns => "services are reachable by cluster DNS name",
            Self::Database => "the configured database is reachable from a pod",
            Self::Version => "the API server runs a supported version",
            Self::Role => "roles can be created",
            Self::RoleBinding => "role bindings can be created",
            Self::ServiceAccount => "service accounts can be created",
        }
    }

    async fn run<C: Cluster>(self, ctx: &ProbeContext<'_, C>, cleanup_only: bool) -> Result<()> {
        match self {
            Self::Deployment => probes::workload::deployment(ctx, cleanup_only).await,
            Self::Service => probes::workload::service(ctx, cleanup_only).await,
            Self::Pod => probes::workload::pod(ctx, cleanup_only).await,
            Self::Dns => probes::network::dns(ctx, cleanup_only).await,
            Self::Database => probes::database::database(ctx, cleanup_only).await,
            Self::Version => probes::version::version(ctx, cleanup_only).await,
            Self::Role => probes::permissions::role(ctx, cleanup_only).await,
            Self::RoleBinding => probes::permissions::role_binding(ctx, cleanup_only).await,
            Self::ServiceAccount => probes::permissions::service_account(ctx, cleanup_only).await,
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Check {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|check| check.name() == wanted)
            .ok_or_else(|| {
                let known: Vec<_> = Self::ALL.iter().map(|c| c.name()).collect();
                format!("Unknown check: {s}. Supported: {}", known.join(", "))
            })
    }
}

/// Name of the postflight migration check.
pub const MIGRATIONS_CHECK: &str = "migrations";

fn serialize_millis<S>(elapsed: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

/// Outcome of one probe.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub name: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

/// Ordered results of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProbeReport {
    pub results: Vec<ProbeResult>,
}

impl ProbeReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    #[must_use]
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn failed(&self) -> impl Iterator<Item = &ProbeResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    /// The report itself when every probe passed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChecksFailed`] when any probe failed.
    pub fn into_result(self) -> Result<Self> {
        if self.all_passed() {
            Ok(self)
        } else {
            Err(Error::ChecksFailed {
                failed: self.total() - self.passed(),
                total: self.total(),
            })
        }
    }
}

/// Where per-probe lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Output {
    /// PASS/FAIL lines on stdout.
    #[default]
    Text,
    /// The finished report as JSON on stdout, nothing per probe.
    Json,
    /// Nothing printed; the caller renders the report.
    Quiet,
}

/// Runs probes one after another and records their outcomes.
#[derive(Debug, Default)]
pub struct ProbeRunner {
    output: Output,
    report: ProbeReport,
}

impl ProbeRunner {
    #[must_use]
    pub fn new(output: Output) -> Self {
        Self {
            output,
            report: ProbeReport::default(),
        }
    }

    /// Run one probe and record its result. Errors never escape.
    pub async fn record<F>(&mut self, name: &str, probe: F) -> &ProbeResult
    where
        F: Future<Output = Result<()>>,
    {
        info!(probe = name, "Running probe");
        let start = Instant::now();
        let outcome = probe.await;
        let elapsed = start.elapsed();

        let result = match outcome {
            Ok(()) => ProbeResult {
                name: name.to_string(),
                passed: true,
                error: None,
                elapsed,
            },
            Err(e) => {
                warn!(probe = name, error = %e, "Probe failed");
                ProbeResult {
                    name: name.to_string(),
                    passed: false,
                    error: Some(e.to_string()),
                    elapsed,
                }
            }
        };

        if self.output == Output::Text {
            ui::print_probe_result(&result);
        }
        self.report.results.push(result);
        &self.report.results[self.report.results.len() - 1]
    }

    /// Run `checks` in order against `ctx`.
    pub async fn run_checks<C: Cluster>(
        &mut self,
        ctx: &ProbeContext<'_, C>,
        checks: &[Check],
        cleanup_only: bool,
    ) {
        for check in checks {
            self.record(check.name(), check.run(ctx, cleanup_only)).await;
        }
    }

    /// Scan `namespace` for failed migrations, printing each failing pod's
    /// logs under the result line.
    pub async fn run_migrations<C: Cluster>(&mut self, cluster: &C, config: &ProbeConfig) {
        let mut failures = BTreeMap::new();
        self.record(MIGRATIONS_CHECK, async {
            failures = run_migration_health_check(cluster, &config.namespace, &config.retry).await?;
            if failures.is_empty() {
                Ok(())
            } else {
                Err(Error::MigrationFailed {
                    pods: failures.keys().cloned().collect(),
                })
            }
        })
        .await;

        if self.output == Output::Text {
            for (pod, logs) in &failures {
                ui::print_logs(pod, logs);
            }
        }
    }

    #[must_use]
    pub fn finish(self) -> ProbeReport {
        match self.output {
            Output::Text => ui::print_summary(self.report.passed(), self.report.total()),
            Output::Json => ui::print_report_json(&self.report),
            Output::Quiet => {}
        }
        self.report
    }
}

/// Run every preflight check except those in `skip`.
///
/// # Errors
///
/// Returns [`Error::ChecksFailed`] when any check failed.
pub async fn run_all_preflight<C: Cluster>(
    cluster: &C,
    config: &ProbeConfig,
    images: &dyn ImageResolver,
    database: &dyn ConnectionSource,
    skip: &[Check],
    output: Output,
) -> Result<ProbeReport> {
    let checks: Vec<Check> = Check::ALL
        .into_iter()
        .filter(|check| !skip.contains(check))
        .collect();
    let ctx = ProbeContext::new(cluster, config, images, database);
    let mut runner = ProbeRunner::new(output);
    runner.run_checks(&ctx, &checks, false).await;
    runner.finish().into_result()
}

/// Run one preflight check, or only remove its leftovers when
/// `cleanup_only` is set.
///
/// # Errors
///
/// Returns [`Error::ChecksFailed`] when the check failed.
pub async fn run_single_preflight<C: Cluster>(
    cluster: &C,
    config: &ProbeConfig,
    images: &dyn ImageResolver,
    database: &dyn ConnectionSource,
    check: Check,
    cleanup_only: bool,
    output: Output,
) -> Result<ProbeReport> {
    let ctx = ProbeContext::new(cluster, config, images, database);
    let mut runner = ProbeRunner::new(output);
    runner.run_checks(&ctx, &[check], cleanup_only).await;
    runner.finish().into_result()
}

/// Run every postflight check.
///
/// # Errors
///
/// Returns [`Error::ChecksFailed`] when any check failed.
pub async fn run_all_postflight<C: Cluster>(
    cluster: &C,
    config: &ProbeConfig,
    output: Output,
) -> Result<ProbeReport> {
    let mut runner = ProbeRunner::new(output);
    runner.run_migrations(cluster, config).await;
    runner.finish().into_result()
}
