//! Minimum platform version probe.

use semver::Version;
use tracing::info;

use crate::client::Cluster;
use crate::error::{Error, Result};

use super::ProbeContext;

/// Parse a server `gitVersion` such as `v1.31.2+k3s1` or `v1.28.9-gke.1000`.
///
/// Vendor pre-release and build suffixes are dropped.
///
/// # Errors
///
/// Returns [`Error::Version`] if the string is not a semantic version.
pub fn parse_server_version(git_version: &str) -> Result<Version> {
    let trimmed = git_version.trim();
    let raw = trimmed.strip_prefix('v').unwrap_or(trimmed);
    let parsed = Version::parse(raw).map_err(|e| Error::Version(format!("{git_version}: {e}")))?;
    Ok(Version::new(parsed.major, parsed.minor, parsed.patch))
}

/// The API server runs a supported version. Read-only; `cleanup_only` is a
/// no-op.
///
/// # Errors
///
/// Returns [`Error::ProbeFailed`] when the version is below the minimum,
/// [`Error::Version`] when it cannot be parsed, or the API error.
pub async fn version<C: Cluster>(ctx: &ProbeContext<'_, C>, cleanup_only: bool) -> Result<()> {
    if cleanup_only {
        return Ok(());
    }

    let config = ctx.resources.config();
    let info = ctx.resources.server_version().await?;
    let current = parse_server_version(&info.git_version)?;

    if config.version_policy.accepts(&current, &config.min_version) {
        info!(version = %current, minimum = %config.min_version, "Server version supported");
        Ok(())
    } else {
        Err(Error::ProbeFailed {
            probe: "version".to_string(),
            reason: format!(
                "server version {current} does not satisfy {} {}",
                config.version_policy, config.min_version
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProbeConfig, VersionPolicy};
    use crate::fake::{FakeCluster, Op};
    use crate::images::{StaticConnection, StaticImages};

    async fn probe(git_version: &str, policy: VersionPolicy) -> Result<()> {
        let cluster = FakeCluster::new();
        cluster.set_version(git_version);
        let config = ProbeConfig::default().with_version_policy(policy);
        let (images, db) = (StaticImages::default(), StaticConnection::default());
        let ctx = ProbeContext::new(&cluster, &config, &images, &db);
        version(&ctx, false).await
    }

    #[test]
    fn test_parse_server_version() {
        assert_eq!(parse_server_version("v1.31.2").unwrap(), Version::new(1, 31, 2));
        assert_eq!(parse_server_version("v1.31.2+k3s1").unwrap(), Version::new(1, 31, 2));
        assert_eq!(parse_server_version("v1.28.9-gke.1000").unwrap(), Version::new(1, 28, 9));
        assert_eq!(parse_server_version("1.11.0").unwrap(), Version::new(1, 11, 0));
        assert!(matches!(parse_server_version("v1.x"), Err(Error::Version(_))));
    }

    #[tokio::test]
    async fn test_newer_version_passes() {
        probe("v1.31.2", VersionPolicy::AtLeast).await.unwrap();
        probe("v1.31.2", VersionPolicy::StrictlyNewer).await.unwrap();
    }

    #[tokio::test]
    async fn test_older_version_fails() {
        let err = probe("v1.10.11", VersionPolicy::AtLeast).await.unwrap_err();
        assert!(matches!(err, Error::ProbeFailed { .. }));
        assert!(err.to_string().contains("1.10.11"));
    }

    #[tokio::test]
    async fn test_exact_minimum_depends_on_policy() {
        probe("v1.11.0", VersionPolicy::AtLeast).await.unwrap();

        let err = probe("v1.11.0", VersionPolicy::StrictlyNewer).await.unwrap_err();
        assert!(matches!(err, Error::ProbeFailed { .. }));
        assert!(err.to_string().contains("strictly-newer"));
    }

    #[tokio::test]
    async fn test_unparsable_version() {
        let err = probe("master-dirty", VersionPolicy::AtLeast).await.unwrap_err();
        assert!(matches!(err, Error::Version(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_version_query_retried() {
        let cluster = FakeCluster::new();
        cluster.fail(Op::Version, "", 429, "TooManyRequests", 2);
        let config = ProbeConfig::default();
        let (images, db) = (StaticImages::default(), StaticConnection::default());
        let ctx = ProbeContext::new(&cluster, &config, &images, &db);

        version(&ctx, false).await.unwrap();
        assert_eq!(cluster.count("version"), 3);
    }
}
