//! Probe configuration.
//!
//! Every tunable is injected through [`ProbeConfig`]; nothing is read from
//! process-wide state once a run has started.

use std::time::Duration;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;
use crate::wait::{Waiter, DEFAULT_POLL_INTERVAL, DEFAULT_WAIT_TIMEOUT};

/// Namespace used when none is supplied.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Oldest platform version the probes accept.
pub const DEFAULT_MIN_VERSION: Version = Version::new(1, 11, 0);

/// How the server version is compared against the minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum VersionPolicy {
    /// Pass when the server runs the minimum version or newer.
    #[default]
    AtLeast,
    /// Pass only when the server is strictly newer than the minimum.
    StrictlyNewer,
}

impl VersionPolicy {
    /// Whether `current` satisfies `minimum` under this policy.
    #[must_use]
    pub fn accepts(self, current: &Version, minimum: &Version) -> bool {
        match self {
            Self::AtLeast => current >= minimum,
            Self::StrictlyNewer => current > minimum,
        }
    }
}

impl std::fmt::Display for VersionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AtLeast => write!(f, "at-least"),
            Self::StrictlyNewer => write!(f, "strictly-newer"),
        }
    }
}

impl std::str::FromStr for VersionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "at-least" | ">=" => Ok(Self::AtLeast),
            "strictly-newer" | ">" => Ok(Self::StrictlyNewer),
            _ => Err(format!(
                "Unknown version policy: {s}. Supported: at-least, strictly-newer"
            )),
        }
    }
}

/// Settings shared by every probe in a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeConfig {
    /// Namespace that probe objects are created in.
    pub namespace: String,
    /// Grace period used when deleting pods and deployments.
    pub grace_period: Duration,
    /// Ceiling for each readiness or deletion wait.
    pub wait_timeout: Duration,
    /// Delay between polls while waiting.
    pub poll_interval: Duration,
    /// Retry policy wrapped around individual API calls.
    pub retry: RetryPolicy,
    /// Minimum platform version.
    pub min_version: Version,
    /// Comparison used by the version probe.
    pub version_policy: VersionPolicy,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            grace_period: Duration::ZERO,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry: RetryPolicy::default(),
            min_version: DEFAULT_MIN_VERSION,
            version_policy: VersionPolicy::default(),
        }
    }
}

impl ProbeConfig {
    /// Default settings targeting `namespace`; an empty name means "default".
    #[must_use]
    pub fn for_namespace(namespace: &str) -> Self {
        Self::default().with_namespace(namespace)
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = if namespace.trim().is_empty() {
            DEFAULT_NAMESPACE.to_string()
        } else {
            namespace.trim().to_string()
        };
        self
    }

    #[must_use]
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_version_policy(mut self, policy: VersionPolicy) -> Self {
        self.version_policy = policy;
        self
    }

    /// Waiter built from the configured timeout and poll interval.
    #[must_use]
    pub fn waiter(&self) -> Waiter {
        Waiter::new(self.wait_timeout, self.poll_interval)
    }

    /// Grace period in whole seconds, as the delete API expects it.
    #[must_use]
    pub fn grace_period_seconds(&self) -> u32 {
        u32::try_from(self.grace_period.as_secs()).unwrap_or(u32::MAX)
    }
}
