//! Error types for cluster readiness probes.

use std::time::Duration;

use thiserror::Error;

/// Status reasons the API server attaches to retry-worthy failures.
const TRANSIENT_REASONS: &[&str] = &[
    "Conflict",
    "Gone",
    "ServerTimeout",
    "ServiceUnavailable",
    "Timeout",
    "TooManyRequests",
];

/// Errors produced while probing a cluster.
#[derive(Debug, Error)]
pub enum Error {
    /// Credentials could not be turned into a live client.
    #[error("Failed to connect to cluster: {0}")]
    Connection(String),

    /// A cluster API call failed (after the retry policy gave up, if transient).
    #[error("Failed to {action}: {source}")]
    Api {
        action: String,
        #[source]
        source: kube::Error,
    },

    /// Creating a probe object failed.
    #[error("Failed to create {kind} {name}: {source}")]
    Creation {
        kind: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    /// The requested object does not exist.
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    /// The object never reached its ready state.
    #[error("{kind} {name} took longer than expected to become ready ({}s)", timeout.as_secs())]
    ReadinessTimeout {
        kind: String,
        name: String,
        timeout: Duration,
    },

    /// The object was still present when the deletion wait expired.
    #[error("Deletion of {kind} {name} is taking unusually long (>{}s)", timeout.as_secs())]
    DeletionTimeout {
        kind: String,
        name: String,
        timeout: Duration,
    },

    /// A probe cannot run with the supplied configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A probe ran to completion but its signal was negative.
    #[error("{probe} check failed: {reason}")]
    ProbeFailed { probe: String, reason: String },

    /// The server version could not be parsed.
    #[error("Invalid server version: {0}")]
    Version(String),

    /// Postflight found pods whose migration init container failed.
    #[error("Migration failed in pods: {}", pods.join(", "))]
    MigrationFailed { pods: Vec<String> },

    /// At least one probe in a run failed.
    #[error("one or more checks failed ({failed} of {total})")]
    ChecksFailed { failed: usize, total: usize },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap a raw API error with the action that triggered it.
    pub fn api(action: impl Into<String>, source: kube::Error) -> Self {
        Self::Api {
            action: action.into(),
            source,
        }
    }

    /// Whether this error wraps an API failure worth retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api { source, .. } | Self::Creation { source, .. } => is_transient(source),
            _ => false,
        }
    }

    /// Whether this error means the object is absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Api { source, .. } | Self::Creation { source, .. } => is_not_found(source),
            _ => false,
        }
    }
}

/// Classify a raw API error as transient.
///
/// The status reason decides; the HTTP code is only consulted when the
/// server sent no reason.
#[must_use]
pub fn is_transient(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(ae) if ae.reason.is_empty() => {
            matches!(ae.code, 408 | 409 | 410 | 429 | 503 | 504)
        }
        kube::Error::Api(ae) => TRANSIENT_REASONS.contains(&ae.reason.as_str()),
        _ => false,
    }
}

/// Whether a raw API error is a 404.
#[must_use]
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

#[cfg(test)]
pub(crate) fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{reason} ({code})"),
        reason: reason.to_string(),
        code,
    })
}
