//! Readiness probes.
//!
//! Each probe provisions its own short-lived objects under fixed names,
//! inspects them and tears them down on every exit path. Objects an
//! interrupted earlier run left under those names are removed first. When
//! called with `cleanup_only` a probe skips creation and waiting and only
//! issues that removal.

pub mod database;
pub mod network;
pub mod permissions;
pub mod version;
pub mod workload;

use crate::client::Cluster;
use crate::config::ProbeConfig;
use crate::error::Result;
use crate::images::{ConnectionSource, ImageResolver};
use crate::resources::ProbeResources;

/// Everything a probe needs: object helpers plus the external collaborators.
pub struct ProbeContext<'a, C: Cluster> {
    pub resources: ProbeResources<'a, C>,
    pub images: &'a dyn ImageResolver,
    pub database: &'a dyn ConnectionSource,
}

impl<'a, C: Cluster> ProbeContext<'a, C> {
    #[must_use]
    pub fn new(
        cluster: &'a C,
        config: &'a ProbeConfig,
        images: &'a dyn ImageResolver,
        database: &'a dyn ConnectionSource,
    ) -> Self {
        Self {
            resources: ProbeResources::new(cluster, config),
            images,
            database,
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.resources.config().namespace
    }
}

/// First error out of several teardown steps.
pub(crate) fn first_error(results: impl IntoIterator<Item = Result<()>>) -> Result<()> {
    results.into_iter().find(Result::is_err).unwrap_or(Ok(()))
}
