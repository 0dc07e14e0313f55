//! Deployment, service and pod creation probes.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Service};
use tracing::info;

use crate::client::Cluster;
use crate::error::Result;
use crate::images::{require_image, NGINX};
use crate::manifests;
use crate::resources::finish;

use super::ProbeContext;

pub const DEPLOYMENT_NAME: &str = "preflight-deployment";
pub const SERVICE_NAME: &str = "preflight-service";
pub const POD_NAME: &str = "preflight-pod";

/// A deployment reaches at least one ready replica within the wait timeout.
///
/// # Errors
///
/// Returns [`crate::Error::ReadinessTimeout`] when no replica becomes ready,
/// or the underlying creation or API error.
pub async fn deployment<C: Cluster>(ctx: &ProbeContext<'_, C>, cleanup_only: bool) -> Result<()> {
    let res = &ctx.resources;
    if cleanup_only {
        res.delete_quietly::<Deployment>(DEPLOYMENT_NAME).await;
        return Ok(());
    }

    let image = require_image(ctx.images, NGINX)?;
    res.clear_leftover::<Deployment>(DEPLOYMENT_NAME).await?;
    let outcome: Result<()> = async {
        res.create(&manifests::deployment(DEPLOYMENT_NAME, &image, &[])).await?;
        res.wait_ready::<Deployment>(DEPLOYMENT_NAME).await?;
        info!(name = DEPLOYMENT_NAME, "Deployment became ready");
        Ok(())
    }
    .await;

    let teardown = res.teardown::<Deployment>(DEPLOYMENT_NAME).await;
    finish(outcome, teardown)
}

/// A service can be created and read back.
///
/// # Errors
///
/// Returns the creation or lookup error.
pub async fn service<C: Cluster>(ctx: &ProbeContext<'_, C>, cleanup_only: bool) -> Result<()> {
    let res = &ctx.resources;
    if cleanup_only {
        res.delete_quietly::<Service>(SERVICE_NAME).await;
        return Ok(());
    }

    res.clear_leftover::<Service>(SERVICE_NAME).await?;
    let outcome: Result<()> = async {
        res.create(&manifests::service(SERVICE_NAME, SERVICE_NAME)).await?;
        res.get::<Service>(SERVICE_NAME).await?;
        Ok(())
    }
    .await;

    let teardown = res.teardown::<Service>(SERVICE_NAME).await;
    finish(outcome, teardown)
}

/// A pod leaves `Pending` within the wait timeout.
///
/// # Errors
///
/// Returns [`crate::Error::ReadinessTimeout`] when the pod is never
/// scheduled, or the underlying creation or API error.
pub async fn pod<C: Cluster>(ctx: &ProbeContext<'_, C>, cleanup_only: bool) -> Result<()> {
    let res = &ctx.resources;
    if cleanup_only {
        res.delete_quietly::<Pod>(POD_NAME).await;
        return Ok(());
    }

    let image = require_image(ctx.images, NGINX)?;
    res.clear_leftover::<Pod>(POD_NAME).await?;
    let outcome: Result<()> = async {
        res.create(&manifests::pod(POD_NAME, &image, &[])).await?;
        res.wait_ready::<Pod>(POD_NAME).await?;
        Ok(())
    }
    .await;

    let teardown = res.teardown::<Pod>(POD_NAME).await;
    finish(outcome, teardown)
}
