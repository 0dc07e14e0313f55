//! RBAC permission probes: the installer identity may create roles, role
//! bindings and service accounts in the target namespace.

use crate::client::{Cluster, ProbeObject};
use crate::error::Result;
use crate::manifests;
use crate::resources::finish;

use super::ProbeContext;

pub const ROLE_NAME: &str = "preflight-role";
pub const ROLE_BINDING_NAME: &str = "preflight-rolebinding";
pub const SERVICE_ACCOUNT_NAME: &str = "preflight-serviceaccount";

async fn create_and_remove<C: Cluster, K: ProbeObject>(
    ctx: &ProbeContext<'_, C>,
    name: &str,
    object: K,
    cleanup_only: bool,
) -> Result<()> {
    let res = &ctx.resources;
    if cleanup_only {
        res.delete_quietly::<K>(name).await;
        return Ok(());
    }

    res.clear_leftover::<K>(name).await?;
    let outcome = res.create(&object).await.map(|_| ());
    let teardown = res.teardown::<K>(name).await;
    finish(outcome, teardown)
}

/// A role can be created.
///
/// # Errors
///
/// Returns the creation error, or the teardown error if creation passed.
pub async fn role<C: Cluster>(ctx: &ProbeContext<'_, C>, cleanup_only: bool) -> Result<()> {
    create_and_remove(ctx, ROLE_NAME, manifests::role(ROLE_NAME), cleanup_only).await
}

/// A role binding can be created.
///
/// # Errors
///
/// Returns the creation error, or the teardown error if creation passed.
pub async fn role_binding<C: Cluster>(
    ctx: &ProbeContext<'_, C>,
    cleanup_only: bool,
) -> Result<()> {
    let binding = manifests::role_binding(
        ROLE_BINDING_NAME,
        ROLE_NAME,
        SERVICE_ACCOUNT_NAME,
        ctx.namespace(),
    );
    create_and_remove(ctx, ROLE_BINDING_NAME, binding, cleanup_only).await
}

/// A service account can be created.
///
/// # Errors
///
/// Returns the creation error, or the teardown error if creation passed.
pub async fn service_account<C: Cluster>(
    ctx: &ProbeContext<'_, C>,
    cleanup_only: bool,
) -> Result<()> {
    let account = manifests::service_account(SERVICE_ACCOUNT_NAME);
    create_and_remove(ctx, SERVICE_ACCOUNT_NAME, account, cleanup_only).await
}
