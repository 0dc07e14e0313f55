//! In-cluster DNS and service connectivity probe.
//!
//! Stands up a web server behind a service, then runs a one-shot client pod
//! that opens a TCP connection to the service by its cluster DNS name. The
//! client's log output decides the result.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Service};
use tracing::{debug, info};

use crate::client::Cluster;
use crate::error::{Error, Result};
use crate::images::{require_image, NETCAT, NGINX};
use crate::manifests::{self, HTTP_PORT};
use crate::resources::finish;

use super::{first_error, ProbeContext};

pub const DNS_SERVER_NAME: &str = "preflight-dns-server";
pub const DNS_SERVICE_NAME: &str = "preflight-dns-service";
pub const DNS_CLIENT_NAME: &str = "preflight-dns-client";

/// Suffix netcat prints after a successful connection.
const SUCCESS_SUFFIX: &str = "succeeded!";

/// Fully qualified cluster DNS name of a service.
#[must_use]
pub fn service_host(service: &str, namespace: &str) -> String {
    format!("{service}.{namespace}.svc.cluster.local")
}

/// Whether the client output reports a successful connection.
#[must_use]
pub fn connection_succeeded(logs: &str) -> bool {
    logs.trim_end().ends_with(SUCCESS_SUFFIX)
}

/// Services resolve and accept connections by their cluster DNS name.
///
/// # Errors
///
/// Returns [`Error::ProbeFailed`] when the client could not connect,
/// [`Error::Configuration`] when an image is missing, or the underlying
/// creation, wait or API error.
pub async fn dns<C: Cluster>(ctx: &ProbeContext<'_, C>, cleanup_only: bool) -> Result<()> {
    let res = &ctx.resources;
    if cleanup_only {
        res.delete_quietly::<Pod>(DNS_CLIENT_NAME).await;
        res.delete_quietly::<Service>(DNS_SERVICE_NAME).await;
        res.delete_quietly::<Deployment>(DNS_SERVER_NAME).await;
        return Ok(());
    }

    let server_image = require_image(ctx.images, NGINX)?;
    let client_image = require_image(ctx.images, NETCAT)?;
    let host = service_host(DNS_SERVICE_NAME, ctx.namespace());
    let port = HTTP_PORT.to_string();

    res.clear_leftover::<Pod>(DNS_CLIENT_NAME).await?;
    res.clear_leftover::<Service>(DNS_SERVICE_NAME).await?;
    res.clear_leftover::<Deployment>(DNS_SERVER_NAME).await?;

    let outcome: Result<()> = async {
        res.create(&manifests::deployment(DNS_SERVER_NAME, &server_image, &[])).await?;
        res.create(&manifests::service(DNS_SERVICE_NAME, DNS_SERVER_NAME)).await?;
        res.wait_ready::<Deployment>(DNS_SERVER_NAME).await?;

        let command = ["nc", "-vz", "-w", "5", host.as_str(), port.as_str()];
        res.create(&manifests::pod(DNS_CLIENT_NAME, &client_image, &command)).await?;
        res.wait_terminated(DNS_CLIENT_NAME).await?;

        let logs = res.logs(DNS_CLIENT_NAME, None).await?;
        debug!(host = %host, logs = %logs.trim_end(), "DNS client finished");
        if connection_succeeded(&logs) {
            info!(host = %host, "Service reachable by DNS name");
            Ok(())
        } else {
            Err(Error::ProbeFailed {
                probe: "dns".to_string(),
                reason: format!("could not connect to {host}:{port}: {}", logs.trim()),
            })
        }
    }
    .await;

    let teardown = first_error([
        res.teardown::<Pod>(DNS_CLIENT_NAME).await,
        res.teardown::<Service>(DNS_SERVICE_NAME).await,
        res.teardown::<Deployment>(DNS_SERVER_NAME).await,
    ]);
    finish(outcome, teardown)
}
