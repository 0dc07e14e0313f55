//! Create, inspect and tear down probe objects.
//!
//! Every call goes through the configured [`RetryPolicy`](crate::retry::RetryPolicy);
//! every wait goes through the configured [`Waiter`](crate::wait::Waiter). The
//! helpers are generic over the object kind, so deployments, services, pods,
//! stateful sets, roles, role bindings and service accounts share one path.

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::version::Info;
use kube::api::{DeleteParams, ListParams};
use kube::ResourceExt;
use tracing::{debug, info, warn};

use crate::client::{Cluster, ObjectApi, ProbeObject};
use crate::config::ProbeConfig;
use crate::error::{is_not_found, Error, Result};
use crate::wait::Lookup;

/// Pod phases that mean the pod left `Pending`.
const STARTED_PHASES: &[&str] = &["Running", "Succeeded", "Failed"];

/// Pod phases that mean every container has exited.
const TERMINAL_PHASES: &[&str] = &["Succeeded", "Failed"];

/// Kinds deleted with the configured grace period.
const GRACEFUL_KINDS: &[&str] = &["Pod", "Deployment"];

/// Kind-specific readiness used by [`ProbeResources::wait_ready`].
pub trait Readiness {
    fn is_ready(&self) -> bool;
}

impl Readiness for Deployment {
    fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.ready_replicas)
            .is_some_and(|ready| ready > 0)
    }
}

impl Readiness for StatefulSet {
    fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.ready_replicas)
            .is_some_and(|ready| ready > 0)
    }
}

impl Readiness for Pod {
    fn is_ready(&self) -> bool {
        pod_phase(self).is_some_and(|phase| STARTED_PHASES.contains(&phase))
    }
}

/// Current phase of a pod, if reported.
#[must_use]
pub fn pod_phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref().and_then(|s| s.phase.as_deref())
}

/// Whether every container in the pod has exited.
#[must_use]
pub fn pod_terminated(pod: &Pod) -> bool {
    pod_phase(pod).is_some_and(|phase| TERMINAL_PHASES.contains(&phase))
}

/// Kind name of `K`, e.g. `Deployment`.
#[must_use]
pub fn kind_of<K: ProbeObject>() -> String {
    K::kind(&()).to_string()
}

/// Probe object helpers bound to one cluster and one configuration.
pub struct ProbeResources<'a, C: Cluster> {
    cluster: &'a C,
    config: &'a ProbeConfig,
}

impl<'a, C: Cluster> ProbeResources<'a, C> {
    #[must_use]
    pub fn new(cluster: &'a C, config: &'a ProbeConfig) -> Self {
        Self { cluster, config }
    }

    #[must_use]
    pub fn config(&self) -> &ProbeConfig {
        self.config
    }

    fn api<K: ProbeObject>(&self) -> Box<dyn ObjectApi<K>> {
        self.cluster.objects::<K>(&self.config.namespace)
    }

    /// Delete options: foreground propagation, plus the configured grace
    /// period for pods and deployments.
    #[must_use]
    pub fn delete_params<K: ProbeObject>(&self) -> DeleteParams {
        let mut params = DeleteParams::foreground();
        if GRACEFUL_KINDS.contains(&kind_of::<K>().as_str()) {
            params.grace_period_seconds = Some(self.config.grace_period_seconds());
        }
        params
    }

    /// Create `object` in the probe namespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Creation`] once the retry policy gives up.
    pub async fn create<K: ProbeObject>(&self, object: &K) -> Result<K> {
        let kind = kind_of::<K>();
        let name = object.name_any();
        let api = self.api::<K>();
        let api = api.as_ref();
        let (kind_ref, name_ref) = (kind.as_str(), name.as_str());

        info!(kind = %kind, name = %name, namespace = %self.config.namespace, "Creating probe object");

        self.config
            .retry
            .retry(&format!("create {kind} {name}"), move || async move {
                api.create(object).await.map_err(|source| Error::Creation {
                    kind: kind_ref.to_string(),
                    name: name_ref.to_string(),
                    source,
                })
            })
            .await
    }

    /// Fetch an object by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the object is absent, or
    /// [`Error::Api`] for other failures.
    pub async fn get<K: ProbeObject>(&self, name: &str) -> Result<K> {
        let kind = kind_of::<K>();
        let api = self.api::<K>();
        let api = api.as_ref();
        let kind_ref = kind.as_str();

        self.config
            .retry
            .retry(&format!("get {kind} {name}"), move || async move {
                api.get(name).await.map_err(|source| {
                    if is_not_found(&source) {
                        Error::NotFound {
                            kind: kind_ref.to_string(),
                            name: name.to_string(),
                        }
                    } else {
                        Error::api(format!("get {kind_ref} {name}"), source)
                    }
                })
            })
            .await
    }

    /// List objects in the probe namespace matching `label_selector`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Api`] once the retry policy gives up.
    pub async fn list<K: ProbeObject>(&self, label_selector: Option<&str>) -> Result<Vec<K>> {
        let kind = kind_of::<K>();
        let api = self.api::<K>();
        let api = api.as_ref();
        let params = match label_selector {
            Some(selector) => ListParams::default().labels(selector),
            None => ListParams::default(),
        };
        let params = &params;
        let action = format!("list {kind}");
        let action_ref = action.as_str();

        self.config
            .retry
            .retry(action_ref, move || async move {
                api.list(params)
                    .await
                    .map_err(|source| Error::api(action_ref, source))
            })
            .await
    }

    /// Delete an object. Errors, including not-found, propagate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Api`] once the retry policy gives up.
    pub async fn delete<K: ProbeObject>(&self, name: &str) -> Result<()> {
        let kind = kind_of::<K>();
        let api = self.api::<K>();
        let api = api.as_ref();
        let params = self.delete_params::<K>();
        let params = &params;
        let kind_ref = kind.as_str();

        debug!(kind = %kind, name, "Deleting probe object");

        self.config
            .retry
            .retry(&format!("delete {kind} {name}"), move || async move {
                api.delete(name, params)
                    .await
                    .map_err(|source| Error::api(format!("delete {kind_ref} {name}"), source))
            })
            .await
    }

    /// Delete an object, discarding every error.
    ///
    /// Used by cleanup-only runs to clear objects left behind by an
    /// interrupted run.
    pub async fn delete_quietly<K: ProbeObject>(&self, name: &str) {
        if let Err(e) = self.delete::<K>(name).await {
            debug!(kind = %kind_of::<K>(), name, error = %e, "Ignoring cleanup error");
        }
    }

    /// Poll an object until `predicate` holds.
    ///
    /// The waiter hands back the last observed object; if it still does not
    /// satisfy `predicate` the wait is reported as a readiness timeout.
    ///
    /// # Errors
    ///
    /// Returns the first fetch error, or [`Error::ReadinessTimeout`].
    pub async fn wait_for<K, P>(&self, name: &str, predicate: P) -> Result<K>
    where
        K: ProbeObject,
        P: Fn(&K) -> bool,
    {
        let last = self
            .config
            .waiter()
            .poll(move || self.get::<K>(name), &predicate)
            .await?;

        if predicate(&last) {
            Ok(last)
        } else {
            Err(Error::ReadinessTimeout {
                kind: kind_of::<K>(),
                name: name.to_string(),
                timeout: self.config.wait_timeout,
            })
        }
    }

    /// Wait until the object reports ready.
    ///
    /// # Errors
    ///
    /// See [`ProbeResources::wait_for`].
    pub async fn wait_ready<K: ProbeObject + Readiness>(&self, name: &str) -> Result<K> {
        self.wait_for(name, K::is_ready).await
    }

    /// Wait until every container in a pod has exited.
    ///
    /// # Errors
    ///
    /// See [`ProbeResources::wait_for`].
    pub async fn wait_terminated(&self, name: &str) -> Result<Pod> {
        self.wait_for(name, pod_terminated).await
    }

    /// Wait until the object is gone.
    ///
    /// # Errors
    ///
    /// Returns the first fetch error other than not-found, or
    /// [`Error::DeletionTimeout`] if the object outlives the wait.
    pub async fn wait_deleted<K: ProbeObject>(&self, name: &str) -> Result<()> {
        let last = self
            .config
            .waiter()
            .poll_gone(move || async move { Lookup::from_get(self.get::<K>(name).await) })
            .await?;

        match last {
            Lookup::Gone => Ok(()),
            Lookup::Found(_) => Err(Error::DeletionTimeout {
                kind: kind_of::<K>(),
                name: name.to_string(),
                timeout: self.config.wait_timeout,
            }),
        }
    }

    /// Logs of a pod in the probe namespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Api`] once the retry policy gives up.
    pub async fn logs(&self, pod: &str, container: Option<&str>) -> Result<String> {
        let cluster = self.cluster;
        let namespace = self.config.namespace.as_str();

        self.config
            .retry
            .retry(&format!("read logs of pod {pod}"), move || async move {
                cluster
                    .pod_logs(namespace, pod, container)
                    .await
                    .map_err(|source| Error::api(format!("read logs of pod {pod}"), source))
            })
            .await
    }

    /// Version reported by the API server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Api`] once the retry policy gives up.
    pub async fn server_version(&self) -> Result<Info> {
        let cluster = self.cluster;

        self.config
            .retry
            .retry("query server version", move || async move {
                cluster
                    .server_version()
                    .await
                    .map_err(|source| Error::api("query server version", source))
            })
            .await
    }

    /// Delete an object and wait for it to disappear.
    ///
    /// An object that is already gone counts as deleted.
    ///
    /// # Errors
    ///
    /// Returns delete failures other than not-found, or the result of
    /// [`ProbeResources::wait_deleted`].
    pub async fn teardown<K: ProbeObject>(&self, name: &str) -> Result<()> {
        match self.delete::<K>(name).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        }
        self.wait_deleted::<K>(name).await
    }

    /// Remove an object an interrupted run left under `name` so it can be
    /// created again. Nothing to remove is not an error.
    ///
    /// # Errors
    ///
    /// See [`ProbeResources::teardown`].
    pub async fn clear_leftover<K: ProbeObject>(&self, name: &str) -> Result<()> {
        debug!(kind = %kind_of::<K>(), name, "Clearing leftover probe object");
        self.teardown::<K>(name).await
    }
}

/// Combine a probe outcome with the result of tearing its objects down.
///
/// The probe's own error wins; a teardown failure only surfaces when the
/// probe itself passed.
pub(crate) fn finish<T>(outcome: Result<T>, teardown: Result<()>) -> Result<T> {
    match (outcome, teardown) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(cleanup)) => {
            warn!(error = %cleanup, "Teardown failed after probe failure");
            Err(e)
        }
    }
}
