//! Cluster connection and the API surface probes talk to.
//!
//! Probes never hold a raw [`kube::Client`]. They go through the [`Cluster`]
//! trait so a run can be pointed at a live API server ([`KubeCluster`]) or
//! at an in-memory stand-in.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::version::Info;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, LogParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Namespaced object kinds the probes create and inspect.
pub trait ProbeObject:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + DeserializeOwned
    + Serialize
    + Debug
    + Send
    + Sync
    + 'static
{
}

impl<K> ProbeObject for K where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Serialize
        + Debug
        + Send
        + Sync
        + 'static
{
}

/// Typed calls against one kind of object in one namespace.
#[async_trait]
pub trait ObjectApi<K: ProbeObject>: Send + Sync {
    async fn create(&self, object: &K) -> std::result::Result<K, kube::Error>;

    async fn get(&self, name: &str) -> std::result::Result<K, kube::Error>;

    async fn delete(&self, name: &str, params: &DeleteParams)
        -> std::result::Result<(), kube::Error>;

    async fn list(&self, params: &ListParams) -> std::result::Result<Vec<K>, kube::Error>;
}

#[async_trait]
impl<K: ProbeObject> ObjectApi<K> for Api<K> {
    async fn create(&self, object: &K) -> std::result::Result<K, kube::Error> {
        Api::create(self, &PostParams::default(), object).await
    }

    async fn get(&self, name: &str) -> std::result::Result<K, kube::Error> {
        Api::get(self, name).await
    }

    async fn delete(
        &self,
        name: &str,
        params: &DeleteParams,
    ) -> std::result::Result<(), kube::Error> {
        Api::delete(self, name, params).await.map(|_| ())
    }

    async fn list(&self, params: &ListParams) -> std::result::Result<Vec<K>, kube::Error> {
        Ok(Api::list(self, params).await?.items)
    }
}

/// Everything the probes need from a cluster.
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Object API for kind `K` in `namespace`.
    fn objects<K: ProbeObject>(&self, namespace: &str) -> Box<dyn ObjectApi<K>>;

    /// Logs of a pod, optionally narrowed to one container.
    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
    ) -> std::result::Result<String, kube::Error>;

    /// Version reported by the API server.
    async fn server_version(&self) -> std::result::Result<Info, kube::Error>;
}

/// Raw connection credentials.
///
/// Empty credentials mean "use the in-cluster service account". Otherwise
/// the bytes are a kubeconfig document, optionally narrowed to `context`.
#[derive(Clone, Default)]
pub struct ClusterConnection {
    pub credentials: Vec<u8>,
    pub context: Option<String>,
}

impl Debug for ClusterConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterConnection")
            .field("credentials", &format_args!("<{} bytes>", self.credentials.len()))
            .field("context", &self.context)
            .finish()
    }
}

impl ClusterConnection {
    /// Connect with the ambient in-cluster identity.
    #[must_use]
    pub fn in_cluster() -> Self {
        Self::default()
    }

    /// Connect with a kubeconfig document.
    #[must_use]
    pub fn from_kubeconfig(credentials: impl Into<Vec<u8>>, context: Option<String>) -> Self {
        Self {
            credentials: credentials.into(),
            context: context.filter(|c| !c.trim().is_empty()),
        }
    }

    /// Whether the ambient in-cluster identity will be used.
    #[must_use]
    pub fn is_in_cluster(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Resolve the connection configuration without building a client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the kubeconfig cannot be parsed, the
    /// context does not exist, or no in-cluster identity is available.
    pub async fn resolve_config(&self) -> Result<Config> {
        if self.is_in_cluster() {
            debug!("Using in-cluster service account");
            return Config::incluster().map_err(|e| {
                Error::Connection(format!("no in-cluster identity available: {e}"))
            });
        }

        let yaml = std::str::from_utf8(&self.credentials)
            .map_err(|e| Error::Connection(format!("kubeconfig is not valid UTF-8: {e}")))?;
        let kubeconfig = Kubeconfig::from_yaml(yaml)
            .map_err(|e| Error::Connection(format!("failed to parse kubeconfig: {e}")))?;

        let options = KubeConfigOptions {
            context: self.context.clone(),
            ..KubeConfigOptions::default()
        };

        Config::from_custom_kubeconfig(kubeconfig, &options)
            .await
            .map_err(|e| Error::Connection(format!("failed to load kubeconfig: {e}")))
    }

    /// Build a live client for these credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] when the configuration cannot be
    /// resolved or the client cannot be constructed.
    pub async fn connect(&self) -> Result<KubeCluster> {
        let config = self.resolve_config().await?;
        let client = Client::try_from(config.clone())
            .map_err(|e| Error::Connection(format!("failed to create client: {e}")))?;

        info!(
            cluster_url = %config.cluster_url,
            namespace = %config.default_namespace,
            context = self.context.as_deref().unwrap_or("<current>"),
            "Connected to cluster"
        );

        Ok(KubeCluster { client, config })
    }
}

/// [`Cluster`] backed by a live API server.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    config: Config,
}

impl KubeCluster {
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Connection configuration the client was built from.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[async_trait]
impl Cluster for KubeCluster {
    fn objects<K: ProbeObject>(&self, namespace: &str) -> Box<dyn ObjectApi<K>> {
        Box::new(Api::<K>::namespaced(self.client.clone(), namespace))
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
    ) -> std::result::Result<String, kube::Error> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            container: container.map(ToString::to_string),
            ..LogParams::default()
        };
        pods.logs(pod, &params).await
    }

    async fn server_version(&self) -> std::result::Result<Info, kube::Error> {
        self.client.apiserver_version().await
    }
}
