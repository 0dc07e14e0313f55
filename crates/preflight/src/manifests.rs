//! Probe object manifests.
//!
//! Every object carries the `app` label (used as the pod selector) and the
//! managed-by label so leftovers are easy to find with `kubectl get -l`.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, StatefulSet};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, Pod, PodSpec, PodTemplateSpec, ResourceRequirements, Service,
    ServiceAccount, ServicePort, ServiceSpec,
};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde_json::json;

use crate::error::{Error, Result};

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "cto-preflight";
pub const APP_LABEL: &str = "app";

/// Port the probe web server listens on.
pub const HTTP_PORT: i32 = 80;

fn selector(app: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.to_string(), app.to_string())])
}

fn labels(app: &str, extra: &[(&str, &str)]) -> BTreeMap<String, String> {
    let mut labels = selector(app);
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string());
    for (key, value) in extra {
        labels.insert((*key).to_string(), (*value).to_string());
    }
    labels
}

fn metadata(name: &str, labels: BTreeMap<String, String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        labels: Some(labels),
        ..ObjectMeta::default()
    }
}

fn limits() -> ResourceRequirements {
    ResourceRequirements {
        limits: Some(BTreeMap::from([
            ("memory".to_string(), Quantity("64Mi".to_string())),
            ("cpu".to_string(), Quantity("100m".to_string())),
        ])),
        requests: Some(BTreeMap::from([
            ("memory".to_string(), Quantity("32Mi".to_string())),
            ("cpu".to_string(), Quantity("50m".to_string())),
        ])),
        ..ResourceRequirements::default()
    }
}

fn container(name: &str, image: &str, command: &[&str], env: &[(&str, &str)]) -> Container {
    Container {
        name: name.to_string(),
        image: Some(image.to_string()),
        command: (!command.is_empty())
            .then(|| command.iter().map(ToString::to_string).collect()),
        env: (!env.is_empty()).then(|| {
            env.iter()
                .map(|(key, value)| EnvVar {
                    name: (*key).to_string(),
                    value: Some((*value).to_string()),
                    ..EnvVar::default()
                })
                .collect()
        }),
        resources: Some(limits()),
        ..Container::default()
    }
}

/// Single-replica deployment running `image`.
#[must_use]
pub fn deployment(name: &str, image: &str, extra_labels: &[(&str, &str)]) -> Deployment {
    let labels = labels(name, extra_labels);
    Deployment {
        metadata: metadata(name, labels.clone()),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector(name)),
                ..LabelSelector::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container("server", image, &[], &[])],
                    ..PodSpec::default()
                }),
            },
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}

/// ClusterIP service in front of the pods labelled `app=<target>`.
#[must_use]
pub fn service(name: &str, target: &str) -> Service {
    Service {
        metadata: metadata(name, labels(name, &[])),
        spec: Some(ServiceSpec {
            selector: Some(selector(target)),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port: HTTP_PORT,
                target_port: Some(IntOrString::Int(HTTP_PORT)),
                protocol: Some("TCP".to_string()),
                ..ServicePort::default()
            }]),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

/// Run-once pod.
#[must_use]
pub fn pod(name: &str, image: &str, command: &[&str]) -> Pod {
    pod_with_env(name, image, command, &[])
}

/// Run-once pod with environment variables.
#[must_use]
pub fn pod_with_env(name: &str, image: &str, command: &[&str], env: &[(&str, &str)]) -> Pod {
    Pod {
        metadata: metadata(name, labels(name, &[])),
        spec: Some(PodSpec {
            containers: vec![container("probe", image, command, env)],
            restart_policy: Some("Never".to_string()),
            ..PodSpec::default()
        }),
        ..Pod::default()
    }
}

/// Role allowing read access to pods.
#[must_use]
pub fn role(name: &str) -> Role {
    Role {
        metadata: metadata(name, labels(name, &[])),
        rules: Some(vec![PolicyRule {
            api_groups: Some(vec![String::new()]),
            resources: Some(vec!["pods".to_string()]),
            verbs: vec!["get".to_string(), "list".to_string()],
            ..PolicyRule::default()
        }]),
    }
}

/// Binding of `role` to the service account `subject` in `namespace`.
#[must_use]
pub fn role_binding(name: &str, role: &str, subject: &str, namespace: &str) -> RoleBinding {
    RoleBinding {
        metadata: metadata(name, labels(name, &[])),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: role.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: subject.to_string(),
            namespace: Some(namespace.to_string()),
            ..Subject::default()
        }]),
    }
}

#[must_use]
pub fn service_account(name: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: metadata(name, labels(name, &[])),
        ..ServiceAccount::default()
    }
}

/// Single-replica stateful set running `image`.
///
/// # Errors
///
/// Returns [`Error::Configuration`] if the manifest cannot be built.
pub fn stateful_set(name: &str, image: &str) -> Result<StatefulSet> {
    let manifest = json!({
        "apiVersion": "apps/v1",
        "kind": "StatefulSet",
        "metadata": { "name": name, "labels": labels(name, &[]) },
        "spec": {
            "replicas": 1,
            "serviceName": name,
            "selector": { "matchLabels": selector(name) },
            "template": {
                "metadata": { "labels": labels(name, &[]) },
                "spec": { "containers": [container("server", image, &[], &[])] }
            }
        }
    });

    serde_json::from_value(manifest)
        .map_err(|e| Error::Configuration(format!("invalid stateful set manifest: {e}")))
}

#[cfg(test)]
pub(crate) fn with_phase(mut pod: Pod, phase: &str) -> Pod {
    pod.status = Some(k8s_openapi::api::core::v1::PodStatus {
        phase: Some(phase.to_string()),
        ..Default::default()
    });
    pod
}
