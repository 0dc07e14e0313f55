//! In-memory [`Cluster`] for unit tests.
//!
//! Objects are stored as JSON keyed by kind, namespace and name. Tests can
//! script API failures, mutate objects on create or after a number of reads,
//! keep objects around after delete, and inspect the calls that were made.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::version::Info;
use kube::api::{DeleteParams, ListParams};
use kube::ResourceExt;
use serde_json::Value;

use crate::client::{Cluster, ObjectApi, ProbeObject};
use crate::error::api_error;
use crate::resources::kind_of;

type Key = (String, String, String);
type Hook = Box<dyn Fn(&mut Value) + Send + Sync>;

/// API operations that can be scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Create,
    Get,
    Delete,
    List,
    Logs,
    Version,
}

struct Failure {
    op: Op,
    kind: String,
    code: u16,
    reason: String,
    remaining: u32,
}

struct DelayedUpdate {
    kind: String,
    name: String,
    after: u32,
    seen: u32,
    hook: Option<Hook>,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<Key, Value>,
    create_hooks: HashMap<String, Vec<Hook>>,
    delayed: Vec<DelayedUpdate>,
    failures: Vec<Failure>,
    sticky: HashSet<String>,
    logs: HashMap<(String, String), String>,
    version: Info,
    calls: Vec<String>,
}

impl State {
    fn take_failure(&mut self, op: Op, kind: &str) -> Option<kube::Error> {
        let failure = self
            .failures
            .iter_mut()
            .find(|f| f.op == op && f.kind == kind && f.remaining > 0)?;
        failure.remaining -= 1;
        Some(api_error(failure.code, &failure.reason))
    }
}

#[derive(Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<State>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        let cluster = Self::default();
        cluster.set_version("v1.31.2");
        cluster
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Store an object as if it already existed.
    pub fn insert<K: ProbeObject>(&self, object: &K, namespace: &str) {
        let mut value = serde_json::to_value(object).unwrap();
        value["metadata"]["namespace"] = Value::from(namespace);
        let key = (kind_of::<K>(), namespace.to_string(), object.name_any());
        self.state().objects.insert(key, value);
    }

    /// Mutate every newly created object of `kind`.
    pub fn on_create(&self, kind: &str, hook: impl Fn(&mut Value) + Send + Sync + 'static) {
        self.state()
            .create_hooks
            .entry(kind.to_string())
            .or_default()
            .push(Box::new(hook));
    }

    /// Mutate an object once it has been read `after` times.
    pub fn after_gets(
        &self,
        kind: &str,
        name: &str,
        after: u32,
        hook: impl Fn(&mut Value) + Send + Sync + 'static,
    ) {
        self.state().delayed.push(DelayedUpdate {
            kind: kind.to_string(),
            name: name.to_string(),
            after,
            seen: 0,
            hook: Some(Box::new(hook)),
        });
    }

    /// Fail the next `times` calls of `op` on `kind`.
    pub fn fail(&self, op: Op, kind: &str, code: u16, reason: &str, times: u32) {
        self.state().failures.push(Failure {
            op,
            kind: kind.to_string(),
            code,
            reason: reason.to_string(),
            remaining: times,
        });
    }

    /// Deletes of `kind` succeed but leave the object in place.
    pub fn keep_after_delete(&self, kind: &str) {
        self.state().sticky.insert(kind.to_string());
    }

    pub fn set_logs(&self, namespace: &str, pod: &str, logs: &str) {
        self.state()
            .logs
            .insert((namespace.to_string(), pod.to_string()), logs.to_string());
    }

    pub fn set_version(&self, git_version: &str) {
        self.state().version = Info {
            git_version: git_version.to_string(),
            ..Info::default()
        };
    }

    pub fn exists(&self, kind: &str, namespace: &str, name: &str) -> bool {
        let key = (kind.to_string(), namespace.to_string(), name.to_string());
        self.state().objects.contains_key(&key)
    }

    /// Recorded calls, e.g. `create Deployment/web`.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Number of recorded calls starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }
}

struct FakeObjects<K> {
    state: Arc<Mutex<State>>,
    namespace: String,
    _kind: PhantomData<fn() -> K>,
}

impl<K: ProbeObject> FakeObjects<K> {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn key(&self, name: &str) -> Key {
        (kind_of::<K>(), self.namespace.clone(), name.to_string())
    }
}

fn not_found(kind: &str, name: &str) -> kube::Error {
    let mut err = api_error(404, "NotFound");
    if let kube::Error::Api(ae) = &mut err {
        ae.message = format!("{kind} \"{name}\" not found");
    }
    err
}

fn matches_selector(object: &Value, selector: Option<&str>) -> bool {
    let Some(selector) = selector.filter(|s| !s.is_empty()) else {
        return true;
    };
    let labels = &object["metadata"]["labels"];
    selector.split(',').all(|term| match term.split_once('=') {
        Some((key, value)) => labels[key.trim()].as_str() == Some(value.trim()),
        None => !labels[term.trim()].is_null(),
    })
}

#[async_trait]
impl<K: ProbeObject> ObjectApi<K> for FakeObjects<K> {
    async fn create(&self, object: &K) -> Result<K, kube::Error> {
        let kind = kind_of::<K>();
        let name = object.name_any();
        let mut state = self.state();
        state.calls.push(format!("create {kind}/{name}"));
        if let Some(err) = state.take_failure(Op::Create, &kind) {
            return Err(err);
        }

        let key = self.key(&name);
        if state.objects.contains_key(&key) {
            return Err(api_error(409, "AlreadyExists"));
        }

        let mut value = serde_json::to_value(object).unwrap();
        value["metadata"]["namespace"] = Value::from(self.namespace.as_str());
        if let Some(hooks) = state.create_hooks.get(&kind) {
            for hook in hooks {
                hook(&mut value);
            }
        }
        state.objects.insert(key, value.clone());
        Ok(serde_json::from_value(value).unwrap())
    }

    async fn get(&self, name: &str) -> Result<K, kube::Error> {
        let kind = kind_of::<K>();
        let mut state = self.state();
        state.calls.push(format!("get {kind}/{name}"));
        if let Some(err) = state.take_failure(Op::Get, &kind) {
            return Err(err);
        }

        let key = self.key(name);
        let mut pending = Vec::new();
        for update in &mut state.delayed {
            if update.kind == kind && update.name == name {
                update.seen += 1;
                if update.seen > update.after {
                    if let Some(hook) = update.hook.take() {
                        pending.push(hook);
                    }
                }
            }
        }

        let value = state
            .objects
            .get_mut(&key)
            .ok_or_else(|| not_found(&kind, name))?;
        for hook in pending {
            hook(value);
        }
        Ok(serde_json::from_value(value.clone()).unwrap())
    }

    async fn delete(&self, name: &str, _params: &DeleteParams) -> Result<(), kube::Error> {
        let kind = kind_of::<K>();
        let mut state = self.state();
        state.calls.push(format!("delete {kind}/{name}"));
        if let Some(err) = state.take_failure(Op::Delete, &kind) {
            return Err(err);
        }

        let key = self.key(name);
        if !state.objects.contains_key(&key) {
            return Err(not_found(&kind, name));
        }
        if !state.sticky.contains(&kind) {
            state.objects.remove(&key);
        }
        Ok(())
    }

    async fn list(&self, params: &ListParams) -> Result<Vec<K>, kube::Error> {
        let kind = kind_of::<K>();
        let mut state = self.state();
        state.calls.push(format!("list {kind}"));
        if let Some(err) = state.take_failure(Op::List, &kind) {
            return Err(err);
        }

        Ok(state
            .objects
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && *ns == self.namespace)
            .filter(|(_, value)| matches_selector(value, params.label_selector.as_deref()))
            .map(|(_, value)| serde_json::from_value(value.clone()).unwrap())
            .collect())
    }
}

#[async_trait]
impl Cluster for FakeCluster {
    fn objects<K: ProbeObject>(&self, namespace: &str) -> Box<dyn ObjectApi<K>> {
        Box::new(FakeObjects::<K> {
            state: self.state.clone(),
            namespace: namespace.to_string(),
            _kind: PhantomData,
        })
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
    ) -> Result<String, kube::Error> {
        let mut state = self.state();
        state
            .calls
            .push(format!("logs {pod}/{}", container.unwrap_or("")));
        if let Some(err) = state.take_failure(Op::Logs, "Pod") {
            return Err(err);
        }
        let key = ("Pod".to_string(), namespace.to_string(), pod.to_string());
        if !state.objects.contains_key(&key) {
            return Err(not_found("Pod", pod));
        }
        Ok(state
            .logs
            .get(&(namespace.to_string(), pod.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn server_version(&self) -> Result<Info, kube::Error> {
        let mut state = self.state();
        state.calls.push("version".to_string());
        if let Some(err) = state.take_failure(Op::Version, "") {
            return Err(err);
        }
        Ok(state.version.clone())
    }
}
