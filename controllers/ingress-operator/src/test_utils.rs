//! Test utilities for unit testing sync handlers and the admin API
//!
//! Fixtures for the primary resources plus in-memory implementations of the
//! write-path traits that record every call.

use std::collections::BTreeMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use crds::{Function, FunctionIngress, FunctionIngressSpec, FunctionSpec};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ObjectReference, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;
use kube::runtime::events::EventType;
use kube::runtime::reflector::store::Writer;
use kube::runtime::watcher;
use kube::{Error as KubeError, Resource, ResourceExt};

use crate::cache::Store;
use crate::clients::{FunctionApi, IngressApi, WorkloadApi};
use crate::driver::IngressSchema;
use crate::events::EventPublisher;

fn test_meta(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        uid: Some(format!("uid-{name}")),
        resource_version: Some("1".to_string()),
        ..Default::default()
    }
}

/// Helper to create a test FunctionIngress routing `domain` to the function
/// of the same name
pub fn create_test_function_ingress(name: &str, namespace: &str, domain: &str) -> FunctionIngress {
    FunctionIngress {
        metadata: test_meta(name, namespace),
        spec: FunctionIngressSpec {
            domain: domain.to_string(),
            function: name.to_string(),
            ..Default::default()
        },
    }
}

/// Helper to create a test Function running `functions/<name>:latest`
pub fn create_test_function(name: &str, namespace: &str) -> Function {
    Function {
        metadata: test_meta(name, namespace),
        spec: FunctionSpec {
            name: name.to_string(),
            image: format!("functions/{name}:latest"),
            ..Default::default()
        },
    }
}

/// Cache fed directly with watch events, standing in for an informer
pub struct TestCache<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    writer: Mutex<Writer<K>>,
    store: Store<K>,
}

impl<K> TestCache<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    pub fn with_dyntype(dyntype: K::DynamicType) -> Self {
        let writer = Writer::new(dyntype.clone());
        let store = Store::new(writer.as_reader(), dyntype);
        Self {
            writer: Mutex::new(writer),
            store,
        }
    }

    pub fn store(&self) -> Store<K> {
        self.store.clone()
    }

    pub fn apply(&self, obj: K) {
        self.writer.lock().unwrap().apply_watcher_event(&watcher::Event::Apply(obj));
    }

    pub fn remove(&self, obj: &K) {
        self.writer
            .lock()
            .unwrap()
            .apply_watcher_event(&watcher::Event::Delete(obj.clone()));
    }
}

impl<K> TestCache<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    pub fn new() -> Self {
        Self::with_dyntype(())
    }
}

impl TestCache<DynamicObject> {
    /// Cache of `networking.k8s.io/v1` Ingresses
    pub fn ingresses() -> Self {
        Self::with_dyntype(IngressSchema::NetworkingV1.api_resource())
    }
}

fn injected_failure() -> KubeError {
    KubeError::Service("connection refused".into())
}

/// Stamp an object the way the API server would on write
fn persisted(meta: &mut ObjectMeta) {
    let version = meta
        .resource_version
        .as_deref()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    meta.resource_version = Some((version + 1).to_string());
}

/// Records Ingress writes
#[derive(Clone, Default)]
pub struct MockIngressApi {
    created: Arc<Mutex<Vec<DynamicObject>>>,
    replaced: Arc<Mutex<Vec<DynamicObject>>>,
    fail: Arc<AtomicBool>,
}

impl MockIngressApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<DynamicObject> {
        self.created.lock().unwrap().clone()
    }

    pub fn replaced(&self) -> Vec<DynamicObject> {
        self.replaced.lock().unwrap().clone()
    }

    pub fn writes(&self) -> usize {
        self.created.lock().unwrap().len() + self.replaced.lock().unwrap().len()
    }
}

#[async_trait]
impl IngressApi for MockIngressApi {
    async fn create(&self, _namespace: &str, ingress: &DynamicObject) -> Result<DynamicObject, KubeError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(injected_failure());
        }
        let mut stored = ingress.clone();
        persisted(&mut stored.metadata);
        self.created.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn replace(&self, _namespace: &str, ingress: &DynamicObject) -> Result<DynamicObject, KubeError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(injected_failure());
        }
        let mut stored = ingress.clone();
        persisted(&mut stored.metadata);
        self.replaced.lock().unwrap().push(stored.clone());
        Ok(stored)
    }
}

/// Records Deployment and Service writes
#[derive(Clone, Default)]
pub struct MockWorkloadApi {
    created_deployments: Arc<Mutex<Vec<Deployment>>>,
    replaced_deployments: Arc<Mutex<Vec<Deployment>>>,
    created_services: Arc<Mutex<Vec<Service>>>,
    fail: Arc<AtomicBool>,
}

impl MockWorkloadApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn created_deployments(&self) -> Vec<Deployment> {
        self.created_deployments.lock().unwrap().clone()
    }

    pub fn replaced_deployments(&self) -> Vec<Deployment> {
        self.replaced_deployments.lock().unwrap().clone()
    }

    pub fn created_services(&self) -> Vec<Service> {
        self.created_services.lock().unwrap().clone()
    }

    pub fn writes(&self) -> usize {
        self.created_deployments.lock().unwrap().len()
            + self.replaced_deployments.lock().unwrap().len()
            + self.created_services.lock().unwrap().len()
    }
}

#[async_trait]
impl WorkloadApi for MockWorkloadApi {
    async fn create_deployment(&self, _namespace: &str, deployment: &Deployment) -> Result<Deployment, KubeError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(injected_failure());
        }
        let mut stored = deployment.clone();
        persisted(&mut stored.metadata);
        self.created_deployments.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn replace_deployment(&self, _namespace: &str, deployment: &Deployment) -> Result<Deployment, KubeError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(injected_failure());
        }
        let mut stored = deployment.clone();
        persisted(&mut stored.metadata);
        self.replaced_deployments.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn create_service(&self, _namespace: &str, service: &Service) -> Result<Service, KubeError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(injected_failure());
        }
        let mut stored = service.clone();
        persisted(&mut stored.metadata);
        self.created_services.lock().unwrap().push(stored.clone());
        Ok(stored)
    }
}

/// In-memory Function store keyed by `namespace/name`
#[derive(Clone, Default)]
pub struct MockFunctionApi {
    functions: Arc<Mutex<BTreeMap<String, Function>>>,
    fail: Arc<AtomicBool>,
}

impl MockFunctionApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn insert(&self, function: Function) {
        let key = format!("{}/{}", function.namespace().unwrap_or_default(), function.name_any());
        self.functions.lock().unwrap().insert(key, function);
    }

    pub fn stored(&self, namespace: &str, name: &str) -> Option<Function> {
        self.functions.lock().unwrap().get(&format!("{namespace}/{name}")).cloned()
    }

    fn check(&self) -> Result<(), KubeError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(injected_failure());
        }
        Ok(())
    }
}

#[async_trait]
impl FunctionApi for MockFunctionApi {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Function>, KubeError> {
        self.check()?;
        Ok(self.stored(namespace, name))
    }

    async fn create(&self, namespace: &str, function: &Function) -> Result<Function, KubeError> {
        self.check()?;
        let mut stored = function.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        persisted(&mut stored.metadata);
        self.insert(stored.clone());
        Ok(stored)
    }

    async fn replace(&self, namespace: &str, function: &Function) -> Result<Function, KubeError> {
        self.create(namespace, function).await
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<bool, KubeError> {
        self.check()?;
        Ok(self.functions.lock().unwrap().remove(&format!("{namespace}/{name}")).is_some())
    }

    async fn scale(&self, namespace: &str, name: &str, replicas: i32) -> Result<bool, KubeError> {
        self.check()?;
        let mut functions = self.functions.lock().unwrap();
        match functions.get_mut(&format!("{namespace}/{name}")) {
            Some(function) => {
                function.spec.replicas = Some(replicas);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// One published event
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub object: String,
    pub warning: bool,
    pub reason: String,
    pub note: Option<String>,
}

/// Keeps every published event in memory
#[derive(Clone, Default)]
pub struct RecordingEventPublisher {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|event| event.reason).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        _action: &str,
        note: Option<String>,
    ) {
        self.events.lock().unwrap().push(RecordedEvent {
            object: resource_ref.name.clone().unwrap_or_default(),
            warning: matches!(type_, EventType::Warning),
            reason: reason.to_string(),
            note,
        });
    }
}
