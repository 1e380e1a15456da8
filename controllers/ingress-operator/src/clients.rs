//! Kubernetes write paths.
//!
//! Sync handlers and the admin API only write through these traits, so tests
//! can swap in recording mocks. Reads go through the watch caches instead.

use crds::Function;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::api::{ApiResource, DeleteParams, DynamicObject, Patch, PatchParams, PostParams};
use kube::{Api, Client, Error as KubeError, ResourceExt};
use serde_json::json;

/// Ingress writes for the selected schema
#[async_trait::async_trait]
pub trait IngressApi: Send + Sync {
    async fn create(&self, namespace: &str, ingress: &DynamicObject) -> Result<DynamicObject, KubeError>;
    async fn replace(&self, namespace: &str, ingress: &DynamicObject) -> Result<DynamicObject, KubeError>;
}

/// Deployment and Service writes for Functions
#[async_trait::async_trait]
pub trait WorkloadApi: Send + Sync {
    async fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment, KubeError>;
    async fn replace_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment, KubeError>;
    async fn create_service(&self, namespace: &str, service: &Service) -> Result<Service, KubeError>;
}

/// Function CR access for the admin API
#[async_trait::async_trait]
pub trait FunctionApi: Send + Sync {
    /// `None` when the Function does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Function>, KubeError>;
    async fn create(&self, namespace: &str, function: &Function) -> Result<Function, KubeError>;
    async fn replace(&self, namespace: &str, function: &Function) -> Result<Function, KubeError>;
    /// `false` when the Function does not exist
    async fn delete(&self, namespace: &str, name: &str) -> Result<bool, KubeError>;
    /// Set `spec.replicas`; `false` when the Function does not exist
    async fn scale(&self, namespace: &str, name: &str, replicas: i32) -> Result<bool, KubeError>;
}

pub struct KubeIngressApi {
    client: Client,
    resource: ApiResource,
}

impl std::fmt::Debug for KubeIngressApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeIngressApi")
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

impl KubeIngressApi {
    pub fn new(client: Client, resource: ApiResource) -> Self {
        Self { client, resource }
    }

    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.resource)
    }
}

#[async_trait::async_trait]
impl IngressApi for KubeIngressApi {
    async fn create(&self, namespace: &str, ingress: &DynamicObject) -> Result<DynamicObject, KubeError> {
        self.api(namespace).create(&PostParams::default(), ingress).await
    }

    async fn replace(&self, namespace: &str, ingress: &DynamicObject) -> Result<DynamicObject, KubeError> {
        self.api(namespace)
            .replace(&ingress.name_any(), &PostParams::default(), ingress)
            .await
    }
}

pub struct KubeWorkloadApi {
    client: Client,
}

impl std::fmt::Debug for KubeWorkloadApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeWorkloadApi").finish_non_exhaustive()
    }
}

impl KubeWorkloadApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl WorkloadApi for KubeWorkloadApi {
    async fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment, KubeError> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), deployment).await
    }

    async fn replace_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment, KubeError> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        api.replace(&deployment.name_any(), &PostParams::default(), deployment).await
    }

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<Service, KubeError> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), service).await
    }
}

pub struct KubeFunctionApi {
    client: Client,
}

impl std::fmt::Debug for KubeFunctionApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeFunctionApi").finish_non_exhaustive()
    }
}

impl KubeFunctionApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Function> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait::async_trait]
impl FunctionApi for KubeFunctionApi {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Function>, KubeError> {
        self.api(namespace).get_opt(name).await
    }

    async fn create(&self, namespace: &str, function: &Function) -> Result<Function, KubeError> {
        self.api(namespace).create(&PostParams::default(), function).await
    }

    async fn replace(&self, namespace: &str, function: &Function) -> Result<Function, KubeError> {
        self.api(namespace)
            .replace(&function.name_any(), &PostParams::default(), function)
            .await
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<bool, KubeError> {
        match self.api(namespace).delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(true),
            Err(KubeError::Api(e)) if e.code == 404 => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn scale(&self, namespace: &str, name: &str, replicas: i32) -> Result<bool, KubeError> {
        let patch = json!({ "spec": { "replicas": replicas } });
        match self
            .api(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(true),
            Err(KubeError::Api(e)) if e.code == 404 => Ok(false),
            Err(e) => Err(e),
        }
    }
}
