//! Controller wiring.
//!
//! Owns the startup sequence: one Kubernetes client, one event publisher and
//! one Ingress schema selected for the process lifetime. `run` starts the
//! informers for every primary and derived kind plus cluster events, waits
//! for the caches to sync, then starts the worker pools and the admin API.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use crds::{Function, FunctionIngress, FUNCTION_INGRESS_KIND, FUNCTION_KIND};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Event, Service};
use kube::api::DynamicObject;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use workqueue::WorkQueue;

use crate::cache::Informer;
use crate::clients::{KubeFunctionApi, KubeIngressApi, KubeWorkloadApi};
use crate::config::Config;
use crate::driver::{self, IngressDriver, IngressSchema};
use crate::error::ControllerError;
use crate::event_log::AbnormalEventLogger;
use crate::events::{EventPublisher, KubeEventPublisher};
use crate::metrics::Metrics;
use crate::reconciler::{FunctionIngressSync, FunctionSync};
use crate::router::{OwnerRouter, PrimaryRouter};
use crate::server::{self, AppState};
use crate::synthesizer::workload::FunctionFactory;
use crate::worker::WorkerPool;

type Tasks = JoinSet<Result<(), ControllerError>>;

/// Both control loops plus the admin API.
pub struct Controller {
    config: Config,
    client: Client,
    schema: IngressSchema,
    events: Arc<dyn EventPublisher>,
    metrics: Metrics,
}

impl Controller {
    /// Connect to the cluster and select the Ingress schema.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Initializing ingress operator");

        let client = Client::try_default().await?;

        let schema = match config.ingress_schema {
            Some(schema) => {
                info!("Using configured Ingress API {}", schema);
                schema
            }
            None => driver::discover(&client).await?,
        };

        let events: Arc<dyn EventPublisher> = Arc::new(KubeEventPublisher::new(client.clone()));
        let metrics = Metrics::new()?;

        Ok(Self {
            config,
            client,
            schema,
            events,
            metrics,
        })
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        match self.config.watch_namespace.as_deref() {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    fn ingress_api(&self) -> Api<DynamicObject> {
        let resource = self.schema.api_resource();
        match self.config.watch_namespace.as_deref() {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }

    /// Run until `token` is cancelled or a long-running task fails.
    pub async fn run(self, token: CancellationToken) -> Result<(), ControllerError> {
        info!(
            "Watching {}",
            self.config.watch_namespace.as_deref().unwrap_or("all namespaces")
        );

        let ingress_queue = WorkQueue::new(FUNCTION_INGRESS_KIND);
        let function_queue = WorkQueue::new(FUNCTION_KIND);

        let function_ingress_informer: Informer<FunctionIngress> = Informer::new(FUNCTION_INGRESS_KIND);
        let ingress_informer: Informer<DynamicObject> = Informer::new_with("Ingress", self.schema.api_resource());
        let function_informer: Informer<Function> = Informer::new(FUNCTION_KIND);
        let deployment_informer: Informer<Deployment> = Informer::new("Deployment");
        let service_informer: Informer<Service> = Informer::new("Service");

        let function_ingresses = function_ingress_informer.store();
        let ingresses = ingress_informer.store();
        let functions = function_informer.store();
        let deployments = deployment_informer.store();
        let services = service_informer.store();

        let ingress_owners = Arc::new(OwnerRouter::new(ingress_queue.clone(), function_ingresses.clone()));
        let function_owners = Arc::new(OwnerRouter::new(function_queue.clone(), functions.clone()));

        let mut tasks: Tasks = JoinSet::new();

        spawn_informer(
            &mut tasks,
            &token,
            function_ingress_informer.with_handler(Arc::new(PrimaryRouter::new(ingress_queue.clone()))),
            self.api(),
        );
        spawn_informer(
            &mut tasks,
            &token,
            ingress_informer.with_handler(ingress_owners),
            self.ingress_api(),
        );
        spawn_informer(
            &mut tasks,
            &token,
            function_informer.with_handler(Arc::new(PrimaryRouter::new(function_queue.clone()))),
            self.api(),
        );
        spawn_informer(
            &mut tasks,
            &token,
            deployment_informer.with_handler(function_owners.clone()),
            self.api(),
        );
        spawn_informer(
            &mut tasks,
            &token,
            service_informer.with_handler(function_owners),
            self.api(),
        );
        // Logging only; not part of the sync barrier
        spawn_informer(
            &mut tasks,
            &token,
            Informer::<Event>::new("Event").with_handler(Arc::new(AbnormalEventLogger::new())),
            self.api(),
        );

        info!("Waiting for informer caches to sync");
        let synced = async {
            tokio::try_join!(
                function_ingresses.wait_until_ready(),
                ingresses.wait_until_ready(),
                functions.wait_until_ready(),
                deployments.wait_until_ready(),
                services.wait_until_ready(),
            )
        };
        tokio::select! {
            synced = synced => match synced {
                Ok(_) => info!("Informer caches synced"),
                Err(e) => {
                    error!("Informer stopped before its cache synced: {}", e);
                    token.cancel();
                    return drain(tasks, &token).await;
                }
            },
            () = token.cancelled() => {
                info!("Shutdown requested before caches synced");
                return drain(tasks, &token).await;
            }
        }

        let driver = IngressDriver::new(
            self.schema,
            Arc::new(KubeIngressApi::new(self.client.clone(), self.schema.api_resource())),
        );
        let ingress_sync = FunctionIngressSync::new(
            function_ingresses,
            ingresses,
            driver,
            self.events.clone(),
        );
        let function_sync = FunctionSync::new(
            functions.clone(),
            deployments.clone(),
            services,
            FunctionFactory::new(self.config.deployment.clone()),
            Arc::new(KubeWorkloadApi::new(self.client.clone())),
            self.events.clone(),
        );

        let workers = self.config.workers;
        for pool in [
            WorkerPool::new(ingress_queue, Arc::new(ingress_sync), self.metrics.clone()),
            WorkerPool::new(function_queue, Arc::new(function_sync), self.metrics.clone()),
        ] {
            let token = token.clone();
            tasks.spawn(async move {
                pool.run(workers, token).await;
                Ok(())
            });
        }

        let state = Arc::new(AppState {
            namespace: self.config.function_namespace().to_string(),
            functions,
            deployments,
            api: Arc::new(KubeFunctionApi::new(self.client.clone())),
            metrics: self.metrics.clone(),
        });
        tasks.spawn(server::serve(state, self.config.server, token.clone()));

        info!("Ingress operator started");
        drain(tasks, &token).await
    }
}

fn spawn_informer<K>(tasks: &mut Tasks, token: &CancellationToken, informer: Informer<K>, api: Api<K>)
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Eq + Hash + Clone + Send + Sync,
{
    tasks.spawn(informer.run(api, token.clone()));
}

/// Wait for every task. The first failure cancels the rest and is returned.
async fn drain(mut tasks: Tasks, token: &CancellationToken) -> Result<(), ControllerError> {
    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        let result = joined.unwrap_or_else(|e| Err(ControllerError::Watch(format!("task panicked: {e}"))));
        if let Err(e) = result {
            error!("Controller task failed: {}", e);
            token.cancel();
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}
