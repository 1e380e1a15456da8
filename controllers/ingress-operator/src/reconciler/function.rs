//! Function to Deployment and Service sync handler.

use std::sync::Arc;

use async_trait::async_trait;
use crds::{Function, FunctionSpec, FUNCTION_KIND};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use tracing::{debug, info};

use super::{record_result, SyncHandler, SyncOutcome};
use crate::cache::Store;
use crate::clients::WorkloadApi;
use crate::error::ReconcileError;
use crate::events::{EventPublisher, MESSAGE_FUNCTION_SYNCED};
use crate::keys::split_key;
use crate::snapshot::{Snapshot, FUNCTION_SNAPSHOT};
use crate::synthesizer::is_controlled_by;
use crate::synthesizer::workload::FunctionFactory;

pub struct FunctionSync {
    functions: Store<Function>,
    deployments: Store<Deployment>,
    services: Store<Service>,
    factory: FunctionFactory,
    api: Arc<dyn WorkloadApi>,
    events: Arc<dyn EventPublisher>,
}

impl std::fmt::Debug for FunctionSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionSync")
            .field("functions", &self.functions)
            .field("deployments", &self.deployments)
            .field("services", &self.services)
            .field("factory", &self.factory)
            .finish_non_exhaustive()
    }
}

impl FunctionSync {
    pub fn new(
        functions: Store<Function>,
        deployments: Store<Deployment>,
        services: Store<Service>,
        factory: FunctionFactory,
        api: Arc<dyn WorkloadApi>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            functions,
            deployments,
            services,
            factory,
            api,
            events,
        }
    }

    async fn converge(&self, function: &Function) -> Result<SyncOutcome, ReconcileError> {
        let name = function.name_any();
        let namespace = function.namespace().unwrap_or_default();

        let mut outcome = self.converge_deployment(function, &namespace, &name).await?;

        // The Service only depends on the name, so an existing one is never rewritten
        if self.services.get(&namespace, &name).is_none() {
            let service = self.factory.make_service(function);
            self.api.create_service(&namespace, &service).await?;
            info!("Created Service {}/{}", namespace, name);
            if outcome == SyncOutcome::Unchanged {
                outcome = SyncOutcome::Created;
            }
        }
        Ok(outcome)
    }

    async fn converge_deployment(
        &self,
        function: &Function,
        namespace: &str,
        name: &str,
    ) -> Result<SyncOutcome, ReconcileError> {
        let Some(existing) = self.deployments.get(namespace, name) else {
            let deployment = self.factory.make_deployment(function)?;
            self.api.create_deployment(namespace, &deployment).await?;
            info!("Created Deployment {}/{}", namespace, name);
            return Ok(SyncOutcome::Created);
        };

        let previous =
            Snapshot::<FunctionSpec>::recover(existing.metadata.annotations.as_ref(), FUNCTION_SNAPSHOT)?;
        let current = Snapshot::capture(function, &function.spec);
        if previous.matches(&current) {
            debug!("Deployment {}/{} is up to date", namespace, name);
            return Ok(SyncOutcome::Unchanged);
        }

        if let Some(recorded) = previous.recorded_name().filter(|recorded| *recorded != name) {
            return Err(ReconcileError::Rename {
                previous: recorded.to_string(),
                current: name.to_string(),
            });
        }

        if !is_controlled_by(&existing.metadata, function) {
            return Err(ReconcileError::ResourceExists {
                name: format!("{namespace}/{name}"),
                kind: FUNCTION_KIND,
                owner: name.to_string(),
            });
        }

        let updated = self.factory.update_deployment(&existing, function)?;
        self.api.replace_deployment(namespace, &updated).await?;
        info!("Updated Deployment {}/{}", namespace, name);
        Ok(SyncOutcome::Updated)
    }
}

#[async_trait]
impl SyncHandler for FunctionSync {
    fn kind(&self) -> &'static str {
        FUNCTION_KIND
    }

    async fn sync(&self, key: &str) -> Result<SyncOutcome, ReconcileError> {
        let (namespace, name) = split_key(key)?;

        let Some(function) = self.functions.get(namespace, name) else {
            info!("Function '{}' in work queue no longer exists", key);
            return Ok(SyncOutcome::Missing);
        };

        let result = self.converge(&function).await;
        record_result(self.events.as_ref(), function.as_ref(), MESSAGE_FUNCTION_SYNCED, &result).await;
        result
    }
}
