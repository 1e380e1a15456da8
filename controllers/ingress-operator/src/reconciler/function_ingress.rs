//! FunctionIngress to Ingress sync handler.

use std::sync::Arc;

use async_trait::async_trait;
use crds::{FunctionIngress, FunctionIngressSpec, FUNCTION_INGRESS_KIND};
use kube::api::DynamicObject;
use kube::ResourceExt;
use tracing::{debug, info};

use super::{record_result, SyncHandler, SyncOutcome};
use crate::cache::Store;
use crate::driver::IngressDriver;
use crate::error::ReconcileError;
use crate::events::{EventPublisher, MESSAGE_INGRESS_SYNCED};
use crate::keys::split_key;
use crate::snapshot::{Snapshot, FUNCTION_INGRESS_SNAPSHOT};
use crate::synthesizer::ingress::desired_ingress;
use crate::synthesizer::is_controlled_by;

pub struct FunctionIngressSync {
    function_ingresses: Store<FunctionIngress>,
    ingresses: Store<DynamicObject>,
    driver: IngressDriver,
    events: Arc<dyn EventPublisher>,
}

impl std::fmt::Debug for FunctionIngressSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionIngressSync")
            .field("function_ingresses", &self.function_ingresses)
            .field("ingresses", &self.ingresses)
            .field("driver", &self.driver)
            .finish_non_exhaustive()
    }
}

impl FunctionIngressSync {
    pub fn new(
        function_ingresses: Store<FunctionIngress>,
        ingresses: Store<DynamicObject>,
        driver: IngressDriver,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            function_ingresses,
            ingresses,
            driver,
            events,
        }
    }

    async fn converge(&self, fni: &FunctionIngress) -> Result<SyncOutcome, ReconcileError> {
        let name = fni.name_any();
        let namespace = fni.namespace().unwrap_or_default();

        let Some(existing) = self.ingresses.get(&namespace, &name) else {
            let desired = desired_ingress(fni)?;
            self.driver.create(&desired).await?;
            info!("Created Ingress {}/{} ({})", namespace, name, self.driver.schema());
            return Ok(SyncOutcome::Created);
        };

        let previous = Snapshot::<FunctionIngressSpec>::recover(
            existing.metadata.annotations.as_ref(),
            FUNCTION_INGRESS_SNAPSHOT,
        )?;
        let current = Snapshot::capture(fni, &fni.spec);
        if previous.matches(&current) {
            debug!("Ingress {}/{} is up to date", namespace, name);
            return Ok(SyncOutcome::Unchanged);
        }

        if let Some(recorded) = previous.recorded_name().filter(|recorded| *recorded != name) {
            return Err(ReconcileError::Rename {
                previous: recorded.to_string(),
                current: name,
            });
        }

        if !is_controlled_by(&existing.metadata, fni) {
            return Err(ReconcileError::ResourceExists {
                name: format!("{namespace}/{name}"),
                kind: FUNCTION_INGRESS_KIND,
                owner: name,
            });
        }

        let desired = desired_ingress(fni)?;
        self.driver.update(&existing, &desired).await?;
        info!("Updated Ingress {}/{}", namespace, name);
        Ok(SyncOutcome::Updated)
    }
}

#[async_trait]
impl SyncHandler for FunctionIngressSync {
    fn kind(&self) -> &'static str {
        FUNCTION_INGRESS_KIND
    }

    async fn sync(&self, key: &str) -> Result<SyncOutcome, ReconcileError> {
        let (namespace, name) = split_key(key)?;

        let Some(fni) = self.function_ingresses.get(namespace, name) else {
            info!("FunctionIngress '{}' in work queue no longer exists", key);
            return Ok(SyncOutcome::Missing);
        };

        let result = self.converge(&fni).await;
        record_result(self.events.as_ref(), fni.as_ref(), MESSAGE_INGRESS_SYNCED, &result).await;
        result
    }
}
