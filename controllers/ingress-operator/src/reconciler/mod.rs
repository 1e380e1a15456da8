//! Sync handlers.
//!
//! A sync handler converges the objects derived from one primary object,
//! identified by its queue key. Handlers only read from watch caches and are
//! safe to call any number of times for the same key: an object that already
//! matches its primary is left alone.
//!
//! - `function_ingress`: FunctionIngress to Ingress
//! - `function`: Function to Deployment and Service

pub mod function;
pub mod function_ingress;

#[cfg(test)]
mod function_test;

use async_trait::async_trait;
use kube::runtime::events::EventType;
use kube::Resource;
use tracing::{error, info};

use crate::error::ReconcileError;
use crate::events::{object_ref, EventPublisher, ACTION_RECONCILE, REASON_SYNCED};

pub use function::FunctionSync;
pub use function_ingress::FunctionIngressSync;

/// What a successful sync did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// At least one derived object was created
    Created,
    /// Derived objects were rewritten from the current spec
    Updated,
    /// Derived objects already matched; nothing was written
    Unchanged,
    /// The primary object is gone; nothing to do
    Missing,
}

/// Converges the derived objects of one primary object
#[async_trait]
pub trait SyncHandler: Send + Sync {
    /// Primary kind, for logs and metrics
    fn kind(&self) -> &'static str;

    async fn sync(&self, key: &str) -> Result<SyncOutcome, ReconcileError>;
}

/// Record the result of a sync on the primary object.
///
/// Successful syncs get a Normal `Synced` event; failures get a Warning whose
/// reason names the failure and no `Synced` event.
pub(crate) async fn record_result<K>(
    events: &dyn EventPublisher,
    obj: &K,
    message: &str,
    result: &Result<SyncOutcome, ReconcileError>,
) where
    K: Resource<DynamicType = ()>,
{
    let reference = object_ref(obj);
    match result {
        Ok(outcome) => {
            info!(
                kind = %K::kind(&()),
                name = ?reference.name,
                namespace = ?reference.namespace,
                outcome = ?outcome,
                "Synced"
            );
            events
                .publish(&reference, EventType::Normal, REASON_SYNCED, ACTION_RECONCILE, Some(message.to_string()))
                .await;
        }
        Err(e) => {
            error!(
                kind = %K::kind(&()),
                name = ?reference.name,
                namespace = ?reference.namespace,
                error = %e,
                "Sync failed"
            );
            events
                .publish(&reference, EventType::Warning, e.reason(), ACTION_RECONCILE, Some(e.to_string()))
                .await;
        }
    }
}
