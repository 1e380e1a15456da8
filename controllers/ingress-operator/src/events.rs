//! Kubernetes Events recorded on primary objects.
//!
//! Publishing is fire-and-forget: a failed event is logged and never fails
//! the sync that produced it.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};
use tracing::warn;

/// Reporting component shown on every Event
pub const CONTROLLER_AGENT_NAME: &str = "ingress-operator";

/// Reason used when an object converged
pub const REASON_SYNCED: &str = "Synced";

/// Action recorded on every Event
pub const ACTION_RECONCILE: &str = "Reconcile";

pub const MESSAGE_INGRESS_SYNCED: &str = "FunctionIngress synced successfully";
pub const MESSAGE_FUNCTION_SYNCED: &str = "Function synced successfully";

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publishes through `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl std::fmt::Debug for KubeEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeEventPublisher")
            .field("controller", &CONTROLLER_AGENT_NAME)
            .finish_non_exhaustive()
    }
}

impl KubeEventPublisher {
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: CONTROLLER_AGENT_NAME.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(
                reason,
                object = ?resource_ref.name,
                error = %e,
                "Failed to publish Kubernetes event"
            );
        }
    }
}

/// Reference to `obj` for event publishing
pub fn object_ref<K>(obj: &K) -> ObjectReference
where
    K: Resource<DynamicType = ()>,
{
    obj.object_ref(&())
}
