//! Event routing from watch notifications to work queue keys.

use std::fmt::Debug;

use crds::{Function, FunctionIngress};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use workqueue::WorkQueue;

use crate::cache::{EventHandler, Store};
use crate::keys::{key_for, object_key};
use crate::snapshot::user_annotations;
use crate::synthesizer::controller_of;

/// A custom resource a controller reconciles derived objects from
pub trait Primary: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Send + Sync + 'static {
    type Spec: PartialEq;

    fn spec(&self) -> &Self::Spec;

    /// Whether an update changed anything the derived objects are rendered
    /// from. Metadata churn such as resourceVersion bumps does not count.
    fn desired_state_changed(old: &Self, new: &Self) -> bool {
        old.spec() != new.spec() || user_annotations(old.meta()) != user_annotations(new.meta())
    }
}

impl Primary for FunctionIngress {
    type Spec = crds::FunctionIngressSpec;

    fn spec(&self) -> &Self::Spec {
        &self.spec
    }
}

impl Primary for Function {
    type Spec = crds::FunctionSpec;

    fn spec(&self) -> &Self::Spec {
        &self.spec
    }
}

/// Enqueues primary objects on add and on relevant updates.
///
/// Deletes are ignored: the sync handler finds nothing in the cache and
/// garbage collection removes the derived objects.
pub struct PrimaryRouter {
    queue: WorkQueue,
}

impl PrimaryRouter {
    pub fn new(queue: WorkQueue) -> Self {
        Self { queue }
    }
}

impl<P: Primary> EventHandler<P> for PrimaryRouter {
    fn on_add(&self, obj: &P) {
        self.queue.add(object_key(obj));
    }

    fn on_update(&self, old: &P, new: &P) {
        if P::desired_state_changed(old, new) {
            self.queue.add(object_key(new));
        } else {
            debug!("{} {} unchanged, skipping", P::kind(&()), object_key(new));
        }
    }
}

/// Re-enqueues the owner of a derived object when the derived object is
/// deleted, so it is recreated while the owner still exists.
pub struct OwnerRouter<P: Primary> {
    queue: WorkQueue,
    owners: Store<P>,
}

impl<P: Primary> OwnerRouter<P> {
    pub fn new(queue: WorkQueue, owners: Store<P>) -> Self {
        Self { queue, owners }
    }

    fn handle_object<D: Resource>(&self, obj: &D) {
        let Some(owner) = controller_of(obj.meta()) else {
            return;
        };
        if owner.kind != P::kind(&()) {
            return;
        }

        let namespace = obj.namespace().unwrap_or_default();
        if self.owners.get(&namespace, &owner.name).is_none() {
            info!(
                "{} '{}' deleted. Ignoring orphaned object '{}'",
                owner.kind,
                owner.name,
                object_key(obj)
            );
            return;
        }
        self.queue.add(key_for(Some(&namespace), &owner.name));
    }
}

impl<P: Primary, D: Resource> EventHandler<D> for OwnerRouter<P> {
    fn on_delete(&self, obj: &D) {
        self.handle_object(obj);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesizer::owner_reference;
    use crate::test_utils::{create_test_function, create_test_function_ingress, TestCache};
    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::api::DynamicObject;
    use std::collections::BTreeMap;

    async fn next_key(queue: &WorkQueue) -> String {
        let key = queue.get().await.unwrap();
        queue.done(&key);
        key
    }

    fn owned_ingress(owner: &FunctionIngress) -> DynamicObject {
        let mut obj = DynamicObject::new(
            &owner.name_any(),
            &crate::driver::IngressSchema::NetworkingV1.api_resource(),
        )
        .within(&owner.namespace().unwrap());
        obj.metadata.owner_references = owner_reference(owner).map(|o| vec![o]);
        obj
    }

    #[tokio::test]
    async fn test_primary_add_enqueues() {
        let queue = WorkQueue::new("test");
        let router = PrimaryRouter::new(queue.clone());
        let fni = create_test_function_ingress("nodeinfo", "openfaas", "nodeinfo.example.com");

        router.on_add(&fni);
        assert_eq!(next_key(&queue).await, "openfaas/nodeinfo");
    }

    #[tokio::test]
    async fn test_primary_update_ignores_metadata_churn() {
        let queue = WorkQueue::new("test");
        let router = PrimaryRouter::new(queue.clone());
        let old = create_test_function_ingress("nodeinfo", "openfaas", "nodeinfo.example.com");

        let mut bumped = old.clone();
        bumped.metadata.resource_version = Some("2".to_string());
        bumped.metadata.labels = Some(BTreeMap::from([("tier".to_string(), "edge".to_string())]));
        router.on_update(&old, &bumped);
        assert!(queue.is_empty());

        let mut changed = bumped.clone();
        changed.spec.domain = "nodeinfo.example.org".to_string();
        router.on_update(&bumped, &changed);
        assert_eq!(queue.len(), 1);

        let mut annotated = old.clone();
        annotated.metadata.annotations = Some(BTreeMap::from([("team".to_string(), "a".to_string())]));
        assert!(FunctionIngress::desired_state_changed(&old, &annotated));
    }

    #[tokio::test]
    async fn test_primary_delete_is_ignored() {
        let queue = WorkQueue::new("test");
        let router = PrimaryRouter::new(queue.clone());
        let function = create_test_function("nodeinfo", "openfaas-fn");

        EventHandler::<Function>::on_delete(&router, &function);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_owner_delete_requeues_owner() {
        let queue = WorkQueue::new("test");
        let owners = TestCache::new();
        let fni = create_test_function_ingress("nodeinfo", "openfaas", "nodeinfo.example.com");
        owners.apply(fni.clone());
        let router = OwnerRouter::new(queue.clone(), owners.store());

        router.on_delete(&owned_ingress(&fni));
        assert_eq!(next_key(&queue).await, "openfaas/nodeinfo");
    }

    #[tokio::test]
    async fn test_owner_delete_ignores_orphans_and_foreign_owners() {
        let queue = WorkQueue::new("test");
        let owners: TestCache<FunctionIngress> = TestCache::new();
        let router = OwnerRouter::new(queue.clone(), owners.store());
        let fni = create_test_function_ingress("nodeinfo", "openfaas", "nodeinfo.example.com");

        // Owner already gone
        router.on_delete(&owned_ingress(&fni));
        assert!(queue.is_empty());

        // Owned by a different kind
        owners.apply(fni.clone());
        let function = create_test_function("nodeinfo", "openfaas");
        let deployment = Deployment {
            metadata: ObjectMeta {
                name: Some("nodeinfo".to_string()),
                namespace: Some("openfaas".to_string()),
                owner_references: owner_reference(&function).map(|o| vec![o]),
                ..Default::default()
            },
            ..Default::default()
        };
        router.on_delete(&deployment);
        assert!(queue.is_empty());

        // No controller reference at all
        router.on_delete(&Deployment::default());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_owner_add_and_update_are_ignored() {
        let queue = WorkQueue::new("test");
        let owners = TestCache::new();
        let fni = create_test_function_ingress("nodeinfo", "openfaas", "nodeinfo.example.com");
        owners.apply(fni.clone());
        let router = OwnerRouter::new(queue.clone(), owners.store());

        let ingress = owned_ingress(&fni);
        router.on_add(&ingress);
        router.on_update(&ingress, &ingress);
        assert!(queue.is_empty());
    }
}
