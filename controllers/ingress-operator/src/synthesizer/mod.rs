//! Desired-state synthesis.
//!
//! Pure functions from a primary object to the fields of the objects derived
//! from it. Nothing in here performs I/O.

pub mod ingress;
pub mod workload;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;

/// Controller owner reference pointing at `owner`.
///
/// Derived objects carry exactly one of these: it drives cascading deletion
/// and lets delete notifications be routed back to the owner. `None` when the
/// owner has not been persisted yet (no UID).
pub fn owner_reference<K>(owner: &K) -> Option<OwnerReference>
where
    K: Resource<DynamicType = ()>,
{
    owner.controller_owner_ref(&()).map(|reference| OwnerReference {
        block_owner_deletion: Some(true),
        ..reference
    })
}

/// The controlling owner reference of an object, if any
pub fn controller_of(meta: &ObjectMeta) -> Option<&OwnerReference> {
    meta.owner_references
        .iter()
        .flatten()
        .find(|owner| owner.controller == Some(true))
}

/// Whether `owner` is the controller of the object described by `meta`.
/// Kind and UID must both match.
pub fn is_controlled_by<K>(meta: &ObjectMeta, owner: &K) -> bool
where
    K: Resource<DynamicType = ()>,
{
    controller_of(meta).is_some_and(|reference| {
        reference.kind == K::kind(&()) && owner.meta().uid.as_deref() == Some(reference.uid.as_str())
    })
}

/// Replace the controller reference in `meta` with `owners`, keeping any
/// non-controller owners
pub fn set_controller(meta: &mut ObjectMeta, owners: &[OwnerReference]) {
    if owners.is_empty() {
        return;
    }
    let references = meta.owner_references.get_or_insert_with(Vec::new);
    references.retain(|reference| reference.controller != Some(true));
    references.extend(owners.iter().cloned());
}
