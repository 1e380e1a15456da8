//! Spec snapshots embedded in derived objects.
//!
//! The operator keeps no state of its own. Every derived object carries the
//! spec it was last rendered from as a JSON annotation, and the next sync
//! compares that snapshot with the current primary object to decide whether
//! a write is needed.
//!
//! The snapshot has the same shape as the primary object itself
//! (`{"metadata": {...}, "spec": {...}}`), so snapshots that embedded the
//! whole object decode too; unknown fields are ignored.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;

/// Annotation holding the FunctionIngress snapshot on an Ingress
pub const FUNCTION_INGRESS_SNAPSHOT: &str = "com.openfaas.spec";

/// Annotation holding the Function snapshot on a Deployment
pub const FUNCTION_SNAPSHOT: &str = "com.openfaas.function.spec";

/// Written by `kubectl apply`; never copied or compared
pub const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// Annotations of a primary object that take part in rendering and diffing
pub fn user_annotations(meta: &ObjectMeta) -> BTreeMap<String, String> {
    meta.annotations
        .iter()
        .flatten()
        .filter(|(key, _)| key.as_str() != LAST_APPLIED_ANNOTATION)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Last-applied state of a primary object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "S: Serialize",
    deserialize = "S: DeserializeOwned + Default"
))]
pub struct Snapshot<S> {
    #[serde(default)]
    pub metadata: SnapshotMeta,

    #[serde(default)]
    pub spec: S,
}

impl<S> Snapshot<S>
where
    S: Serialize + DeserializeOwned + Default + PartialEq + Clone,
{
    /// Capture the current state of `obj` with the given spec
    pub fn capture<K: Resource>(obj: &K, spec: &S) -> Self {
        let meta = obj.meta();
        Self {
            metadata: SnapshotMeta {
                name: meta.name.clone().unwrap_or_default(),
                namespace: meta.namespace.clone().unwrap_or_default(),
                annotations: user_annotations(meta),
            },
            spec: spec.clone(),
        }
    }

    pub fn encode(&self) -> Result<String, ReconcileError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Recover the snapshot stored under `annotation`.
    ///
    /// A missing or empty annotation yields the default snapshot, which never
    /// matches a real object and has no name.
    pub fn recover(
        annotations: Option<&BTreeMap<String, String>>,
        annotation: &'static str,
    ) -> Result<Self, ReconcileError> {
        let Some(raw) = annotations.and_then(|a| a.get(annotation)).filter(|raw| !raw.is_empty()) else {
            return Ok(Self::default());
        };
        let mut snapshot: Self = serde_json::from_str(raw)
            .map_err(|source| ReconcileError::CorruptSnapshot { annotation, source })?;
        snapshot.metadata.annotations.remove(LAST_APPLIED_ANNOTATION);
        Ok(snapshot)
    }

    /// Whether `current` renders to the same derived object
    pub fn matches(&self, current: &Self) -> bool {
        self.spec == current.spec && self.metadata.annotations == current.metadata.annotations
    }

    /// Name the snapshot was captured from, if it recorded one
    pub fn recorded_name(&self) -> Option<&str> {
        Some(self.metadata.name.as_str()).filter(|name| !name.is_empty())
    }
}
