//! Work queue keys.
//!
//! Objects are queued as `namespace/name`, or just `name` for cluster-scoped
//! objects.

use kube::{Resource, ResourceExt};

use crate::error::ReconcileError;

/// Queue key for an object
pub fn object_key<K: Resource>(obj: &K) -> String {
    key_for(obj.namespace().as_deref(), &obj.name_any())
}

/// Queue key for a namespace and name
pub fn key_for(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{ns}/{name}"),
        _ => name.to_string(),
    }
}

/// Split a queue key into namespace and name.
///
/// The namespace is empty for cluster-scoped keys. Keys with more than one
/// separator or an empty name are rejected.
pub fn split_key(key: &str) -> Result<(&str, &str), ReconcileError> {
    let (namespace, name) = match key.split_once('/') {
        Some((namespace, name)) => (namespace, name),
        None => ("", key),
    };
    if name.is_empty() || name.contains('/') {
        return Err(ReconcileError::InvalidKey(key.to_string()));
    }
    Ok((namespace, name))
}
