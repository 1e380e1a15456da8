//! Object references embedded in OpenFaaS CRDs
//!
//! cert-manager issuers are referenced by name and kind rather than through a
//! full `ObjectReference`, so the referenced issuer may live in any namespace
//! the ingress controller can read.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kind used by cert-manager for cluster-scoped issuers.
pub const CLUSTER_ISSUER_KIND: &str = "ClusterIssuer";

/// Reference to an object with a given name and kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    /// Name of the referenced object
    #[serde(default)]
    pub name: String,

    /// Kind of the referenced object (e.g. "Issuer", "ClusterIssuer")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
}

impl ObjectReference {
    /// Create a reference to a namespace-scoped cert-manager `Issuer`
    pub fn issuer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: "Issuer".to_string(),
        }
    }

    /// Create a reference to a cluster-scoped cert-manager `ClusterIssuer`
    pub fn cluster_issuer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: CLUSTER_ISSUER_KIND.to_string(),
        }
    }

    /// Whether the reference points at a cluster-scoped issuer
    pub fn is_cluster_scoped(&self) -> bool {
        self.kind == CLUSTER_ISSUER_KIND
    }
}
