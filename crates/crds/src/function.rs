//! Function CRD
//!
//! Declares an OpenFaaS function workload. The operator turns each Function
//! into a Deployment and a Service of the same name.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kind of the Function resource.
pub const FUNCTION_KIND: &str = "Function";

/// Label carrying the minimum replica count requested at deploy time.
pub const MIN_SCALE_LABEL: &str = "com.openfaas.scale.min";

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "openfaas.com",
    version = "v1alpha2",
    kind = "Function",
    plural = "functions",
    namespaced,
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSpec {
    /// Function name, also used for the Deployment and Service
    pub name: String,

    /// Container image
    pub image: String,

    /// Desired replica count (defaults to 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Process the watchdog forks for each request (`fprocess`)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub handler: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    /// Environment variables for the function container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<BTreeMap<String, String>>,

    /// Scheduling constraints in `key=value` form
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,

    /// Names of secrets mounted under /var/openfaas/secrets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<FunctionResources>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<FunctionResources>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub read_only_root_filesystem: bool,
}

/// CPU and memory quantities for limits and requests
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResources {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub memory: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cpu: String,
}

impl FunctionSpec {
    /// Desired replica count, falling back to a single replica
    pub fn replica_count(&self) -> i32 {
        self.replicas.unwrap_or(1)
    }
}

/// Minimum replica count requested through the `com.openfaas.scale.min` label.
///
/// Only positive integers are honoured; anything else yields 1.
pub fn min_replicas(labels: Option<&BTreeMap<String, String>>) -> i32 {
    labels
        .and_then(|labels| labels.get(MIN_SCALE_LABEL))
        .and_then(|value| value.trim().parse::<i32>().ok())
        .filter(|replicas| *replicas > 0)
        .unwrap_or(1)
}
