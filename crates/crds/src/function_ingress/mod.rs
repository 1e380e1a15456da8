//! FunctionIngress CRD
//!
//! A FunctionIngress exposes an OpenFaaS function on a custom domain. Two
//! revisions are served: `v1` (storage) and the older `v1alpha2`, which lacks
//! `path`, `bypassGateway` and `functionNamespace`. Both share the same JSON
//! field names, so a `v1alpha2` document decodes as a `v1` spec with those
//! fields left at their defaults.

pub mod v1;
pub mod v1alpha2;

/// API group shared by all OpenFaaS custom resources.
pub const GROUP: &str = "openfaas.com";

/// Kind of the FunctionIngress resource.
pub const KIND: &str = "FunctionIngress";
