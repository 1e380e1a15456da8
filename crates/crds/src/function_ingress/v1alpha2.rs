//! `openfaas.com/v1alpha2` FunctionIngress
//!
//! Kept so the CRD continues to serve clients that still post the older
//! revision.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use super::v1::FunctionIngressTls;

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "openfaas.com",
    version = "v1alpha2",
    kind = "FunctionIngress",
    plural = "functioningresses",
    shortname = "fni",
    namespaced,
    printcolumn = r#"{"name":"Domain","type":"string","jsonPath":".spec.domain"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct FunctionIngressSpec {
    /// Domain such as "api.example.com"
    pub domain: String,

    /// Function such as "nodeinfo"
    pub function: String,

    /// IngressType such as "nginx"
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ingress_type: String,

    /// Enable TLS via cert-manager
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<FunctionIngressTls>,
}
