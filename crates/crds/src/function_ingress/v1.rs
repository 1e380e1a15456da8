//! `openfaas.com/v1` FunctionIngress (storage version)

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use crate::references::ObjectReference;

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "openfaas.com",
    version = "v1",
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

    /// Namespace of the function when it is not deployed to the default
    /// function namespace
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub function_namespace: String,

    /// Path such as "/v1/profiles/view/(.*)", or leave empty for default
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,

    /// IngressType such as "nginx"
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ingress_type: String,

    /// Enable TLS via cert-manager
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<FunctionIngressTls>,

    /// When true, route straight to the function's own service instead of
    /// going through the gateway
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bypass_gateway: bool,
}

/// TLS options for a FunctionIngress
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionIngressTls {
    #[serde(default)]
    pub enabled: bool,

    /// cert-manager issuer used to obtain the certificate
    #[serde(default)]
    pub issuer_ref: ObjectReference,
}

impl FunctionIngressSpec {
    /// Whether TLS is requested for this ingress
    pub fn use_tls(&self) -> bool {
        self.tls.as_ref().is_some_and(|tls| tls.enabled)
    }
}
