//! FunctionIngress to Ingress synthesis.
//!
//! Produces a schema-neutral [`DesiredIngress`]; the Ingress drivers turn it
//! into whichever Ingress API version the cluster serves.

use std::collections::BTreeMap;

use crds::{FunctionIngress, FunctionIngressSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::error::ReconcileError;
use crate::snapshot::{user_annotations, Snapshot, FUNCTION_INGRESS_SNAPSHOT};
use super::owner_reference;

/// Shared gateway service every non-bypass route targets
pub const GATEWAY_SERVICE: &str = "gateway";

/// Port exposed by the gateway and by function services
pub const WORKLOAD_PORT: i32 = 8080;

/// Catch-all path whose capture group is fed to the rewrite target
pub const DEFAULT_PATH: &str = "/(.*)";

/// Path used when bypassing the gateway
pub const BYPASS_PATH: &str = "/";

pub const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";
pub const NGINX_REWRITE_ANNOTATION: &str = "nginx.ingress.kubernetes.io/rewrite-target";
pub const SKIPPER_FILTER_ANNOTATION: &str = "zalando.org/skipper-filter";
pub const TRAEFIK_REWRITE_ANNOTATION: &str = "traefik.ingress.kubernetes.io/rewrite-target";
pub const TRAEFIK_RULE_TYPE_ANNOTATION: &str = "traefik.ingress.kubernetes.io/rule-type";
pub const CLUSTER_ISSUER_ANNOTATION: &str = "cert-manager.io/cluster-issuer";
pub const ISSUER_ANNOTATION: &str = "cert-manager.io/issuer";

/// Keys set from the spec that are only present for some specs. An update
/// clears them before applying the new set.
pub const CONDITIONAL_ANNOTATIONS: [&str; 6] = [
    NGINX_REWRITE_ANNOTATION,
    SKIPPER_FILTER_ANNOTATION,
    TRAEFIK_REWRITE_ANNOTATION,
    TRAEFIK_RULE_TYPE_ANNOTATION,
    CLUSTER_ISSUER_ANNOTATION,
    ISSUER_ANNOTATION,
];

const NGINX: &str = "nginx";
const SKIPPER: &str = "skipper";
const TRAEFIK: &str = "traefik";

/// One host/path route to a backend service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingRule {
    pub host: String,
    pub path: String,
    pub service: String,
    pub port: i32,
}

/// One TLS entry: a certificate secret and the hosts it covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsEntry {
    pub secret_name: String,
    pub hosts: Vec<String>,
}

/// Everything the operator controls on a derived Ingress
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredIngress {
    pub name: String,
    pub namespace: String,
    pub annotations: BTreeMap<String, String>,
    pub owner_references: Vec<OwnerReference>,
    pub rules: Vec<RoutingRule>,
    pub tls: Vec<TlsEntry>,
}

/// Ingress class for an `ingressType`; empty means nginx.
pub fn ingress_class(ingress_type: &str) -> &str {
    match ingress_type {
        "" => NGINX,
        other => other,
    }
}

/// Whether the class only understands prefix paths, not regex captures
fn is_prefix_only(class: &str) -> bool {
    class == TRAEFIK
}

/// Resolve the route path: explicit path, then bypass root, then catch-all.
///
/// Prefix-only classes get the capture suffix and trailing slashes trimmed.
pub fn resolve_path(spec: &FunctionIngressSpec) -> String {
    let path = if !spec.path.is_empty() {
        spec.path.as_str()
    } else if spec.bypass_gateway {
        BYPASS_PATH
    } else {
        DEFAULT_PATH
    };

    if !is_prefix_only(ingress_class(&spec.ingress_type)) {
        return path.to_string();
    }
    match path.trim_end_matches(['/', '(', '.', '*', ')']) {
        "" => BYPASS_PATH.to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// How the gateway addresses the function: `name` or `name.namespace`
pub fn function_address(spec: &FunctionIngressSpec) -> String {
    if spec.function_namespace.is_empty() {
        spec.function.clone()
    } else {
        format!("{}.{}", spec.function, spec.function_namespace)
    }
}

pub fn make_rules(spec: &FunctionIngressSpec) -> Vec<RoutingRule> {
    // A Service name cannot carry a namespace, so bypass always targets the
    // function's service by its plain name
    let service = if spec.bypass_gateway {
        spec.function.clone()
    } else {
        GATEWAY_SERVICE.to_string()
    };

    vec![RoutingRule {
        host: spec.domain.clone(),
        path: resolve_path(spec),
        service,
        port: WORKLOAD_PORT,
    }]
}

pub fn make_tls(spec: &FunctionIngressSpec) -> Vec<TlsEntry> {
    if !spec.use_tls() {
        return Vec::new();
    }
    vec![TlsEntry {
        secret_name: format!("{}-cert", spec.domain),
        hosts: vec![spec.domain.clone()],
    }]
}

/// Annotations for the derived Ingress.
///
/// Later writes win: snapshot, class, rewrite rules, TLS issuer, then every
/// annotation set on the FunctionIngress itself.
pub fn make_annotations(fni: &FunctionIngress) -> Result<BTreeMap<String, String>, ReconcileError> {
    let spec = &fni.spec;
    let class = ingress_class(&spec.ingress_type);
    let user = user_annotations(&fni.metadata);

    let mut annotations = BTreeMap::new();
    annotations.insert(
        FUNCTION_INGRESS_SNAPSHOT.to_string(),
        Snapshot::capture(fni, spec).encode()?,
    );
    if !user.contains_key(INGRESS_CLASS_ANNOTATION) {
        annotations.insert(INGRESS_CLASS_ANNOTATION.to_string(), class.to_string());
    }

    if !spec.bypass_gateway {
        let target = function_address(spec);
        match class {
            NGINX => {
                annotations.insert(NGINX_REWRITE_ANNOTATION.to_string(), format!("/function/{target}/$1"));
            }
            SKIPPER => {
                annotations.insert(SKIPPER_FILTER_ANNOTATION.to_string(), format!(r#"setPath("/function/{target}")"#));
            }
            TRAEFIK => {
                annotations.insert(TRAEFIK_REWRITE_ANNOTATION.to_string(), format!("/function/{target}"));
                annotations.insert(TRAEFIK_RULE_TYPE_ANNOTATION.to_string(), "PathPrefix".to_string());
            }
            _ => {}
        }
    }

    if let Some(tls) = spec.tls.as_ref().filter(|tls| tls.enabled) {
        let key = if tls.issuer_ref.is_cluster_scoped() {
            CLUSTER_ISSUER_ANNOTATION
        } else {
            ISSUER_ANNOTATION
        };
        annotations.insert(key.to_string(), tls.issuer_ref.name.clone());
    }

    annotations.extend(user);
    Ok(annotations)
}

/// Full desired state of the Ingress derived from `fni`
pub fn desired_ingress(fni: &FunctionIngress) -> Result<DesiredIngress, ReconcileError> {
    Ok(DesiredIngress {
        name: fni.name_any(),
        namespace: fni.namespace().unwrap_or_default(),
        annotations: make_annotations(fni)?,
        owner_references: owner_reference(fni).into_iter().collect(),
        rules: make_rules(&fni.spec),
        tls: make_tls(&fni.spec),
    })
}
