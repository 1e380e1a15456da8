//! Ingress API schema drivers.
//!
//! Clusters serve Ingress under different API groups depending on their
//! version. The schema is selected once at startup; after that every Ingress
//! is rendered, read and written as a `DynamicObject` of that schema.

use std::sync::Arc;

use k8s_openapi::api::networking::v1 as networking;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use kube::Client;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::clients::IngressApi;
use crate::error::{ControllerError, ReconcileError};
use crate::synthesizer::ingress::{DesiredIngress, RoutingRule, TlsEntry, CONDITIONAL_ANNOTATIONS};
use crate::synthesizer::set_controller;

const INGRESS_KIND: &str = "Ingress";
const INGRESS_PLURAL: &str = "ingresses";
const PATH_TYPE: &str = "ImplementationSpecific";

/// Ingress API versions, newest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IngressSchema {
    /// `networking.k8s.io/v1`
    NetworkingV1,
    /// `networking.k8s.io/v1beta1`
    NetworkingV1beta1,
    /// `extensions/v1beta1`
    ExtensionsV1beta1,
}

impl IngressSchema {
    /// Discovery order
    pub const ALL: [Self; 3] = [Self::NetworkingV1, Self::NetworkingV1beta1, Self::ExtensionsV1beta1];

    pub fn api_version(self) -> &'static str {
        match self {
            Self::NetworkingV1 => "networking.k8s.io/v1",
            Self::NetworkingV1beta1 => "networking.k8s.io/v1beta1",
            Self::ExtensionsV1beta1 => "extensions/v1beta1",
        }
    }

    pub fn from_api_version(api_version: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|schema| schema.api_version() == api_version.trim())
    }

    pub fn api_resource(self) -> ApiResource {
        let (group, version) = self
            .api_version()
            .split_once('/')
            .unwrap_or(("", self.api_version()));
        let gvk = GroupVersionKind::gvk(group, version, INGRESS_KIND);
        ApiResource::from_gvk_with_plural(&gvk, INGRESS_PLURAL)
    }

    /// Render the desired Ingress as a new object
    pub fn build(self, desired: &DesiredIngress) -> Result<DynamicObject, ReconcileError> {
        let mut obj = DynamicObject::new(&desired.name, &self.api_resource()).within(&desired.namespace);
        obj.metadata.annotations = Some(desired.annotations.clone());
        if !desired.owner_references.is_empty() {
            obj.metadata.owner_references = Some(desired.owner_references.clone());
        }

        let mut spec = json!({ "rules": self.render_rules(&desired.rules)? });
        if !desired.tls.is_empty() {
            spec["tls"] = self.render_tls(&desired.tls)?;
        }
        obj.data = json!({ "spec": spec });
        Ok(obj)
    }

    /// `existing` converged onto `desired`.
    ///
    /// Annotations are merged so keys set by other controllers survive.
    /// Rewrite and issuer keys the new spec no longer produces are dropped.
    /// Rules and TLS are replaced wholesale and the controller reference is
    /// reset. Everything else on the object is kept.
    pub fn apply_to(self, existing: &DynamicObject, desired: &DesiredIngress) -> Result<DynamicObject, ReconcileError> {
        let mut updated = existing.clone();
        let annotations = updated.metadata.annotations.get_or_insert_with(Default::default);
        annotations.retain(|key, _| !CONDITIONAL_ANNOTATIONS.contains(&key.as_str()));
        annotations.extend(desired.annotations.clone());
        set_controller(&mut updated.metadata, &desired.owner_references);

        if !updated.data.is_object() {
            updated.data = json!({});
        }
        let spec = &mut updated.data["spec"];
        if !spec.is_object() {
            *spec = json!({});
        }
        spec["rules"] = self.render_rules(&desired.rules)?;
        if desired.tls.is_empty() {
            if let Some(spec) = spec.as_object_mut() {
                spec.remove("tls");
            }
        } else {
            spec["tls"] = self.render_tls(&desired.tls)?;
        }
        Ok(updated)
    }

    fn render_rules(self, rules: &[RoutingRule]) -> Result<Value, ReconcileError> {
        match self {
            Self::NetworkingV1 => {
                let rules: Vec<networking::IngressRule> = rules
                    .iter()
                    .map(|rule| networking::IngressRule {
                        host: Some(rule.host.clone()),
                        http: Some(networking::HTTPIngressRuleValue {
                            paths: vec![networking::HTTPIngressPath {
                                path: Some(rule.path.clone()),
                                path_type: PATH_TYPE.to_string(),
                                backend: networking::IngressBackend {
                                    service: Some(networking::IngressServiceBackend {
                                        name: rule.service.clone(),
                                        port: Some(networking::ServiceBackendPort {
                                            number: Some(rule.port),
                                            ..Default::default()
                                        }),
                                    }),
                                    ..Default::default()
                                },
                            }],
                        }),
                    })
                    .collect();
                Ok(serde_json::to_value(rules)?)
            }
            Self::NetworkingV1beta1 | Self::ExtensionsV1beta1 => Ok(rules
                .iter()
                .map(|rule| {
                    json!({
                        "host": rule.host,
                        "http": {
                            "paths": [{
                                "path": rule.path,
                                "backend": {
                                    "serviceName": rule.service,
                                    "servicePort": rule.port,
                                },
                            }],
                        },
                    })
                })
                .collect()),
        }
    }

    fn render_tls(self, tls: &[TlsEntry]) -> Result<Value, ReconcileError> {
        // The TLS block has the same shape in every schema
        let tls: Vec<networking::IngressTLS> = tls
            .iter()
            .map(|entry| networking::IngressTLS {
                hosts: Some(entry.hosts.clone()),
                secret_name: Some(entry.secret_name.clone()),
            })
            .collect();
        Ok(serde_json::to_value(tls)?)
    }
}

impl std::fmt::Display for IngressSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.api_version())
    }
}

/// Find the newest Ingress schema the cluster serves
pub async fn discover(client: &Client) -> Result<IngressSchema, ControllerError> {
    for schema in IngressSchema::ALL {
        match client.list_api_group_resources(schema.api_version()).await {
            Ok(list) if list.resources.iter().any(|r| r.name == INGRESS_PLURAL) => {
                info!("Using Ingress API {}", schema);
                return Ok(schema);
            }
            Ok(_) => debug!("{} does not serve ingresses", schema),
            Err(e) => debug!("{} not available: {}", schema, e),
        }
    }
    Err(ControllerError::Discovery(
        "no supported Ingress API version is served".to_string(),
    ))
}

/// Writes Ingresses of one schema
#[derive(Clone)]
pub struct IngressDriver {
    schema: IngressSchema,
    api: Arc<dyn IngressApi>,
}

impl std::fmt::Debug for IngressDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngressDriver")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl IngressDriver {
    pub fn new(schema: IngressSchema, api: Arc<dyn IngressApi>) -> Self {
        Self { schema, api }
    }

    pub fn schema(&self) -> IngressSchema {
        self.schema
    }

    pub async fn create(&self, desired: &DesiredIngress) -> Result<DynamicObject, ReconcileError> {
        let obj = self.schema.build(desired)?;
        Ok(self.api.create(&desired.namespace, &obj).await?)
    }

    pub async fn update(&self, existing: &DynamicObject, desired: &DesiredIngress) -> Result<DynamicObject, ReconcileError> {
        let obj = self.schema.apply_to(existing, desired)?;
        Ok(self.api.replace(&desired.namespace, &obj).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesizer::ingress::desired_ingress;
    use crate::test_utils::create_test_function_ingress;
    use crds::{FunctionIngressTls, ObjectReference};
    use std::collections::BTreeMap;

    fn desired(tls: bool) -> DesiredIngress {
        let mut fni = create_test_function_ingress("nodeinfo", "openfaas", "nodeinfo.example.com");
        if tls {
            fni.spec.tls = Some(FunctionIngressTls {
                enabled: true,
                issuer_ref: ObjectReference::issuer("letsencrypt"),
            });
        }
        desired_ingress(&fni).unwrap()
    }

    #[test]
    fn test_from_api_version() {
        for schema in IngressSchema::ALL {
            assert_eq!(IngressSchema::from_api_version(schema.api_version()), Some(schema));
        }
        assert_eq!(IngressSchema::from_api_version("networking.k8s.io/v2"), None);
    }

    #[test]
    fn test_api_resource() {
        let ar = IngressSchema::ExtensionsV1beta1.api_resource();
        assert_eq!(ar.group, "extensions");
        assert_eq!(ar.version, "v1beta1");
        assert_eq!(ar.api_version, "extensions/v1beta1");
        assert_eq!(ar.kind, "Ingress");
        assert_eq!(ar.plural, "ingresses");
    }

    #[test]
    fn test_build_networking_v1() {
        let obj = IngressSchema::NetworkingV1.build(&desired(false)).unwrap();

        assert_eq!(obj.metadata.name.as_deref(), Some("nodeinfo"));
        assert_eq!(obj.metadata.namespace.as_deref(), Some("openfaas"));
        assert_eq!(obj.types.as_ref().unwrap().api_version, "networking.k8s.io/v1");
        assert_eq!(obj.metadata.owner_references.as_ref().unwrap().len(), 1);

        let path = &obj.data["spec"]["rules"][0]["http"]["paths"][0];
        assert_eq!(obj.data["spec"]["rules"][0]["host"], "nodeinfo.example.com");
        assert_eq!(path["path"], "/(.*)");
        assert_eq!(path["pathType"], "ImplementationSpecific");
        assert_eq!(path["backend"]["service"]["name"], "gateway");
        assert_eq!(path["backend"]["service"]["port"]["number"], 8080);
        assert!(obj.data["spec"].get("tls").is_none());
    }

    #[test]
    fn test_build_v1beta1_uses_service_name() {
        let obj = IngressSchema::NetworkingV1beta1.build(&desired(true)).unwrap();

        let path = &obj.data["spec"]["rules"][0]["http"]["paths"][0];
        assert_eq!(path["backend"]["serviceName"], "gateway");
        assert_eq!(path["backend"]["servicePort"], 8080);
        assert!(path.get("pathType").is_none());

        let tls = &obj.data["spec"]["tls"][0];
        assert_eq!(tls["secretName"], "nodeinfo.example.com-cert");
        assert_eq!(tls["hosts"][0], "nodeinfo.example.com");
    }

    #[test]
    fn test_apply_to_merges_annotations_and_replaces_rules() {
        let schema = IngressSchema::NetworkingV1;
        let mut existing = schema.build(&desired(true)).unwrap();
        existing.metadata.resource_version = Some("7".to_string());
        existing.metadata.annotations = Some(BTreeMap::from([(
            "field.cattle.io/publicEndpoints".to_string(),
            "[]".to_string(),
        )]));
        existing.data["spec"]["ingressClassName"] = json!("nginx");

        let mut next = desired(false);
        next.rules[0].path = "/v2/(.*)".to_string();
        let updated = schema.apply_to(&existing, &next).unwrap();

        assert_eq!(updated.metadata.resource_version.as_deref(), Some("7"));
        let annotations = updated.metadata.annotations.as_ref().unwrap();
        assert!(annotations.contains_key("field.cattle.io/publicEndpoints"));
        assert!(annotations.contains_key("com.openfaas.spec"));
        assert_eq!(updated.data["spec"]["rules"][0]["http"]["paths"][0]["path"], "/v2/(.*)");
        assert_eq!(updated.data["spec"]["ingressClassName"], "nginx");
        assert!(updated.data["spec"].get("tls").is_none(), "TLS removed when disabled");
    }

    #[test]
    fn test_apply_to_drops_rewrite_and_issuer_keys_no_longer_produced() {
        let schema = IngressSchema::NetworkingV1;
        let mut existing = schema.build(&desired(true)).unwrap();
        existing
            .metadata
            .annotations
            .as_mut()
            .unwrap()
            .insert("field.cattle.io/publicEndpoints".to_string(), "[]".to_string());
        let before = existing.metadata.annotations.as_ref().unwrap();
        assert!(before.contains_key("nginx.ingress.kubernetes.io/rewrite-target"));
        assert!(before.contains_key("cert-manager.io/issuer"));

        let mut fni = create_test_function_ingress("nodeinfo", "openfaas", "nodeinfo.example.com");
        fni.spec.bypass_gateway = true;
        let updated = schema.apply_to(&existing, &desired_ingress(&fni).unwrap()).unwrap();

        let annotations = updated.metadata.annotations.as_ref().unwrap();
        assert!(!annotations.contains_key("nginx.ingress.kubernetes.io/rewrite-target"));
        assert!(!annotations.contains_key("cert-manager.io/issuer"));
        assert!(annotations.contains_key("field.cattle.io/publicEndpoints"));
        assert_eq!(annotations["kubernetes.io/ingress.class"], "nginx");
    }

    #[test]
    fn test_apply_to_keeps_rewrite_set_on_the_function_ingress() {
        let schema = IngressSchema::NetworkingV1;
        let existing = schema.build(&desired(false)).unwrap();

        let mut fni = create_test_function_ingress("nodeinfo", "openfaas", "nodeinfo.example.com");
        fni.spec.bypass_gateway = true;
        fni.metadata.annotations = Some(BTreeMap::from([(
            "nginx.ingress.kubernetes.io/rewrite-target".to_string(),
            "/custom/$1".to_string(),
        )]));
        let updated = schema.apply_to(&existing, &desired_ingress(&fni).unwrap()).unwrap();

        let annotations = updated.metadata.annotations.as_ref().unwrap();
        assert_eq!(annotations["nginx.ingress.kubernetes.io/rewrite-target"], "/custom/$1");
    }

    #[test]
    fn test_apply_to_sets_controller_reference() {
        let schema = IngressSchema::NetworkingV1;
        let mut existing = schema.build(&desired(false)).unwrap();
        existing.metadata.owner_references = None;

        let updated = schema.apply_to(&existing, &desired(false)).unwrap();
        let owners = updated.metadata.owner_references.as_ref().unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "FunctionIngress");
        assert_eq!(owners[0].uid, "uid-nodeinfo");
        assert_eq!(owners[0].controller, Some(true));
    }
}
