//! Function to Deployment and Service synthesis.

use std::collections::BTreeMap;

use crds::{Function, FunctionResources, FunctionSpec};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EmptyDirVolumeSource, EnvVar, ExecAction, HTTPGetAction, PodSpec,
    PodTemplateSpec, Probe, ProjectedVolumeSource, ResourceRequirements, SecretProjection,
    SecurityContext, Service, ServicePort, ServiceSpec, Volume, VolumeMount, VolumeProjection,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use tracing::warn;

use crate::config::{DeploymentConfig, ProbeConfig};
use crate::error::ReconcileError;
use crate::snapshot::{Snapshot, FUNCTION_SNAPSHOT};
use super::{owner_reference, set_controller};

/// Label selecting the pods of one function
pub const FUNCTION_LABEL: &str = "faas_function";

/// Path served by the watchdog health endpoint
pub const HEALTH_PATH: &str = "/_/health";

/// Where function secrets are mounted
pub const SECRETS_MOUNT_PATH: &str = "/var/openfaas/secrets";

/// User id function containers run as when non-root is enforced
pub const NON_ROOT_USER: i64 = 12000;

const SCRAPE_ANNOTATION: &str = "prometheus.io.scrape";
const TMP_VOLUME: &str = "temp";
const LOCK_FILE: &str = "/tmp/.lock";

/// Renders Deployments and Services for Functions
#[derive(Debug, Clone, Default)]
pub struct FunctionFactory {
    config: DeploymentConfig,
}

impl FunctionFactory {
    pub fn new(config: DeploymentConfig) -> Self {
        Self { config }
    }

    /// Deployment running `function`, owned by it
    pub fn make_deployment(&self, function: &Function) -> Result<Deployment, ReconcileError> {
        let name = function.name_any();
        let spec = &function.spec;
        let labels = make_labels(function);

        Ok(Deployment {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: function.namespace(),
                labels: Some(labels.clone()),
                annotations: Some(deployment_annotations(function)?),
                owner_references: owner_reference(function).map(|owner| vec![owner]),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(spec.replica_count()),
                selector: LabelSelector {
                    match_labels: Some(selector_labels(&name)),
                    ..Default::default()
                },
                strategy: Some(DeploymentStrategy {
                    type_: Some("RollingUpdate".to_string()),
                    rolling_update: Some(RollingUpdateDeployment {
                        max_surge: Some(IntOrString::Int(1)),
                        max_unavailable: Some(IntOrString::Int(0)),
                    }),
                }),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        name: Some(name.clone()),
                        labels: Some(labels),
                        annotations: spec.annotations.clone(),
                        ..Default::default()
                    }),
                    spec: Some(self.make_pod_spec(&name, spec)),
                },
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    /// ClusterIP Service exposing the function's watchdog
    pub fn make_service(&self, function: &Function) -> Service {
        let name = function.name_any();
        Service {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: function.namespace(),
                owner_references: owner_reference(function).map(|owner| vec![owner]),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                type_: Some("ClusterIP".to_string()),
                selector: Some(selector_labels(&name)),
                ports: Some(vec![ServicePort {
                    name: Some("http".to_string()),
                    protocol: Some("TCP".to_string()),
                    port: self.config.runtime_http_port,
                    target_port: Some(IntOrString::Int(self.config.runtime_http_port)),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// `existing` converged onto the current `function`.
    ///
    /// Annotations are merged so keys added by other controllers survive; the
    /// labels, spec and controller reference are replaced.
    pub fn update_deployment(&self, existing: &Deployment, function: &Function) -> Result<Deployment, ReconcileError> {
        let desired = self.make_deployment(function)?;
        let mut updated = existing.clone();

        let annotations = updated.metadata.annotations.get_or_insert_with(BTreeMap::new);
        annotations.extend(desired.metadata.annotations.unwrap_or_default());
        updated.metadata.labels = desired.metadata.labels;
        set_controller(&mut updated.metadata, desired.metadata.owner_references.as_deref().unwrap_or_default());
        updated.spec = desired.spec;
        Ok(updated)
    }

    fn make_pod_spec(&self, name: &str, spec: &FunctionSpec) -> PodSpec {
        let mut container = Container {
            name: name.to_string(),
            image: Some(spec.image.clone()),
            image_pull_policy: Some(self.config.image_pull_policy.clone()),
            ports: Some(vec![ContainerPort {
                container_port: self.config.runtime_http_port,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            env: Some(make_env(spec)),
            resources: make_resources(spec),
            readiness_probe: Some(self.make_probe(&self.config.readiness_probe)),
            liveness_probe: Some(self.make_probe(&self.config.liveness_probe)),
            ..Default::default()
        };

        let mut volumes = Vec::new();
        let mut mounts = Vec::new();

        if spec.read_only_root_filesystem {
            volumes.push(Volume {
                name: TMP_VOLUME.to_string(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Default::default()
            });
            mounts.push(VolumeMount {
                name: TMP_VOLUME.to_string(),
                mount_path: "/tmp".to_string(),
                ..Default::default()
            });
        }

        if !spec.secrets.is_empty() {
            let volume_name = format!("{name}-projected-secrets");
            volumes.push(Volume {
                name: volume_name.clone(),
                projected: Some(ProjectedVolumeSource {
                    sources: Some(
                        spec.secrets
                            .iter()
                            .map(|secret| VolumeProjection {
                                secret: Some(SecretProjection {
                                    name: secret.clone(),
                                    ..Default::default()
                                }),
                                ..Default::default()
                            })
                            .collect(),
                    ),
                    ..Default::default()
                }),
                ..Default::default()
            });
            mounts.push(VolumeMount {
                name: volume_name,
                mount_path: SECRETS_MOUNT_PATH.to_string(),
                read_only: Some(true),
                ..Default::default()
            });
        }

        if spec.read_only_root_filesystem || self.config.set_non_root_user {
            container.security_context = Some(SecurityContext {
                read_only_root_filesystem: Some(spec.read_only_root_filesystem),
                run_as_user: self.config.set_non_root_user.then_some(NON_ROOT_USER),
                ..Default::default()
            });
        }
        if !mounts.is_empty() {
            container.volume_mounts = Some(mounts);
        }

        PodSpec {
            containers: vec![container],
            node_selector: make_node_selector(&spec.constraints),
            volumes: (!volumes.is_empty()).then_some(volumes),
            ..Default::default()
        }
    }

    fn make_probe(&self, timing: &ProbeConfig) -> Probe {
        let mut probe = Probe {
            initial_delay_seconds: Some(timing.initial_delay_seconds),
            timeout_seconds: Some(timing.timeout_seconds),
            period_seconds: Some(timing.period_seconds),
            ..Default::default()
        };
        if self.config.http_probe {
            probe.http_get = Some(HTTPGetAction {
                path: Some(HEALTH_PATH.to_string()),
                port: IntOrString::Int(self.config.runtime_http_port),
                ..Default::default()
            });
        } else {
            probe.exec = Some(ExecAction {
                command: Some(vec!["cat".to_string(), LOCK_FILE.to_string()]),
            });
        }
        probe
    }
}

fn selector_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(FUNCTION_LABEL.to_string(), name.to_string())])
}

/// Pod and Deployment labels: the function's labels plus the selector label
pub fn make_labels(function: &Function) -> BTreeMap<String, String> {
    let mut labels = function.spec.labels.clone().unwrap_or_default();
    labels.insert(FUNCTION_LABEL.to_string(), function.name_any());
    labels
}

/// Deployment annotations, ending with the Function snapshot
pub fn deployment_annotations(function: &Function) -> Result<BTreeMap<String, String>, ReconcileError> {
    let mut annotations = BTreeMap::from([(SCRAPE_ANNOTATION.to_string(), "false".to_string())]);
    annotations.extend(function.spec.annotations.clone().unwrap_or_default());
    annotations.insert(
        FUNCTION_SNAPSHOT.to_string(),
        Snapshot::capture(function, &function.spec).encode()?,
    );
    Ok(annotations)
}

/// `fprocess` first, then the function's environment in key order
pub fn make_env(spec: &FunctionSpec) -> Vec<EnvVar> {
    let handler = (!spec.handler.is_empty()).then(|| ("fprocess".to_string(), spec.handler.clone()));
    handler
        .into_iter()
        .chain(spec.environment.clone().unwrap_or_default())
        .map(|(name, value)| EnvVar {
            name,
            value: Some(value),
            ..Default::default()
        })
        .collect()
}

pub fn make_resources(spec: &FunctionSpec) -> Option<ResourceRequirements> {
    let limits = spec.limits.as_ref().and_then(quantities);
    let requests = spec.requests.as_ref().and_then(quantities);
    if limits.is_none() && requests.is_none() {
        return None;
    }
    Some(ResourceRequirements {
        limits,
        requests,
        ..Default::default()
    })
}

fn quantities(resources: &FunctionResources) -> Option<BTreeMap<String, Quantity>> {
    let map: BTreeMap<String, Quantity> = [("memory", &resources.memory), ("cpu", &resources.cpu)]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| (key.to_string(), Quantity(value.clone())))
        .collect();
    (!map.is_empty()).then_some(map)
}

/// Node selector from `key=value` constraints
pub fn make_node_selector(constraints: &[String]) -> Option<BTreeMap<String, String>> {
    let mut selector = BTreeMap::new();
    for constraint in constraints {
        match constraint.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                selector.insert(key.trim().to_string(), value.trim().to_string());
            }
            _ => warn!("Ignoring malformed constraint {:?}", constraint),
        }
    }
    (!selector.is_empty()).then_some(selector)
}
