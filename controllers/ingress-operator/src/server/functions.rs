//! Function handlers

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use crds::{min_replicas, Function, FunctionSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use tracing::info;

use super::types::{DeleteFunctionRequest, FunctionDeployment, FunctionStatus, ScaleServiceRequest};
use super::{ApiError, AppState};

fn status_of(state: &AppState, function: &Function) -> FunctionStatus {
    let name = function.name_any();
    let (replicas, available_replicas) = state
        .deployments
        .get(&state.namespace, &name)
        .map(|deployment| {
            let desired = deployment.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0);
            let available = deployment
                .status
                .as_ref()
                .and_then(|s| s.available_replicas)
                .unwrap_or(0);
            (to_count(desired), to_count(available))
        })
        .unwrap_or_default();

    FunctionStatus {
        name,
        image: function.spec.image.clone(),
        namespace: state.namespace.clone(),
        replicas,
        available_replicas,
        labels: function.spec.labels.clone(),
        annotations: function.spec.annotations.clone(),
    }
}

fn to_count(replicas: i32) -> u64 {
    u64::try_from(replicas).unwrap_or(0)
}

/// Function resource for a deployment request
fn function_from(namespace: &str, request: FunctionDeployment) -> Function {
    let replicas = min_replicas(request.labels.as_ref());
    Function {
        metadata: ObjectMeta {
            name: Some(request.service.clone()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: FunctionSpec {
            name: request.service,
            image: request.image,
            replicas: Some(replicas),
            handler: request.env_process,
            annotations: request.annotations,
            labels: request.labels,
            environment: Some(request.env_vars),
            constraints: request.constraints,
            secrets: request.secrets,
            limits: request.limits,
            requests: request.requests,
            read_only_root_filesystem: request.read_only_root_filesystem,
        },
    }
}

pub async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<FunctionStatus>> {
    let mut functions: Vec<FunctionStatus> = state
        .functions
        .list()
        .iter()
        .filter(|function| function.namespace().as_deref() == Some(state.namespace.as_str()))
        .map(|function| status_of(&state, function))
        .collect();
    functions.sort_by(|a, b| a.name.cmp(&b.name));
    Json(functions)
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<FunctionStatus>, ApiError> {
    let function = state
        .functions
        .get(&state.namespace, &name)
        .ok_or_else(|| ApiError::not_found(format!("function {name} not found")))?;
    Ok(Json(status_of(&state, &function)))
}

/// Create or update a Function
pub async fn apply(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FunctionDeployment>,
) -> Result<StatusCode, ApiError> {
    if request.service.trim().is_empty() {
        return Err(ApiError::bad_request("service is required"));
    }
    if request.image.trim().is_empty() {
        return Err(ApiError::bad_request("image is required"));
    }

    let mut function = function_from(&state.namespace, request);
    let name = function.name_any();
    match state.api.get(&state.namespace, &name).await? {
        Some(existing) => {
            function.metadata.resource_version = existing.metadata.resource_version;
            state.api.replace(&state.namespace, &function).await?;
            info!("Function {} updated", name);
        }
        None => {
            state.api.create(&state.namespace, &function).await?;
            info!("Function {} created", name);
        }
    }
    Ok(StatusCode::ACCEPTED)
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeleteFunctionRequest>,
) -> Result<StatusCode, ApiError> {
    if request.function_name.trim().is_empty() {
        return Err(ApiError::bad_request("functionName is required"));
    }
    if !state.api.delete(&state.namespace, &request.function_name).await? {
        return Err(ApiError::not_found(format!(
            "function {} not found",
            request.function_name
        )));
    }
    info!("Function {} deleted", request.function_name);
    Ok(StatusCode::ACCEPTED)
}

pub async fn scale(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(request): Json<ScaleServiceRequest>,
) -> Result<StatusCode, ApiError> {
    let replicas = i32::try_from(request.replicas)
        .map_err(|_| ApiError::bad_request(format!("replicas out of range: {}", request.replicas)))?;
    if !state.api.scale(&state.namespace, &name, replicas).await? {
        return Err(ApiError::not_found(format!("function {name} not found")));
    }
    info!("Function {} scaled to {}", name, replicas);
    Ok(StatusCode::ACCEPTED)
}
