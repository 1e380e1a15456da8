//! Provider info, health and metrics handlers

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use super::types::{ProviderInfo, ProviderVersion};
use super::AppState;
use crate::events::CONTROLLER_AGENT_NAME;

pub async fn info() -> Json<ProviderInfo> {
    Json(ProviderInfo {
        orchestration: "kubernetes".to_string(),
        provider: CONTROLLER_AGENT_NAME.to_string(),
        version: ProviderVersion {
            sha: option_env!("GIT_COMMIT").unwrap_or("unknown").to_string(),
            release: env!("CARGO_PKG_VERSION").to_string(),
        },
    })
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
