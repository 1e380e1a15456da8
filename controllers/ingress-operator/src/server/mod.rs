//! Admin HTTP API.
//!
//! A thin OpenFaaS provider surface: it reads Functions from the watch cache
//! and writes Function resources, leaving the Deployments and Services to the
//! Function controller.
//!
//! - `GET|POST|PUT|DELETE /system/functions`
//! - `GET /system/function/{name}`
//! - `POST /system/scale-function/{name}`
//! - `GET /system/info`, `GET /healthz`, `GET /metrics`

mod functions;
mod system;
pub mod types;


use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use crds::Function;
use k8s_openapi::api::apps::v1::Deployment;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::cache::Store;
use crate::clients::FunctionApi;
use crate::config::ServerConfig;
use crate::error::ControllerError;
use crate::metrics::Metrics;

/// Shared state of every handler
pub struct AppState {
    /// Namespace Functions are read from and written to
    pub namespace: String,
    pub functions: Store<Function>,
    pub deployments: Store<Deployment>,
    pub api: Arc<dyn FunctionApi>,
    pub metrics: Metrics,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("namespace", &self.namespace)
            .field("functions", &self.functions)
            .field("deployments", &self.deployments)
            .finish_non_exhaustive()
    }
}

/// Handler failure rendered as a plain-text body
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl From<kube::Error> for ApiError {
    fn from(e: kube::Error) -> Self {
        error!("Kubernetes API error: {}", e);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

/// Build the admin router
pub fn create_router(state: Arc<AppState>, request_timeout: Duration) -> Router {
    Router::new()
        .route(
            "/system/functions",
            get(functions::list)
                .post(functions::apply)
                .put(functions::apply)
                .delete(functions::delete),
        )
        .route("/system/function/{name}", get(functions::get))
        .route("/system/scale-function/{name}", post(functions::scale))
        .route("/system/info", get(system::info))
        .route("/healthz", get(system::healthz))
        .route("/metrics", get(system::metrics))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout))
        .with_state(state)
}

/// Serve the admin API until `token` is cancelled
pub async fn serve(
    state: Arc<AppState>,
    config: ServerConfig,
    token: CancellationToken,
) -> Result<(), ControllerError> {
    let app = create_router(state, config.request_timeout());
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!(port = config.port, "Starting admin HTTP server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            token.cancelled().await;
            info!("Shutting down admin HTTP server");
        })
        .await?;
    Ok(())
}
