//! OpenFaaS Ingress Operator
//!
//! Runs two control loops against the cluster:
//! - FunctionIngress: keeps one Ingress per FunctionIngress, with routing
//!   rules, TLS and ingress-class annotations synthesized from the spec
//! - Function: keeps one Deployment and one Service per Function
//!
//! plus a small admin HTTP API that writes Function resources.

mod cache;
mod clients;
mod config;
mod controller;
mod driver;
mod error;
mod event_log;
mod events;
mod keys;
mod metrics;
mod reconciler;
mod router;
mod server;
mod snapshot;
mod synthesizer;
mod worker;

#[cfg(test)]
mod test_utils;

use controller::Controller;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::ControllerError;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| ControllerError::InvalidConfig("failed to install rustls crypto provider".to_string()))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting OpenFaaS ingress operator {}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!("Configuration:");
    info!("  Namespace: {}", config.watch_namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Workers: {}", config.workers);
    info!("  Admin port: {}", config.server.port);

    let token = CancellationToken::new();
    tokio::spawn(shutdown_signal(token.clone()));

    let controller = Controller::new(config).await?;
    controller.run(token).await?;

    info!("Ingress operator stopped");
    Ok(())
}

/// Cancel `token` on SIGINT or SIGTERM
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    token.cancel();
}
