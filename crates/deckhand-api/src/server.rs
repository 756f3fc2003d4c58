//! Deploy API server

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tracing::info;

use crate::error::Error;
use crate::handlers::{deploy, deploy_status, is_alive};
use crate::service::{DeployRunner, DeployStatusViewer};

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    /// Runs deployments
    pub deployer: Arc<dyn DeployRunner>,
    /// Reads rollout state
    pub status: Arc<dyn DeployStatusViewer>,
}

/// Build the deploy API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/deploy", post(deploy))
        .route("/deploystatus/{namespace}/{deployName}", get(deploy_status))
        .route("/isalive", get(is_alive))
        .with_state(state)
}

/// Serve the deploy API until `shutdown` resolves
pub async fn start_server<F>(addr: SocketAddr, state: AppState, shutdown: F) -> Result<(), Error>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Config(format!("failed to bind {}: {}", addr, e)))?;

    info!(addr = %addr, "Starting deploy API server");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Internal(format!("server error: {}", e)))
}
