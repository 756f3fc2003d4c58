//! Request handlers

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use deckhand_deploy::{DeployStatus, DeploymentRequest};
use tracing::{debug, info};

use crate::error::Error;
use crate::server::AppState;

/// HTTP status reported for a rollout verdict
pub fn status_code_for(status: DeployStatus) -> StatusCode {
    match status {
        DeployStatus::Success => StatusCode::OK,
        DeployStatus::InProgress => StatusCode::ACCEPTED,
        DeployStatus::Failed => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Handle `POST /deploy`
///
/// The body is decoded by hand so a malformed request is a 400 with a plain
/// text explanation rather than axum's JSON rejection.
pub async fn deploy(State(state): State<AppState>, body: Bytes) -> Result<String, Error> {
    let request: DeploymentRequest = serde_json::from_slice(&body)?;
    info!(
        application = %request.application,
        version = %request.version,
        namespace = %request.namespace,
        "received deployment request"
    );

    let result = state.deployer.deploy(request).await?;
    Ok(result.message())
}

/// Handle `GET /deploystatus/{namespace}/{deployName}`
pub async fn deploy_status(
    State(state): State<AppState>,
    Path((namespace, deploy_name)): Path<(String, String)>,
) -> Result<Response, Error> {
    match state
        .status
        .deployment_status(&namespace, &deploy_name)
        .await?
    {
        Some((status, view)) => {
            debug!(namespace = %namespace, deployment = %deploy_name, status = %status, "deploy status");
            Ok((status_code_for(status), Json(view)).into_response())
        }
        None => Ok((
            StatusCode::NOT_FOUND,
            format!("deployment {}/{} not found", namespace, deploy_name),
        )
            .into_response()),
    }
}

/// Handle `GET /isalive`
pub async fn is_alive() -> StatusCode {
    StatusCode::OK
}
