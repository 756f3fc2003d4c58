//! Error types for the deploy API

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::warn;

/// Result type for deploy API operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for deploy API operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request body could not be decoded
    #[error("unable to unmarshal deployment request: {0}")]
    BadRequest(String),

    /// Deployment or status lookup failed
    #[error(transparent)]
    Deploy(#[from] deckhand_deploy::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal server error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status reported for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Deploy(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            Error::Deploy(_) | Error::Config(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!(error = %self, "request failed");
        }
        (status, self.to_string()).into_response()
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::BadRequest(e.to_string())
    }
}
