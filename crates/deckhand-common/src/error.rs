//! Errors from the shared helpers

use thiserror::Error;

/// Shared error type for deckhand helpers
#[derive(Debug, Error)]
pub enum Error {
    /// No usable kube configuration could be loaded
    #[error("failed to load kube config from {origin}: {message}")]
    ClientConfig {
        /// Kubeconfig path, or "cluster environment" when inferred
        origin: String,
        /// What went wrong
        message: String,
    },

    /// A client could not be built from the loaded configuration
    #[error("failed to create kube client: {source}")]
    Client {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },
}

impl Error {
    /// Create a configuration loading error
    pub fn client_config(origin: impl Into<String>, msg: impl std::fmt::Display) -> Self {
        Self::ClientConfig {
            origin: origin.into(),
            message: msg.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_names_origin() {
        let err = Error::client_config("/tmp/kubeconfig", "no such file");
        assert_eq!(
            err.to_string(),
            "failed to load kube config from /tmp/kubeconfig: no such file"
        );
    }

    #[test]
    fn test_kube_error_converts() {
        let err: Error = kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "forbidden".to_string(),
            reason: "Forbidden".to_string(),
            code: 403,
        })
        .into();
        assert!(matches!(err, Error::Client { .. }));
        assert!(err.to_string().contains("forbidden"));
    }
}
