//! Deploy pipeline error types
//!
//! Every failure of a deploy call lands in one of these variants. The HTTP
//! layer only needs [`Error::is_client_error`] to pick a status code.

use thiserror::Error;

use crate::reconcile::DeploymentResult;

/// Errors produced while merging, resolving or reconciling a deployment
#[derive(Debug, Error)]
pub enum Error {
    /// The deployment request failed validation
    #[error("invalid deployment request: {}", .errors.join(", "))]
    Validation {
        /// Every violation found, in check order
        errors: Vec<String>,
    },

    /// The application manifest could not be fetched or decoded
    #[error("unable to fetch manifest from {url}: {message}")]
    ManifestUnavailable {
        /// Location the manifest was requested from
        url: String,
        /// Transport, status or decode failure
        message: String,
    },

    /// A declared resource does not exist in the registry
    #[error("unable to get resource {alias} ({resource_type})")]
    ResourceNotFound {
        /// Resource alias from the manifest
        alias: String,
        /// Resource type from the manifest
        resource_type: String,
    },

    /// The registry does not know the environment or application
    #[error("{entity} '{name}' does not exist in the resource registry")]
    NotRegistered {
        /// What was looked up ("environment" or "application")
        entity: String,
        /// The name that was not found
        name: String,
    },

    /// Transport or protocol failure talking to the registry
    #[error("registry error [{context}]: {message}")]
    Registry {
        /// Registry call that failed (e.g., "scopedresource")
        context: String,
        /// Description of the failure
        message: String,
    },

    /// The cluster API rejected a read or write
    #[error("failed to {action} {kind} {namespace}/{name}: {source}")]
    Cluster {
        /// get, create or update
        action: &'static str,
        /// Object kind (e.g., "deployment")
        kind: &'static str,
        /// Object name
        name: String,
        /// Object namespace
        namespace: String,
        /// Underlying kube-rs error
        source: kube::Error,
    },

    /// An outbound HTTP client could not be built
    #[error("failed to build HTTP client: {message}")]
    HttpClient {
        /// Underlying reqwest error
        message: String,
    },

    /// Reconciliation stopped after some kinds were already applied
    ///
    /// Nothing is rolled back; `applied` holds what the cluster now has.
    #[error("{source}\n{}", .applied.message())]
    PartiallyApplied {
        /// Objects applied before the failure
        applied: Box<DeploymentResult>,
        /// The failure that stopped reconciliation
        source: Box<Error>,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a registry error with context
    pub fn registry(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Registry {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Create a manifest error for the given location
    pub fn manifest_unavailable(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ManifestUnavailable {
            url: url.into(),
            message: msg.into(),
        }
    }

    /// Create a cluster error for an object operation
    pub fn cluster(
        action: &'static str,
        kind: &'static str,
        name: &str,
        namespace: &str,
        source: kube::Error,
    ) -> Self {
        Self::Cluster {
            action,
            kind,
            name: name.to_string(),
            namespace: namespace.to_string(),
            source,
        }
    }

    /// Attach the objects applied before `source` stopped reconciliation.
    ///
    /// Returns `source` unchanged when nothing was applied.
    pub fn partially_applied(applied: DeploymentResult, source: Error) -> Self {
        if applied.actions.is_empty() {
            return source;
        }
        Self::PartiallyApplied {
            applied: Box::new(applied),
            source: Box::new(source),
        }
    }

    /// Objects applied before the failure, if any
    pub fn applied(&self) -> Option<&DeploymentResult> {
        match self {
            Error::PartiallyApplied { applied, .. } => Some(applied.as_ref()),
            _ => None,
        }
    }

    /// Whether the caller caused this error (maps to HTTP 400)
    ///
    /// Manifest problems are server errors: the manifest location is not
    /// something the request validation can vouch for.
    pub fn is_client_error(&self) -> bool {
        match self {
            Error::PartiallyApplied { source, .. } => source.is_client_error(),
            _ => matches!(
                self,
                Error::Validation { .. }
                    | Error::ResourceNotFound { .. }
                    | Error::NotRegistered { .. }
            ),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_not_found_names_alias_and_type() {
        let err = Error::ResourceNotFound {
            alias: "alias1".to_string(),
            resource_type: "db".to_string(),
        };
        assert_eq!(err.to_string(), "unable to get resource alias1 (db)");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_validation_lists_every_violation() {
        let err = Error::Validation {
            errors: vec![
                "application is required and is empty".to_string(),
                "zone can only be fss, sbs or iapp".to_string(),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("application is required and is empty"));
        assert!(msg.contains("zone can only be fss, sbs or iapp"));
        assert!(err.is_client_error());
    }

    /// Story: an unreachable manifest is the service's problem, not the caller's
    #[test]
    fn story_manifest_errors_are_server_errors() {
        let err = Error::manifest_unavailable("http://repo.com/app", "HTTP status 400");
        assert!(err.to_string().contains("http://repo.com/app"));
        assert!(!err.is_client_error());
        assert!(!Error::registry("scopedresource", "connection refused").is_client_error());
    }

    #[test]
    fn test_cluster_error_identifies_object() {
        let source = kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "forbidden".to_string(),
            reason: "Forbidden".to_string(),
            code: 403,
        });
        let err = Error::cluster("update", "service", "appname", "team-a", source);
        let msg = err.to_string();
        assert!(msg.starts_with("failed to update service team-a/appname"));
        assert!(!err.is_client_error());
    }

    /// Story: a failure part way through still tells the caller what was applied
    #[test]
    fn story_partial_failure_lists_applied_objects() {
        use crate::reconcile::{Action, AppliedAction, ObjectKind};

        let applied = DeploymentResult {
            actions: vec![AppliedAction {
                kind: ObjectKind::Deployment,
                action: Action::Created,
            }],
            ..Default::default()
        };
        let err = Error::partially_applied(
            applied,
            Error::registry("scopedresource", "connection refused"),
        );

        assert_eq!(
            err.to_string(),
            "registry error [scopedresource]: connection refused\nresult: \n- created deployment\n"
        );
        assert_eq!(err.applied().map(|r| r.actions.len()), Some(1));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_http_client_error_is_server_error() {
        let err = Error::HttpClient {
            message: "no TLS backend".to_string(),
        };
        assert_eq!(err.to_string(), "failed to build HTTP client: no TLS backend");
        assert!(!err.is_client_error());
        assert!(err.applied().is_none());
    }

    #[test]
    fn test_nothing_applied_keeps_plain_error() {
        let err = Error::partially_applied(
            DeploymentResult::default(),
            Error::NotRegistered {
                entity: "application".to_string(),
                name: "appname".to_string(),
            },
        );
        assert!(matches!(err, Error::NotRegistered { .. }));
        assert!(err.applied().is_none());
        assert!(err.is_client_error());
    }
}
