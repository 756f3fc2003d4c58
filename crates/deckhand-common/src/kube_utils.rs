//! Shared Kubernetes utilities using kube-rs
//!
//! Client construction, condition inspection and the canonical metadata
//! stamped on every object deckhand manages.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

use crate::Error;

/// Condition status value meaning the condition holds
pub const STATUS_TRUE: &str = "True";

/// Condition status value meaning the condition does not hold
pub const STATUS_FALSE: &str = "False";

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the metadata shared by every object of an application.
///
/// All five object kinds are identified by `(application, namespace)` and
/// carry the `app` selector label plus the managed-by label.
pub fn object_meta(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(app_labels(name)),
        ..Default::default()
    }
}

/// Labels attached to an application's objects and used as its pod selector
pub fn app_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (crate::LABEL_APP.to_string(), name.to_string()),
        (
            crate::LABEL_MANAGED_BY.to_string(),
            crate::LABEL_MANAGED_BY_DECKHAND.to_string(),
        ),
    ])
}

/// Check whether a kube error is the API server reporting 404
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// Find the condition of the given type, if present
pub fn find_condition<'a, T>(conditions: Option<&'a [T]>, condition_type: &str) -> Option<&'a T>
where
    T: HasConditionFields,
{
    conditions.and_then(|conds| conds.iter().find(|c| c.type_field() == condition_type))
}

/// Trait for types that have condition-like fields (type, status and reason)
pub trait HasConditionFields {
    /// Get the condition type field value
    fn type_field(&self) -> &str;
    /// Get the condition status field value
    fn status_field(&self) -> &str;
    /// Get the machine-readable reason, if any
    fn reason_field(&self) -> Option<&str>;
}

impl HasConditionFields for k8s_openapi::api::apps::v1::DeploymentCondition {
    fn type_field(&self) -> &str {
        &self.type_
    }
    fn status_field(&self) -> &str {
        &self.status
    }
    fn reason_field(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

/// Create a kube client from optional kubeconfig path with default timeouts
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    create_client_with_timeout(kubeconfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT).await
}

/// Create a kube client from optional kubeconfig path with custom timeouts
///
/// Without a kubeconfig path the configuration is inferred (in-cluster
/// service account first, then the local kubeconfig).
pub async fn create_client_with_timeout(
    kubeconfig: Option<&Path>,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            let origin = path.display().to_string();
            let kubeconfig =
                Kubeconfig::read_from(path).map_err(|e| Error::client_config(&origin, e))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| Error::client_config(&origin, e))?
        }
        None => Config::infer()
            .await
            .map_err(|e| Error::client_config("cluster environment", e))?,
    };

    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(read_timeout);
    Ok(Client::try_from(config)?)
}
