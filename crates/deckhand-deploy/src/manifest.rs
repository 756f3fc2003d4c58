//! Application manifests and where they come from
//!
//! A manifest is a YAML document owned by the application team. Everything
//! except the image has a platform default.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Error;

/// Declarative description of how an application runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationManifest {
    /// Container image without tag
    pub image: String,
    /// Container port serving HTTP
    #[serde(default = "default_port")]
    pub port: i32,
    /// Liveness and readiness endpoints
    #[serde(default)]
    pub healthcheck: Healthcheck,
    /// Container resource requests and limits
    #[serde(default)]
    pub resources: ResourceRequirements,
    /// Autoscaling bounds
    #[serde(default)]
    pub replicas: Replicas,
    /// Prometheus scrape configuration
    #[serde(default)]
    pub prometheus: PrometheusConfig,
    /// Registry resources the application depends on
    #[serde(default)]
    pub fasit_resources: FasitResources,
}

fn default_port() -> i32 {
    8080
}

/// Liveness and readiness probe paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Healthcheck {
    /// Restart the container when this fails
    pub liveness: Probe,
    /// Route traffic only while this succeeds
    pub readiness: Probe,
}

impl Default for Healthcheck {
    fn default() -> Self {
        Self {
            liveness: Probe {
                path: "isAlive".to_string(),
            },
            readiness: Probe {
                path: "isReady".to_string(),
            },
        }
    }
}

/// An HTTP GET probe
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probe {
    /// Request path on the container port
    pub path: String,
}

/// Requests and limits as Kubernetes quantity strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceRequirements {
    /// Upper bounds
    pub limits: ResourceList,
    /// Scheduling guarantees
    pub requests: ResourceList,
}

impl Default for ResourceRequirements {
    fn default() -> Self {
        Self {
            limits: ResourceList {
                cpu: "500m".to_string(),
                memory: "512Mi".to_string(),
            },
            requests: ResourceList {
                cpu: "100m".to_string(),
                memory: "256Mi".to_string(),
            },
        }
    }
}

/// CPU and memory quantities
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceList {
    /// e.g. "100m"
    pub cpu: String,
    /// e.g. "256Mi"
    pub memory: String,
}

/// Autoscaler bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Replicas {
    /// Minimum replica count
    pub min: i32,
    /// Maximum replica count
    pub max: i32,
    /// Target average CPU utilization
    pub cpu_threshold_percentage: i32,
}

impl Default for Replicas {
    fn default() -> Self {
        Self {
            min: 2,
            max: 4,
            cpu_threshold_percentage: 50,
        }
    }
}

/// Prometheus scrape settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrometheusConfig {
    /// Annotate pods for scraping
    pub enabled: bool,
    /// Metrics path
    pub path: String,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "/metrics".to_string(),
        }
    }
}

/// Registry resources section of the manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FasitResources {
    /// Resources the application consumes
    pub used: Vec<UsedResource>,
}

/// A registry resource the application consumes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsedResource {
    /// Registry alias
    pub alias: String,
    /// Registry resource type (e.g., "datasource")
    pub resource_type: String,
    /// Property key to custom environment variable name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub property_map: BTreeMap<String, String>,
}

impl ApplicationManifest {
    /// Parse a manifest from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Resources declared under `fasitResources.used`
    pub fn used_resources(&self) -> &[UsedResource] {
        &self.fasit_resources.used
    }
}

/// Source of application manifests
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Fetch and decode the manifest at `url`
    ///
    /// Every failure is reported as [`Error::ManifestUnavailable`].
    async fn fetch(&self, url: &str) -> Result<ApplicationManifest, Error>;
}

/// Fetches manifests over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpManifestSource {
    http_client: reqwest::Client,
}

impl HttpManifestSource {
    /// Create a source whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::HttpClient {
                message: e.to_string(),
            })?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl ManifestSource for HttpManifestSource {
    async fn fetch(&self, url: &str) -> Result<ApplicationManifest, Error> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::manifest_unavailable(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::manifest_unavailable(
                url,
                format!("HTTP status {}", status),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::manifest_unavailable(url, e.to_string()))?;

        let manifest = ApplicationManifest::from_yaml(&body)
            .map_err(|e| Error::manifest_unavailable(url, format!("invalid manifest: {}", e)))?;

        debug!(
            url = %url,
            image = %manifest.image,
            used_resources = manifest.used_resources().len(),
            "fetched application manifest"
        );
        Ok(manifest)
    }
}
