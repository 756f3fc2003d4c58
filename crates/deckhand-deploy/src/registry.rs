//! Resource registry (Fasit) access
//!
//! Two seams: [`ResourceRegistry`] resolves scoped resources and their files,
//! [`ApplicationRegistry`] answers questions about environments and
//! applications and records deployed instances. [`FasitClient`] implements
//! both against the Fasit v2 REST API.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Error;

/// Which resource to look up, and for whom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceScope {
    /// Resource alias
    pub alias: String,
    /// Resource type
    pub resource_type: String,
    /// Registry environment
    pub environment: String,
    /// Consuming application
    pub application: String,
    /// Network zone
    pub zone: String,
}

/// Credentials the caller supplied for registry calls that need them
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
    /// Registry username
    pub username: String,
    /// Registry password
    pub password: String,
}

impl std::fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An external resource expanded into configuration and secret values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedResource {
    /// Registry id, used for file lookups and instance registration
    pub id: i64,
    /// Resource name (the alias it was resolved by)
    pub name: String,
    /// Resource type
    pub resource_type: String,
    /// Plaintext configuration
    pub config: BTreeMap<String, String>,
    /// Secret values
    pub secrets: BTreeMap<String, Vec<u8>>,
    /// Custom binding names from the declaring manifest entry
    pub property_map: BTreeMap<String, String>,
}

impl ResolvedResource {
    /// Whether this resource contributes anything to the application's Secret
    pub fn has_secrets(&self) -> bool {
        !self.secrets.is_empty()
    }
}

/// Registry of scoped external resources
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceRegistry: Send + Sync {
    /// Resolve a resource, returning `None` when the registry has no match
    async fn resolve(
        &self,
        scope: &ResourceScope,
        credentials: &RegistryCredentials,
    ) -> Result<Option<ResolvedResource>, Error>;

    /// Fetch a file attached to a resource, `None` when the registry has no such file
    async fn fetch_file(&self, resource_id: i64, file_key: &str)
        -> Result<Option<Vec<u8>>, Error>;
}

/// A deployed application instance as recorded in the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationInstance {
    /// Application name
    pub application: String,
    /// Registry environment
    pub environment: String,
    /// Deployed version
    pub version: String,
    /// Cluster the instance runs in
    #[serde(rename = "clustername")]
    pub cluster_name: String,
    /// Public URL of the application's ingress
    #[serde(rename = "exposedurl")]
    pub exposed_url: String,
    /// Registry resources the instance consumes
    #[serde(rename = "usedresources")]
    pub used_resources: Vec<ResourceRef>,
}

/// Reference to a registry resource by id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourceRef {
    /// Registry id
    pub id: i64,
}

/// Registry knowledge about environments and applications
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ApplicationRegistry: Send + Sync {
    /// Class of the environment (e.g. "u", "t", "q", "p"), `None` if unknown
    async fn environment_class(&self, environment: &str) -> Result<Option<String>, Error>;

    /// Whether the application is registered
    async fn application_exists(&self, application: &str) -> Result<bool, Error>;

    /// Record a deployed application instance
    async fn register_instance(
        &self,
        instance: &ApplicationInstance,
        credentials: &RegistryCredentials,
    ) -> Result<(), Error>;
}

// =============================================================================
// Fasit wire format
// =============================================================================

#[derive(Debug, Deserialize)]
struct FasitResource {
    id: i64,
    alias: String,
    #[serde(rename = "type")]
    resource_type: String,
    #[serde(default)]
    properties: BTreeMap<String, String>,
    #[serde(default)]
    secrets: BTreeMap<String, FasitRef>,
}

#[derive(Debug, Deserialize)]
struct FasitRef {
    #[serde(rename = "ref")]
    reference: String,
}

#[derive(Debug, Deserialize)]
struct FasitEnvironment {
    #[serde(rename = "environmentclass")]
    environment_class: String,
}

/// Fasit v2 REST client
#[derive(Debug, Clone)]
pub struct FasitClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl FasitClient {
    /// Create a client for the Fasit instance at `base_url`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, Error> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::HttpClient {
                message: e.to_string(),
            })?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// URL for `segments` under the base URL, each segment percent-encoded
    fn segment_url(&self, context: &str, segments: &[&str]) -> Result<Url, Error> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::registry(context, format!("invalid base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| {
                Error::registry(context, format!("{} cannot be a base URL", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn fetch_secret(
        &self,
        key: &str,
        reference: &str,
        credentials: &RegistryCredentials,
    ) -> Result<Vec<u8>, Error> {
        let response = self
            .http_client
            .get(reference)
            .basic_auth(&credentials.username, Some(&credentials.password))
            .send()
            .await
            .map_err(|e| Error::registry("secret", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::registry(
                "secret",
                format!("fetching secret '{}' returned HTTP status {}", key, status),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::registry("secret", e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ResourceRegistry for FasitClient {
    async fn resolve(
        &self,
        scope: &ResourceScope,
        credentials: &RegistryCredentials,
    ) -> Result<Option<ResolvedResource>, Error> {
        let response = self
            .http_client
            .get(self.url("/api/v2/scopedresource"))
            .query(&[
                ("alias", scope.alias.as_str()),
                ("type", scope.resource_type.as_str()),
                ("environment", scope.environment.as_str()),
                ("application", scope.application.as_str()),
                ("zone", scope.zone.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::registry("scopedresource", e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(alias = %scope.alias, resource_type = %scope.resource_type, "resource not found in registry");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::registry(
                "scopedresource",
                format!(
                    "looking up {} ({}) returned HTTP status {}",
                    scope.alias, scope.resource_type, status
                ),
            ));
        }

        let resource: FasitResource = response
            .json()
            .await
            .map_err(|e| Error::registry("scopedresource", format!("invalid resource: {}", e)))?;

        let mut secrets = BTreeMap::new();
        for (key, secret_ref) in &resource.secrets {
            let value = self
                .fetch_secret(key, &secret_ref.reference, credentials)
                .await?;
            secrets.insert(key.clone(), value);
        }

        Ok(Some(ResolvedResource {
            id: resource.id,
            name: resource.alias,
            resource_type: resource.resource_type,
            config: resource.properties,
            secrets,
            property_map: BTreeMap::new(),
        }))
    }

    async fn fetch_file(
        &self,
        resource_id: i64,
        file_key: &str,
    ) -> Result<Option<Vec<u8>>, Error> {
        let id = resource_id.to_string();
        let url = self.segment_url(
            "file",
            &["api", "v2", "resources", id.as_str(), "file", file_key],
        )?;
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::registry("file", e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(resource_id, file_key, "file not found in registry");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::registry(
                "file",
                format!(
                    "fetching file '{}' of resource {} returned HTTP status {}",
                    file_key, resource_id, status
                ),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::registry("file", e.to_string()))?;
        Ok(Some(bytes.to_vec()))
    }
}

#[async_trait]
impl ApplicationRegistry for FasitClient {
    async fn environment_class(&self, environment: &str) -> Result<Option<String>, Error> {
        let response = self
            .http_client
            .get(self.segment_url("environments", &["api", "v2", "environments", environment])?)
            .send()
            .await
            .map_err(|e| Error::registry("environments", e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let env: FasitEnvironment = response.json().await.map_err(|e| {
                    Error::registry("environments", format!("invalid environment: {}", e))
                })?;
                Ok(Some(env.environment_class))
            }
            status => Err(Error::registry(
                "environments",
                format!("looking up {} returned HTTP status {}", environment, status),
            )),
        }
    }

    async fn application_exists(&self, application: &str) -> Result<bool, Error> {
        let response = self
            .http_client
            .get(self.segment_url("applications", &["api", "v2", "applications", application])?)
            .send()
            .await
            .map_err(|e| Error::registry("applications", e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(Error::registry(
                "applications",
                format!("looking up {} returned HTTP status {}", application, status),
            )),
        }
    }

    async fn register_instance(
        &self,
        instance: &ApplicationInstance,
        credentials: &RegistryCredentials,
    ) -> Result<(), Error> {
        let response = self
            .http_client
            .post(self.url("/api/v2/applicationinstances/"))
            .basic_auth(&credentials.username, Some(&credentials.password))
            .json(instance)
            .send()
            .await
            .map_err(|e| Error::registry("applicationinstances", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::registry(
                "applicationinstances",
                format!("registering instance returned HTTP status {}", status),
            ));
        }

        debug!(
            application = %instance.application,
            environment = %instance.environment,
            version = %instance.version,
            "registered application instance"
        );
        Ok(())
    }
}
