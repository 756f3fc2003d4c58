//! Deploy pipeline facade
//!
//! [`Deployer`] wires the request merger, manifest source, registries and
//! cluster store together and exposes the three operations the HTTP layer
//! needs: validate, deploy and deployment status.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::manifest::ManifestSource;
use crate::reconcile::{create_or_update_k8s_resources, DeploymentResult};
use crate::registry::{
    ApplicationInstance, ApplicationRegistry, ResolvedResource, ResourceRef, ResourceRegistry,
};
use crate::request::DeploymentRequest;
use crate::resolver::{credentials_for, resolve_resources};
use crate::status::{status_view, DeployStatus, StatusView};
use crate::store::ClusterObjectStore;
use crate::Error;

/// Cluster-wide deploy settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployerConfig {
    /// Ingress hosts are `{application}.{cluster_subdomain}`
    pub cluster_subdomain: String,
    /// Name this cluster is registered under in the registry
    pub cluster_name: String,
}

/// Runs deployments end to end
#[derive(Clone)]
pub struct Deployer {
    manifests: Arc<dyn ManifestSource>,
    resources: Arc<dyn ResourceRegistry>,
    applications: Arc<dyn ApplicationRegistry>,
    store: Arc<dyn ClusterObjectStore>,
    config: DeployerConfig,
}

impl Deployer {
    /// Create a deployer from its collaborators
    pub fn new(
        manifests: Arc<dyn ManifestSource>,
        resources: Arc<dyn ResourceRegistry>,
        applications: Arc<dyn ApplicationRegistry>,
        store: Arc<dyn ClusterObjectStore>,
        config: DeployerConfig,
    ) -> Self {
        Self {
            manifests,
            resources,
            applications,
            store,
            config,
        }
    }

    /// Validation errors for a request, deprecated fields included
    pub fn validate(&self, request: &DeploymentRequest) -> Vec<String> {
        let (merged, _) = request.clone().merge_deprecated();
        merged.validate()
    }

    /// Deploy one application version.
    ///
    /// Validation happens before any external call. A registration failure
    /// after reconciliation is reported as a warning, not an error.
    #[instrument(
        skip(self, request),
        fields(application = %request.application, namespace = %request.namespace)
    )]
    pub async fn deploy(&self, request: DeploymentRequest) -> Result<DeploymentResult, Error> {
        let (request, mut warnings) = request.merge_deprecated();
        for warning in &warnings {
            warn!(warning = %warning, "deprecated request property");
        }

        let errors = request.validate();
        if !errors.is_empty() {
            return Err(Error::Validation { errors });
        }

        let manifest = self.manifests.fetch(&request.manifest_url).await?;
        let declares_resources = !manifest.used_resources().is_empty();

        if declares_resources {
            self.check_registered(&request).await?;
        }

        let resources =
            resolve_resources(self.resources.as_ref(), manifest.used_resources(), &request).await?;

        let mut result = create_or_update_k8s_resources(
            self.store.as_ref(),
            &request,
            &manifest,
            &resources,
            &self.config.cluster_subdomain,
        )
        .await
        .map_err(|mut e| {
            if let Error::PartiallyApplied { applied, .. } = &mut e {
                applied.warnings = warnings.clone();
            }
            e
        })?;

        if declares_resources {
            if let Err(e) = self.register(&request, &resources).await {
                warn!(error = %e, "failed to register application instance");
                warnings.push(format!(
                    "unable to register application instance in the resource registry: {}",
                    e
                ));
            }
        }

        info!(version = %request.version, actions = result.actions.len(), "deployment reconciled");
        result.warnings = warnings;
        Ok(result)
    }

    async fn check_registered(&self, request: &DeploymentRequest) -> Result<(), Error> {
        let environment = &request.fasit_environment;
        if self
            .applications
            .environment_class(environment)
            .await?
            .is_none()
        {
            return Err(Error::NotRegistered {
                entity: "environment".to_string(),
                name: environment.clone(),
            });
        }

        if !self
            .applications
            .application_exists(&request.application)
            .await?
        {
            return Err(Error::NotRegistered {
                entity: "application".to_string(),
                name: request.application.clone(),
            });
        }
        Ok(())
    }

    async fn register(
        &self,
        request: &DeploymentRequest,
        resources: &[ResolvedResource],
    ) -> Result<(), Error> {
        let instance = ApplicationInstance {
            application: request.application.clone(),
            environment: request.fasit_environment.clone(),
            version: request.version.clone(),
            cluster_name: self.config.cluster_name.clone(),
            exposed_url: format!(
                "https://{}.{}",
                request.application, self.config.cluster_subdomain
            ),
            used_resources: resources.iter().map(|r| ResourceRef { id: r.id }).collect(),
        };
        self.applications
            .register_instance(&instance, &credentials_for(request))
            .await
    }

    /// Rollout verdict and view for an application, `None` if it has no Deployment
    #[instrument(skip(self))]
    pub async fn deployment_status(
        &self,
        namespace: &str,
        application: &str,
    ) -> Result<Option<(DeployStatus, StatusView)>, Error> {
        let deployment = self.store.get_deployment(application, namespace).await?;
        Ok(deployment.as_ref().map(status_view))
    }
}
