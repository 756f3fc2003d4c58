//! Seams between the HTTP handlers and the deploy pipeline
//!
//! Handlers only see these traits, so they can be tested with mocks.
//! [`Deployer`] implements both.

use async_trait::async_trait;
use deckhand_deploy::{Deployer, DeploymentRequest, DeploymentResult, DeployStatus, StatusView};
#[cfg(test)]
use mockall::automock;

/// Runs a deployment request end to end
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeployRunner: Send + Sync {
    /// Deploy one application version
    async fn deploy(
        &self,
        request: DeploymentRequest,
    ) -> Result<DeploymentResult, deckhand_deploy::Error>;
}

/// Reads the rollout state of a deployed application
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeployStatusViewer: Send + Sync {
    /// Verdict and view, `None` if the application has no Deployment
    async fn deployment_status(
        &self,
        namespace: &str,
        application: &str,
    ) -> Result<Option<(DeployStatus, StatusView)>, deckhand_deploy::Error>;
}

#[async_trait]
impl DeployRunner for Deployer {
    async fn deploy(
        &self,
        request: DeploymentRequest,
    ) -> Result<DeploymentResult, deckhand_deploy::Error> {
        Deployer::deploy(self, request).await
    }
}

#[async_trait]
impl DeployStatusViewer for Deployer {
    async fn deployment_status(
        &self,
        namespace: &str,
        application: &str,
    ) -> Result<Option<(DeployStatus, StatusView)>, deckhand_deploy::Error> {
        Deployer::deployment_status(self, namespace, application).await
    }
}
