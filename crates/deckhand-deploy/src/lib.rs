//! Deployment pipeline for deckhand
//!
//! Turns a [`DeploymentRequest`] into reconciled Kubernetes objects:
//!
//! 1. merge deprecated request fields and validate ([`request`])
//! 2. fetch the application manifest ([`manifest`])
//! 3. resolve declared resources and the trust store from the registry
//!    ([`registry`], [`resolver`])
//! 4. compile and apply Deployment, Secret, Service, Ingress and
//!    HorizontalPodAutoscaler ([`workload`], [`reconcile`], [`store`])
//!
//! [`status`] classifies rollouts on the read path. [`Deployer`] ties it all
//! together.

#![deny(missing_docs)]

pub mod deployer;
pub mod env;
pub mod error;
pub mod manifest;
pub mod reconcile;
pub mod registry;
pub mod request;
pub mod resolver;
pub mod status;
pub mod store;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod workload;

pub use deployer::{Deployer, DeployerConfig};
pub use error::Error;
pub use manifest::{ApplicationManifest, HttpManifestSource, ManifestSource};
pub use reconcile::{create_or_update_k8s_resources, DeploymentResult, ObjectKind};
pub use registry::{ApplicationRegistry, FasitClient, ResolvedResource, ResourceRegistry};
pub use request::DeploymentRequest;
pub use status::{DeployStatus, StatusView};
pub use store::{ClusterObjectStore, KubeObjectStore};

/// Result type alias using the deploy Error type
pub type Result<T> = std::result::Result<T, Error>;
