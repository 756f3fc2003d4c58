//! Common types for deckhand: errors, Kubernetes helpers and telemetry

#![deny(missing_docs)]

pub mod error;
pub mod kube_utils;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Label key used to select the pods of an application
///
/// Shared by the Deployment selector, the pod template labels and the
/// Service selector, so all three always agree.
pub const LABEL_APP: &str = "app";

/// Standard Kubernetes label for the tool managing a resource
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of [`LABEL_MANAGED_BY`] for resources deckhand creates
pub const LABEL_MANAGED_BY_DECKHAND: &str = "deckhand";

/// Default address for the deploy API HTTP server
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8081";
