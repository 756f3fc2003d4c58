//! Command line and environment configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use deckhand_common::DEFAULT_BIND_ADDRESS;
use deckhand_deploy::DeployerConfig;

/// deckhand - deploy API for applications on Kubernetes
#[derive(Parser, Debug, Clone)]
#[command(name = "deckhand", version, about, long_about = None)]
pub struct Cli {
    /// Address the HTTP server listens on
    #[arg(long, env = "DECKHAND_BIND_ADDRESS", default_value = DEFAULT_BIND_ADDRESS)]
    pub bind_address: SocketAddr,

    /// Path to a kubeconfig; in-cluster configuration is inferred when unset
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Base URL of the Fasit resource registry
    #[arg(long, env = "FASIT_URL")]
    pub fasit_url: String,

    /// Subdomain ingress hosts are created under
    #[arg(long, env = "CLUSTER_SUBDOMAIN")]
    pub cluster_subdomain: String,

    /// Name this cluster is registered under in Fasit
    #[arg(long, env = "CLUSTER_NAME", default_value = "local")]
    pub cluster_name: String,

    /// Timeout for registry and manifest requests, in seconds
    #[arg(long, env = "DECKHAND_HTTP_TIMEOUT_SECS", default_value_t = 30)]
    pub http_timeout_secs: u64,
}

/// Settings for the HTTP server and its outbound clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listen address
    pub bind_address: SocketAddr,
    /// Kubeconfig path, if any
    pub kubeconfig: Option<PathBuf>,
    /// Fasit base URL
    pub fasit_url: String,
    /// Outbound HTTP timeout
    pub http_timeout: Duration,
}

impl Cli {
    /// Split into server and deployer settings
    pub fn into_config(self) -> (ServerConfig, DeployerConfig) {
        (
            ServerConfig {
                bind_address: self.bind_address,
                kubeconfig: self.kubeconfig,
                fasit_url: self.fasit_url,
                http_timeout: Duration::from_secs(self.http_timeout_secs),
            },
            DeployerConfig {
                cluster_subdomain: self.cluster_subdomain,
                cluster_name: self.cluster_name,
            },
        )
    }
}
