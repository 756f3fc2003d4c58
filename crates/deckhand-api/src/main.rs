//! deckhand - deploy API for applications on Kubernetes

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use deckhand_api::{start_server, AppState, Cli};
use deckhand_common::kube_utils::create_client;
use deckhand_common::telemetry::{init_telemetry, TelemetryConfig};
use deckhand_deploy::{Deployer, FasitClient, HttpManifestSource, KubeObjectStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (server, deployer_config) = Cli::parse().into_config();

    let _telemetry = init_telemetry(TelemetryConfig {
        cluster_name: Some(deployer_config.cluster_name.clone()),
        ..Default::default()
    })?;

    let client = create_client(server.kubeconfig.as_deref())
        .await
        .context("failed to create Kubernetes client")?;

    let fasit = Arc::new(
        FasitClient::new(server.fasit_url.clone(), server.http_timeout)
            .context("failed to create Fasit client")?,
    );
    let manifests = Arc::new(
        HttpManifestSource::new(server.http_timeout)
            .context("failed to create manifest client")?,
    );
    let store = Arc::new(KubeObjectStore::new(client));

    info!(
        fasit_url = %server.fasit_url,
        cluster_name = %deployer_config.cluster_name,
        cluster_subdomain = %deployer_config.cluster_subdomain,
        "deckhand starting"
    );

    let deployer = Arc::new(Deployer::new(
        manifests,
        fasit.clone(),
        fasit,
        store,
        deployer_config,
    ));
    let state = AppState {
        deployer: deployer.clone(),
        status: deployer,
    };

    start_server(server.bind_address, state, shutdown_signal()).await?;
    info!("deckhand stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
