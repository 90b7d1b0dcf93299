//! # Initialization
//!
//! Controller startup: rustls setup, tracing, metrics registration, the
//! HTTP server for probes and metrics, the Kubernetes client, the
//! reconciler context, and the source index warm-up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::{error, info, warn};

use crate::config::ControllerConfig;
use crate::controller::reconciler::Reconciler;
use crate::crd::ArtifactGenerator;
use crate::constants;
use crate::observability::metrics;
use crate::observability::server::{start_server, ServerState};

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// API for ArtifactGenerator resources across all namespaces
    pub generators: Api<ArtifactGenerator>,
    /// Reconciler context
    pub reconciler: Arc<Reconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult").finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
pub async fn initialize() -> Result<InitializationResult> {
    // Configure rustls crypto provider FIRST, before any other operations.
    // Required for rustls 0.23+ when no default provider is set via features.
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "artifact_generator_controller=info".into()),
        )
        .init();

    let config = ControllerConfig::from_env();
    info!("starting Artifact Generator Controller");
    info!(
        storage = %config.storage_root.display(),
        hostname = config.storage_hostname.as_str(),
        lockdown = config.no_cross_namespace_refs,
        "configuration loaded"
    );

    metrics::register_metrics()?;

    let server_state = Arc::new(ServerState {
        is_ready: Arc::new(AtomicBool::new(false)),
    });

    let server_state_clone = Arc::clone(&server_state);
    let metrics_port = config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(metrics_port, server_state_clone).await {
            error!("HTTP server error: {e}");
        }
    });
    wait_for_server_ready(&server_state, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    // Watch all namespaces so generators can live anywhere
    let generators: Api<ArtifactGenerator> = Api::all(client.clone());

    let reconciler = Arc::new(Reconciler::new(client.clone(), config)?);

    warm_source_index(&generators, &reconciler).await;

    info!("controller initialized, starting watch loop...");
    Ok(InitializationResult {
        client,
        generators,
        reconciler,
        server_state,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let startup_timeout =
        std::time::Duration::from_secs(constants::DEFAULT_SERVER_STARTUP_TIMEOUT_SECS);
    let poll_interval =
        std::time::Duration::from_millis(constants::DEFAULT_SERVER_POLL_INTERVAL_MS);
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }
        if server_state.is_ready.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }
        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Populate the source index from every existing generator before the
/// watch starts, so the very first source event already dispatches.
///
/// The controller's initial list reconciles each of these resources right
/// after; a failure here only delays dispatch until then.
async fn warm_source_index(generators: &Api<ArtifactGenerator>, reconciler: &Arc<Reconciler>) {
    match generators.list(&ListParams::default()).await {
        Ok(list) => {
            info!(
                "found {} existing ArtifactGenerator resource(s)",
                list.items.len()
            );
            for generator in &list.items {
                reconciler.source_index.update_generator(generator);
            }
        }
        Err(e) => {
            error!("ArtifactGenerator CRD is not queryable: {e:?}. Is the CRD installed?");
            warn!("continuing despite CRD queryability check failure - controller will retry");
        }
    }
}
