mod config;
mod directory;
mod directory_manager;
mod discovery;
mod api;

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use beacon::DiscoveryEngine;
use crate::config::Config;
use crate::directory::store::DirectoryStore;
use crate::directory_manager::DirectoryHandle;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("beacond=info,beacon=info"))
        )
        .init();

    tracing::info!("Starting beacond");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/lanbeacon/beacond.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    // Directory starts empty every run
    let store = DirectoryStore::new();
    let initial_hash = directory::hash::compute_hash(&[]);
    let (hash_tx, hash_rx) = watch::channel(initial_hash);
    let directory = DirectoryHandle::spawn(store, hash_tx);

    // Join the multicast group
    let engine = Arc::new(
        DiscoveryEngine::start(config.discovery.clone())
            .context("Failed to start discovery engine")?,
    );

    // Subscribe before announcing so our own first announcement is seen
    let subscription = engine.subscribe();

    let managed = discovery::advertise::register_services(&engine, &config.announce, &config.discover).await?;
    tracing::info!(count = managed.len(), ids = ?managed, "Managed services registered");

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Spawn discovery listener task
    let (listener_tx, listener_rx) = mpsc::channel(256);
    let listener_cancel = cancel.clone();
    let listener_handle = tokio::spawn(async move {
        if let Err(e) = discovery::listener::run_listener(subscription, listener_tx, listener_cancel).await {
            tracing::error!("Discovery listener error: {}", e);
        }
    });

    // Spawn directory manager task
    let mgr_cancel = cancel.clone();
    let mgr_config = config.directory.clone();
    let mgr_directory = directory.clone();
    let mgr_handle = tokio::spawn(async move {
        if let Err(e) = directory_manager::run(mgr_directory, listener_rx, mgr_config, mgr_cancel).await {
            tracing::error!("Directory manager error: {}", e);
        }
    });

    // Build API router
    let payloads: HashMap<String, String> = config
        .announce
        .iter()
        .filter_map(|s| s.payload.clone().map(|p| (s.name.clone(), p)))
        .collect();
    let app_state = api::routes::AppState {
        directory: directory.clone(),
        hash_rx,
        engine: engine.clone(),
        payloads: Arc::new(payloads),
    };
    let app = api::routes::router(app_state);

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    // Run server with graceful shutdown
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    // Stop broadcasting before tearing anything else down
    if let Err(e) = discovery::advertise::unregister_services(&engine).await {
        tracing::error!("Failed to stop managed services: {}", e);
    }

    // Trigger cancellation
    cancel.cancel();

    // Wait for all tasks to complete
    let _ = tokio::join!(listener_handle, mgr_handle, server_handle);

    // Shutdown directory thread
    if let Err(e) = directory.shutdown().await {
        tracing::error!("Failed to shutdown directory: {}", e);
    }

    // Leave the group and complete the event stream
    engine.dispose();

    tracing::info!("Shutdown complete");
    Ok(())
}
