use std::collections::HashMap;
use std::sync::Arc;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use beacon::{DiscoveryEngine, ManagedServiceInfo};
use shared::protocol::API_PREFIX;
use shared::types::DirectoryEntry;
use crate::directory_manager::DirectoryHandle;

#[derive(Clone)]
pub struct AppState {
    pub directory: DirectoryHandle,
    pub hash_rx: watch::Receiver<String>,
    pub engine: Arc<DiscoveryEngine>,
    /// Payload served by the call endpoint, keyed by announced service name
    pub payloads: Arc<HashMap<String, String>>,
}

#[derive(Serialize)]
pub struct ConfigResponse {
    pub hostname: String,
    pub group: String,
    pub port: u16,
    pub announce_interval_secs: u64,
    pub discovery_interval_secs: u64,
    pub stale_after_secs: u64,
}

#[derive(Deserialize)]
pub struct ServiceQuery {
    pub role: Option<String>,
}

pub fn router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/config", get(get_config))
        .route("/managed", get(get_managed))
        .route("/services", get(get_services))
        .route("/services/hash", get(get_hash))
        .route("/services/:name", get(get_service))
        .route("/call/:name", get(call_service));

    Router::new().nest(API_PREFIX, v1).with_state(state)
}

async fn get_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    let config = state.engine.config();
    Json(ConfigResponse {
        hostname: state.engine.hostname().to_string(),
        group: config.group.to_string(),
        port: config.port,
        announce_interval_secs: config.announce_interval_secs,
        discovery_interval_secs: config.discovery_interval_secs,
        stale_after_secs: config.stale_after_secs,
    })
}

async fn get_managed(
    State(state): State<AppState>,
) -> Result<Json<Vec<ManagedServiceInfo>>, StatusCode> {
    state.engine.services().await.map(Json).map_err(|e| {
        tracing::error!("Failed to list managed services: {}", e);
        StatusCode::SERVICE_UNAVAILABLE
    })
}

async fn get_services(
    State(state): State<AppState>,
    Query(params): Query<ServiceQuery>,
) -> Result<Json<Vec<DirectoryEntry>>, StatusCode> {
    let entries = if let Some(role) = params.role {
        state.directory.get_by_role(role).await
    } else {
        state.directory.get_all().await
    };

    entries
        .map(Json)
        .map_err(|e| {
            tracing::error!("Failed to query directory: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

async fn get_hash(State(state): State<AppState>) -> String {
    state.hash_rx.borrow().clone()
}

async fn get_service(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<DirectoryEntry>>, StatusCode> {
    let entries = state
        .directory
        .get_by_name(name)
        .await
        .map_err(|e| {
            tracing::error!("Failed to query directory: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    if entries.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(entries))
}

async fn call_service(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<String, StatusCode> {
    state.payloads.get(&name).cloned().ok_or(StatusCode::NOT_FOUND)
}
