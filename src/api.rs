use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::{
    error::AppError,
    models::{AddNetworkRequest, AppState, NetworkView, SharedState, TokenData},
};

/// Build the HTTP router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/networks", get(list_networks))
        .route("/network/add", post(add_network))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Networks with discovered clusters, busiest first
pub async fn list_networks(state: SharedState) -> Json<Vec<NetworkView>> {
    let snapshot = state.networks.read();

    let mut networks: Vec<NetworkView> = state
        .db
        .token_list()
        .into_iter()
        .filter_map(|token| {
            let network = snapshot.get(&token)?;
            if network.clusters.is_empty() {
                return None;
            }

            let data = state.db.get(&token).unwrap_or_default();
            Some(NetworkView {
                token,
                name: data.name,
                description: data.description,
                clusters: network.clusters.clone(),
            })
        })
        .collect();

    // Stable sort, ties keep token order
    networks.sort_by_key(|n| std::cmp::Reverse(worker_count(n)));

    Json(networks)
}

fn worker_count(network: &NetworkView) -> usize {
    network.clusters.iter().map(|c| c.workers.len()).sum()
}

#[derive(Debug, Serialize)]
pub struct AddNetworkResponse {
    pub message: String,
}

/// Register a new network token
pub async fn add_network(
    state: SharedState,
    Json(req): Json<AddNetworkRequest>,
) -> Result<Json<AddNetworkResponse>, AppError> {
    let token = req.token.trim();
    if token.is_empty() {
        return Err(AppError::ValidationError("Token is required".to_string()));
    }
    if req.name.trim().is_empty() {
        return Err(AppError::ValidationError("Name is required".to_string()));
    }
    if req.description.trim().is_empty() {
        return Err(AppError::ValidationError(
            "Description is required".to_string(),
        ));
    }

    state.db.add(
        token,
        TokenData {
            name: req.name.trim().to_string(),
            description: req.description.trim().to_string(),
        },
    )?;

    tracing::info!("Registered network {}", req.name.trim());

    Ok(Json(AddNetworkResponse {
        message: "Network added".to_string(),
    }))
}
