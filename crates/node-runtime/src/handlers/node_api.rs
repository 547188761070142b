//! # Node API
//!
//! Local status endpoints for operators and the forger process:
//!
//! - `GET /node/status`  sync status, last network state, peer counts
//! - `GET /node/forging` whether this node may forge in the current slot
//! - `GET /metrics`      Prometheus text exposition
//! - `GET /health`       503 once the sync loop has exited

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use dc_01_peer_network::{NetworkState, PeerNetworkContext};
use dc_02_block_sync::{ForgerHooks, ForgingPermission, SyncState, SyncStatus};
use serde::Serialize;
use tracing::warn;

#[derive(Clone)]
pub struct NodeApiState {
    pub hooks: Arc<dyn ForgerHooks>,
    pub network: Arc<PeerNetworkContext>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatusResponse {
    pub sync: SyncStatus,
    pub network: Option<NetworkState>,
    pub known_peers: usize,
    pub eligible_peers: usize,
}

pub fn node_router(state: NodeApiState) -> Router {
    Router::new()
        .route("/node/status", get(node_status))
        .route("/node/forging", get(forging))
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .with_state(state)
}

async fn node_status(State(state): State<NodeApiState>) -> Json<NodeStatusResponse> {
    Json(NodeStatusResponse {
        sync: state.hooks.status(),
        network: state.hooks.network_state(),
        known_peers: state.network.repository.count(),
        eligible_peers: state.network.eligible_peers().len(),
    })
}

async fn forging(State(state): State<NodeApiState>) -> Json<ForgingPermission> {
    Json(state.hooks.forging_permission(state.network.now()))
}

async fn metrics() -> Response {
    match node_telemetry::encode_metrics() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            warn!("[node] cannot encode metrics: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn health(State(state): State<NodeApiState>) -> Response {
    match state.hooks.status().state {
        SyncState::Exit | SyncState::Clean => {
            (StatusCode::SERVICE_UNAVAILABLE, "sync stopped").into_response()
        }
        _ => (StatusCode::OK, "ok").into_response(),
    }
}
