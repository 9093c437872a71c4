//! HTTP route handlers for the gateway control API.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use mirage_common::{BlockRequest, BlockResponse, CleanupRequest, CleanupResponse};

use crate::proxy;
use crate::state::AppState;

mod health;

/// Create the main application router.
///
/// Everything outside the control prefix and `/health` falls through to the
/// reverse proxy.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/block_ip", post(block_ip))
        .route("/api/cleanup", post(cleanup))
        .route("/api/stats", get(health::stats))
        .route("/health", get(health::health_check))
        .fallback(proxy::handle)
        .with_state(state)
}

/// Install or overwrite a block entry for a source address
async fn block_ip(
    State(state): State<AppState>,
    Json(payload): Json<BlockRequest>,
) -> Result<Json<BlockResponse>, (StatusCode, String)> {
    let decoy_count = payload.decoy_urls.len();

    state
        .blocks
        .install(payload.source_ip.clone(), payload.decoy_urls.clone())
        .await
        .map_err(|e| (StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_REQUEST), e.to_string()))?;

    Ok(Json(BlockResponse {
        success: true,
        message: format!(
            "IP {} blocked and routed to {} decoy URLs",
            payload.source_ip, decoy_count
        ),
        source_ip: payload.source_ip,
        decoy_urls: payload.decoy_urls,
    }))
}

/// Remove a block entry, if present
async fn cleanup(
    State(state): State<AppState>,
    Json(payload): Json<CleanupRequest>,
) -> Result<Json<CleanupResponse>, (StatusCode, String)> {
    if payload.source_ip.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "source_ip is required".to_string()));
    }

    let removed = state.blocks.clear(&payload.source_ip).await;

    Ok(Json(CleanupResponse {
        success: removed,
        message: format!("IP {} cleanup result", payload.source_ip),
        source_ip: payload.source_ip,
        removed,
    }))
}
