//! Health and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use mirage_common::GatewayStats;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    service: &'static str,
    stats: GatewayStats,
}

/// Liveness plus the block-table summary
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "manager",
        stats: state.blocks.stats().await,
    })
}

/// Block-table statistics
pub async fn stats(State(state): State<AppState>) -> Json<GatewayStats> {
    Json(state.blocks.stats().await)
}
