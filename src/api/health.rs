//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::manager::ManagerStats;
use crate::mode::ManagerMode;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub mode: ManagerMode,
    pub connections: ConnectionHealthResponse,
}

#[derive(Debug, Serialize)]
pub struct ConnectionHealthResponse {
    pub total: usize,
    pub unique_users: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.manager.stats();

    // Emergency and degraded modes still serve traffic, but not at full guarantee
    let status = match stats.mode {
        ManagerMode::Unified | ManagerMode::Isolated => "healthy",
        ManagerMode::Emergency | ManagerMode::Degraded => "degraded",
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        mode: stats.mode,
        connections: ConnectionHealthResponse {
            total: stats.connections.total_connections,
            unique_users: stats.connections.unique_users,
        },
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<ManagerStats> {
    Json(state.manager.stats())
}
