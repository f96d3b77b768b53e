//! Per-user connection inspection and delivery endpoints.

use std::time::Duration;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::connection_manager::{ConnectionInfo, UserConnectionInfo};
use crate::delivery::DeliveryReport;
use crate::error::{AppError, Result};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct ConnectionDetail {
    pub user_id: String,
    #[serde(flatten)]
    pub info: ConnectionInfo,
}

/// GET /api/v1/connections/{connection_id}
pub async fn connection(
    State(state): State<AppState>,
    Path(connection_id): Path<String>,
) -> Result<Json<ConnectionDetail>> {
    let conn = state
        .manager
        .get_connection(&connection_id)
        .ok_or_else(|| AppError::NotFound(format!("connection {}", connection_id)))?;

    Ok(Json(ConnectionDetail {
        user_id: conn.user_id.to_string(),
        info: ConnectionInfo::from(conn.as_ref()),
    }))
}

/// GET /api/v1/users/{user_id}/connections
///
/// Unknown users get an empty list.
pub async fn user_connections(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<UserConnectionInfo> {
    let info = state
        .manager
        .user_info(&user_id)
        .unwrap_or_else(|| UserConnectionInfo {
            user_id,
            connection_count: 0,
            connections: Vec::new(),
        });
    Json(info)
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub message: serde_json::Value,
    /// Wait this long for the user to connect before giving up. Capped at
    /// the configured `delivery.wait_timeout_ms`.
    #[serde(default)]
    pub wait_timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub user_id: String,
    pub sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<DeliveryReport>,
}

/// POST /api/v1/users/{user_id}/send
pub async fn send_to_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<SendRequest>,
) -> Result<Json<SendResponse>> {
    if user_id.trim().is_empty() {
        return Err(AppError::Validation("user_id must not be empty".to_string()));
    }

    let response = match request.wait_timeout_ms {
        Some(wait_ms) => {
            let wait = Duration::from_millis(wait_ms).min(state.manager.delivery_config().wait_timeout);
            let sent = state
                .manager
                .send_to_user_with_wait(&user_id, request.message, wait)
                .await;
            SendResponse {
                user_id,
                sent,
                report: None,
            }
        }
        None => {
            let report = state.manager.send_to_user(&user_id, request.message).await;
            SendResponse {
                user_id,
                sent: report.delivered > 0,
                report: Some(report),
            }
        }
    };

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub message: serde_json::Value,
}

/// POST /api/v1/broadcast
pub async fn broadcast(
    State(state): State<AppState>,
    Json(request): Json<BroadcastRequest>,
) -> Json<DeliveryReport> {
    Json(state.manager.broadcast(request.message).await)
}
