//! Operating mode endpoints.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::mode::ManagerMode;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct ModeResponse {
    pub mode: ManagerMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<ManagerMode>,
}

#[derive(Debug, Deserialize)]
pub struct SetModeRequest {
    pub mode: String,
}

/// GET /api/v1/mode
pub async fn get_mode(State(state): State<AppState>) -> Json<ModeResponse> {
    Json(ModeResponse {
        mode: state.manager.mode(),
        previous: None,
    })
}

/// PUT /api/v1/mode
pub async fn set_mode(
    State(state): State<AppState>,
    Json(request): Json<SetModeRequest>,
) -> Result<Json<ModeResponse>> {
    let mode: ManagerMode = request
        .mode
        .parse()
        .map_err(|e: crate::mode::ParseModeError| AppError::Validation(e.to_string()))?;

    let previous = state.manager.set_mode(mode);

    Ok(Json(ModeResponse {
        mode,
        previous: Some(previous),
    }))
}
