//! Pipeline settings API handlers

use crate::error::AppError;
use crate::pipeline::settings::{validate_and_apply_settings_update, SettingsUpdateRequest};
use crate::pipeline::PipelineSettings;
use crate::state::SharedState;
use axum::{extract::State, response::Json};

/// GET /api/config - Current pipeline settings
pub async fn get_settings(State(state): State<SharedState>) -> Json<PipelineSettings> {
    Json(state.settings_snapshot().await)
}

/// POST /api/config - Update pipeline settings
///
/// Running sessions keep the snapshot they started with.
pub async fn update_settings(
    State(state): State<SharedState>,
    Json(request): Json<SettingsUpdateRequest>,
) -> Result<Json<PipelineSettings>, AppError> {
    let mut settings = state.settings.write().await;
    let updated = validate_and_apply_settings_update(settings.clone(), request)?;
    *settings = updated.clone();

    tracing::info!(settings = ?updated, "Pipeline settings updated");
    Ok(Json(updated))
}
