use axum::{Extension, Json, extract::State};
use std::sync::Arc;

use super::types::{ChangePasswordRequest, MessageResponse};
use super::{ApiError, ApiResponse, AppState};
use crate::services::CurrentUser;
use crate::workspace::UserSettings;

/// GET /settings
/// Current user's settings; baseline defaults on first access
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<UserSettings>>, ApiError> {
    let settings = state.workspaces.get_settings(&user.username).await?;
    Ok(Json(ApiResponse::success(settings)))
}

/// POST /settings
/// Replace the current user's settings document
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(settings): Json<UserSettings>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .workspaces
        .set_settings(&user.username, &settings)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Settings updated successfully".to_string(),
    })))
}

/// POST /settings/reset
/// Restore the baseline settings document
pub async fn reset_settings(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<UserSettings>>, ApiError> {
    let settings = state.workspaces.reset_settings(&user.username).await?;
    Ok(Json(ApiResponse::success(settings)))
}

/// POST /settings/password
/// Change own password (requires the old password)
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .identity
        .change_password(&user, &payload.old_password, &payload.new_password)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Password changed successfully".to_string(),
    })))
}
