use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::SettingsOverlay;

/// Machine-readable error kind plus human-readable detail. The kind is
/// the wire contract; the detail is advisory.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(kind: &'static str, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                kind,
                detail: detail.into(),
            }),
        }
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthStatusDto {
    pub setup_required: bool,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SessionDto {
    pub token: String,
    pub username: String,
    pub is_admin: bool,
}

#[derive(Debug, Serialize)]
pub struct UserDto {
    pub username: String,
    pub is_admin: bool,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct UploadDto {
    pub file_id: Uuid,
    pub filename: String,
}

#[derive(Debug, Deserialize)]
pub struct TranslateRequest {
    pub file_id: Uuid,
    #[serde(default)]
    pub settings: SettingsOverlay,
}

#[derive(Debug, Serialize)]
pub struct TranslateDto {
    pub task_id: Uuid,
}
