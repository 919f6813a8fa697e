use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State},
    http::header,
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::types::{MessageResponse, TranslateDto, TranslateRequest, UploadDto};
use super::{ApiError, ApiResponse, AppState};
use crate::services::{CurrentUser, TaskState};
use crate::workspace::HistoryRecord;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    pub file_type: Option<String>,
}

/// POST /upload
/// Store a PDF in the current user's uploads area
pub async fn upload(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<UploadDto>>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation("InvalidUpload", e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload.pdf").to_string();
        if !filename.to_ascii_lowercase().ends_with(".pdf") {
            return Err(ApiError::validation(
                "InvalidUpload",
                "Only PDF files are allowed",
            ));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation("InvalidUpload", e.to_string()))?;

        let file_id = Uuid::new_v4();
        state
            .workspaces
            .save_upload(&user.username, file_id, &filename, &bytes)
            .await?;

        tracing::info!(
            "User '{}' uploaded '{}' ({} bytes)",
            user.username,
            filename,
            bytes.len()
        );

        return Ok(Json(ApiResponse::success(UploadDto { file_id, filename })));
    }

    Err(ApiError::validation(
        "InvalidUpload",
        "Multipart field 'file' is required",
    ))
}

/// POST /translate
/// Queue a translation job for an uploaded file
pub async fn start_translation(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<TranslateRequest>,
) -> Result<Json<ApiResponse<TranslateDto>>, ApiError> {
    let task_id = state
        .translations
        .start(&user.username, payload.file_id, payload.settings)
        .await?;

    Ok(Json(ApiResponse::success(TranslateDto { task_id })))
}

/// GET /translate/status/{task_id}
/// Live status of one job (owner only)
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<ApiResponse<TaskState>>, ApiError> {
    let task = state.translations.status(&user.username, task_id).await?;
    Ok(Json(ApiResponse::success(task)))
}

/// GET /translate/history
/// The current user's translation history, append order
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<Vec<HistoryRecord>>>, ApiError> {
    let history = state.workspaces.history(&user.username).await?;
    Ok(Json(ApiResponse::success(history)))
}

/// DELETE /translate/history/{task_id}
/// Remove a history entry along with its artifacts
pub async fn delete_history_item(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .workspaces
        .delete_history_item(&user.username, task_id)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "History entry deleted".to_string(),
    })))
}

/// GET /translate/download/{task_id}?file_type=mono|dual
/// Serve an output PDF of a completed job
pub async fn download(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(task_id): Path<Uuid>,
    Query(query): Query<DownloadQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .workspaces
        .find_history_item(&user.username, task_id)
        .await?;

    let outputs = record.outputs.as_ref().ok_or_else(|| {
        ApiError::validation("NotCompleted", "Translation has not completed")
    })?;

    let file_type = query.file_type.as_deref().unwrap_or("mono");
    let path = match file_type {
        "mono" => &outputs.mono,
        "dual" => &outputs.dual,
        other => {
            return Err(ApiError::validation(
                "InvalidFileType",
                format!("Unknown file type '{other}', expected 'mono' or 'dual'"),
            ));
        }
    };

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|_| ApiError::NotFound("Output file not found".to_string()))?;

    let name = std::path::Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("translated.pdf");
    let mime = mime_guess::from_path(path).first_or_octet_stream();

    let headers = [
        (header::CONTENT_TYPE, mime.as_ref().to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{name}\""),
        ),
    ];

    Ok((headers, bytes))
}
