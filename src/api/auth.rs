use axum::{
    Extension, Json,
    extract::{Path, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState};
use super::types::{
    AuthStatusDto, LoginRequest, MessageResponse, RegisterRequest, SessionDto, SetupRequest,
    UserDto,
};
use crate::services::{CurrentUser, IdentityError};

// ============================================================================
// Middleware
// ============================================================================

/// Bearer-token middleware for all protected routes.
///
/// Verifies the token signature and expiry, re-resolves the subject
/// against the credential store, and attaches the [`CurrentUser`] to the
/// request. Every failure short-circuits with 401 before any handler
/// runs — including a valid signature whose subject has been deleted.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    let Some(token) = extract_bearer(&headers) else {
        return Err(ApiError::unauthorized("TokenInvalid", "Not authenticated"));
    };

    let user = state.identity.resolve_token(&token).await.map_err(|err| {
        match err {
            // A deleted user's outstanding token is an auth failure, not
            // a missing resource.
            IdentityError::UserNotFound => {
                ApiError::unauthorized("TokenInvalid", "Token subject no longer exists")
            }
            other => other.into(),
        }
    })?;

    tracing::Span::current().record("user_id", &user.username);
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Extract the token from `Authorization: Bearer <token>`.
fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get("Authorization")
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
    {
        return Some(token.trim().to_string());
    }

    None
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /auth/status
/// Report whether first-run setup is still required
pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<AuthStatusDto>>, ApiError> {
    let setup_required = state.identity.setup_required().await?;

    Ok(Json(ApiResponse::success(AuthStatusDto {
        setup_required,
        version: env!("CARGO_PKG_VERSION"),
    })))
}

/// POST /auth/setup
/// One-time bootstrap: create the admin account and log it in
pub async fn setup(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SetupRequest>,
) -> Result<Json<ApiResponse<SessionDto>>, ApiError> {
    let session = state
        .identity
        .setup(&payload.username, &payload.password)
        .await?;

    Ok(Json(ApiResponse::success(SessionDto {
        token: session.token,
        username: session.username,
        is_admin: session.is_admin,
    })))
}

/// POST /auth/login
/// Authenticate with username and password, returns a session token
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<SessionDto>>, ApiError> {
    let session = state
        .identity
        .login(&payload.username, &payload.password)
        .await?;

    Ok(Json(ApiResponse::success(SessionDto {
        token: session.token,
        username: session.username,
        is_admin: session.is_admin,
    })))
}

/// POST /auth/logout
/// Tokens are stateless; logout is the client discarding its copy
pub async fn logout(
    Extension(user): Extension<CurrentUser>,
) -> Json<ApiResponse<MessageResponse>> {
    tracing::info!("User '{}' logged out", user.username);

    Json(ApiResponse::success(MessageResponse {
        message: "Logged out successfully".to_string(),
    }))
}

/// GET /auth/me
/// Current user information
pub async fn get_current_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    let info = state.identity.user_info(&user.username).await?;

    Ok(Json(ApiResponse::success(UserDto {
        username: info.username,
        is_admin: info.is_admin,
        created_at: info.created_at,
    })))
}

/// POST /auth/register
/// Create a new regular user (admin only)
pub async fn register(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let created = state
        .identity
        .register(&user, &payload.username, &payload.password)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: format!("User '{}' created successfully", created.username),
    })))
}

/// GET /auth/users
/// List all users (admin only)
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<Vec<UserDto>>>, ApiError> {
    let users = state.identity.list_users(&user).await?;

    let users = users
        .into_iter()
        .map(|u| UserDto {
            username: u.username,
            is_admin: u.is_admin,
            created_at: u.created_at,
        })
        .collect();

    Ok(Json(ApiResponse::success(users)))
}

/// DELETE /auth/users/{username}
/// Delete a user (admin only). Workspace data is retained.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(username): Path<String>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state.identity.delete_user(&user, &username).await?;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: format!("User '{username}' deleted successfully"),
    })))
}
