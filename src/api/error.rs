use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use super::ApiResponse;
use crate::services::{IdentityError, SessionError, TranslateError};
use crate::workspace::WorkspaceError;

#[derive(Debug)]
pub enum ApiError {
    /// 400 — request fails validation or the bootstrap state machine.
    Validation { kind: &'static str, detail: String },

    /// 401 — missing/expired/invalid token, or failed login.
    Unauthorized { kind: &'static str, detail: String },

    /// 403 — authenticated but not allowed.
    Forbidden(String),

    /// 404 — the resource does not exist for this user.
    NotFound(String),

    /// 409 — duplicate user or last-admin conflicts.
    Conflict { kind: &'static str, detail: String },

    /// 500 — store or engine infrastructure failure.
    Internal(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { kind, detail }
            | Self::Unauthorized { kind, detail }
            | Self::Conflict { kind, detail } => write!(f, "{kind}: {detail}"),
            Self::Forbidden(msg) => write!(f, "Forbidden: {msg}"),
            Self::NotFound(msg) => write!(f, "Not found: {msg}"),
            Self::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, detail) = match self {
            Self::Validation { kind, detail } => (StatusCode::BAD_REQUEST, kind, detail),
            Self::Unauthorized { kind, detail } => (StatusCode::UNAUTHORIZED, kind, detail),
            Self::Forbidden(detail) => (StatusCode::FORBIDDEN, "Forbidden", detail),
            Self::NotFound(detail) => (StatusCode::NOT_FOUND, "NotFound", detail),
            Self::Conflict { kind, detail } => (StatusCode::CONFLICT, kind, detail),
            Self::Internal(detail) => {
                tracing::error!("Internal error: {detail}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ApiResponse::<()>::error(kind, detail);
        (status, Json(body)).into_response()
    }
}

impl ApiError {
    pub fn validation(kind: &'static str, detail: impl Into<String>) -> Self {
        Self::Validation {
            kind,
            detail: detail.into(),
        }
    }

    pub fn unauthorized(kind: &'static str, detail: impl Into<String>) -> Self {
        Self::Unauthorized {
            kind,
            detail: detail.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        let detail = err.to_string();
        match err {
            IdentityError::SetupRequired => Self::validation("SetupRequired", detail),
            IdentityError::AlreadyInitialized => Self::validation("AlreadyInitialized", detail),
            IdentityError::InvalidUsername(_) => Self::validation("InvalidUsername", detail),
            IdentityError::WeakPassword => Self::validation("WeakPassword", detail),
            IdentityError::DuplicateUser => Self::Conflict {
                kind: "DuplicateUser",
                detail,
            },
            IdentityError::UserNotFound => Self::NotFound(detail),
            IdentityError::InvalidCredentials => Self::unauthorized("InvalidCredentials", detail),
            IdentityError::Forbidden => Self::Forbidden(detail),
            IdentityError::CannotDeleteSelf => Self::Conflict {
                kind: "CannotDeleteSelf",
                detail,
            },
            IdentityError::LastAdmin => Self::Conflict {
                kind: "LastAdminError",
                detail,
            },
            IdentityError::Session(err) => err.into(),
            IdentityError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Expired => Self::unauthorized("TokenExpired", "Token expired"),
            SessionError::Invalid => Self::unauthorized("TokenInvalid", "Token invalid"),
            SessionError::Signing(msg) => Self::Internal(msg),
        }
    }
}

impl From<WorkspaceError> for ApiError {
    fn from(err: WorkspaceError) -> Self {
        match err {
            WorkspaceError::NotFound => Self::NotFound("Task not found".to_string()),
            WorkspaceError::Io(e) => Self::Internal(e.to_string()),
            WorkspaceError::Corrupt(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<TranslateError> for ApiError {
    fn from(err: TranslateError) -> Self {
        match err {
            TranslateError::NotFound => Self::NotFound("Task not found".to_string()),
            TranslateError::FileNotFound => Self::NotFound("File not found".to_string()),
            TranslateError::Workspace(e) => e.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}
