//! HTTP error responses
//!
//! Every error renders as `{"detail": "..."}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cleanup::CleanupError;
use cleanup::accounts::OAuthError;
use log::error;

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    /// Server-side misconfiguration, reported with its message
    Unavailable(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(s) => (StatusCode::BAD_REQUEST, s),
            ApiError::NotFound(s) => (StatusCode::NOT_FOUND, s),
            ApiError::Unavailable(s) => (StatusCode::INTERNAL_SERVER_ERROR, s),
            ApiError::Internal(e) => {
                error!("Internal error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

impl From<CleanupError> for ApiError {
    fn from(e: CleanupError) -> Self {
        match e {
            CleanupError::NotFoundOrNotOwned => ApiError::NotFound("Account not found".to_string()),
            CleanupError::CredentialInvalid(_) => {
                ApiError::BadRequest("Account token invalid".to_string())
            }
            CleanupError::Validation(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.into()),
        }
    }
}

impl From<OAuthError> for ApiError {
    fn from(e: OAuthError) -> Self {
        match e {
            OAuthError::StateMismatch
            | OAuthError::MissingRefreshToken
            | OAuthError::MissingIdentity => ApiError::BadRequest(e.to_string()),
            OAuthError::Exchange(_) => {
                log::warn!("{:#}", e);
                ApiError::BadRequest("OAuth code exchange failed.".to_string())
            }
            OAuthError::Encryption(_) | OAuthError::Storage(_) => ApiError::Internal(e.into()),
        }
    }
}
