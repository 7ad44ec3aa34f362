//! # Error Handling
//!
//! Application errors and their conversion into HTTP responses.
//!
//! Ceremony failures arrive as [`CeremonyError`] and are mapped to status
//! codes here. The precise verification reason is logged but never sent to
//! the client; a browser only learns that the ceremony failed.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::webauthn::CeremonyError;

/// Application-wide error type
///
/// `#[from]` lets handlers use `?` on database, ceremony and JSON results.
#[derive(Error, Debug)]
pub enum AppError {
    /// Database errors outside the ceremony stores
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Registration or authentication ceremony failures
    #[error("WebAuthn error: {0}")]
    WebAuthn(#[from] CeremonyError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Session store failures
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Client sent invalid data (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Not logged in, or second factor missing (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource already exists (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Status code and client-facing message for a ceremony failure.
fn ceremony_status(error: &CeremonyError) -> (StatusCode, &'static str) {
    match error {
        CeremonyError::MissingChallenge => (StatusCode::BAD_REQUEST, "No ceremony in progress"),
        CeremonyError::ChallengeExpired => (StatusCode::BAD_REQUEST, "Ceremony timed out"),
        CeremonyError::AttestationVerificationFailed(_) => {
            (StatusCode::BAD_REQUEST, "Registration failed")
        }
        CeremonyError::UnknownCredential | CeremonyError::AssertionVerificationFailed(_) => {
            (StatusCode::UNAUTHORIZED, "Authentication failed")
        }
        CeremonyError::PossibleCloneDetected { .. } => {
            (StatusCode::FORBIDDEN, "Authenticator rejected")
        }
        CeremonyError::DuplicateCredential => {
            (StatusCode::CONFLICT, "Authenticator is already registered")
        }
        CeremonyError::StorageConflict => {
            (StatusCode::CONFLICT, "Concurrent authentication, try again")
        }
        CeremonyError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
    }
}

/// Convert AppError into an HTTP response
///
/// Internal details are logged; the JSON body is `{ "error": "..." }` with
/// a message that is safe to show.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
            AppError::WebAuthn(e) => {
                let (status, message) = ceremony_status(e);
                match e {
                    CeremonyError::Storage(inner) => {
                        tracing::error!("Ceremony storage error: {:?}", inner)
                    }
                    CeremonyError::PossibleCloneDetected { .. } => {
                        tracing::warn!("WebAuthn error: {}", e)
                    }
                    _ => tracing::info!("WebAuthn error: {}", e),
                }
                (status, message.to_string())
            }
            AppError::Serialization(e) => {
                tracing::error!("Serialization error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Serialization error".to_string())
            }
            AppError::Session(e) => {
                tracing::error!("Session error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Session error".to_string())
            }
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
