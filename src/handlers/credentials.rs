//! # Credential Management
//!
//! Lets a user list and remove their own authenticators. Every lookup is
//! scoped to the session user; another user's credential ID behaves exactly
//! like one that does not exist.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use tower_sessions::Session;

use crate::db::models::Credential;
use crate::error::{AppError, AppResult};
use crate::session;
use crate::state::AppState;
use crate::webauthn::types::{base64url_decode, base64url_encode};
use crate::webauthn::CredentialStore;

/// What the device list shows. Public keys stay on the server.
#[derive(Debug, Serialize)]
pub struct CredentialSummary {
    pub id: String,
    pub name: String,
    pub algorithm: i64,
    pub attestation_format: String,
    pub transports: Vec<String>,
    pub backup_eligible: bool,
    pub backup_state: bool,
    pub created_at: String,
    pub last_used_at: Option<String>,
}

impl From<Credential> for CredentialSummary {
    fn from(c: Credential) -> Self {
        let transports = c.transports();
        Self {
            id: base64url_encode(&c.credential_id),
            name: c.name,
            algorithm: c.algorithm,
            attestation_format: c.attestation_format,
            transports,
            backup_eligible: c.backup_eligible,
            backup_state: c.backup_state,
            created_at: c.created_at,
            last_used_at: c.last_used_at,
        }
    }
}

async fn current_user_id(session: &Session) -> AppResult<String> {
    session::user_id(session)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))
}

/// GET /api/credentials
pub async fn list_credentials(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<Vec<CredentialSummary>>> {
    let user_id = current_user_id(&session).await?;

    let credentials = state.rp.credentials().find_by_user(&user_id).await?;
    Ok(Json(credentials.into_iter().map(CredentialSummary::from).collect()))
}

/// DELETE /api/credentials/{id}
///
/// Removing the credential that verified this session also drops the
/// session's second-factor marker.
pub async fn delete_credential(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let user_id = current_user_id(&session).await?;
    let credential_id = base64url_decode(&id)
        .map_err(|_| AppError::BadRequest("Credential ID must be base64url".to_string()))?;

    let deleted = state
        .rp
        .credentials()
        .delete_for_user(&user_id, &credential_id)
        .await?;
    if !deleted {
        return Err(AppError::NotFound("Credential not found".to_string()));
    }

    let verified_with: Option<String> = session.get(session::WEBAUTH_CREDENTIAL_ID).await?;
    if verified_with.as_deref() == Some(base64url_encode(&credential_id).as_str()) {
        session.remove::<String>(session::WEBAUTH_CREDENTIAL_ID).await?;
    }

    tracing::info!(user_id = %user_id, credential = %id, "deleted credential");
    Ok(Json(json!({ "success": true })))
}
