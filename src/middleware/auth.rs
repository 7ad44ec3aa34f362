//! # Authentication Guards
//!
//! Two composable guards, layered in order:
//! - `require_auth`: the session has a logged-in user
//! - `require_webauthn`: the session also completed an assertion with a
//!   credential that still exists and still belongs to that user

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tower_sessions::Session;

use crate::error::AppError;
use crate::session;
use crate::state::AppState;
use crate::webauthn::types::base64url_decode;
use crate::webauthn::CredentialStore;

pub async fn require_auth(
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match session::user_id(&session).await? {
        Some(_) => Ok(next.run(request).await),
        None => Err(AppError::Unauthorized("Not authenticated".to_string())),
    }
}

pub async fn require_webauthn(
    State(state): State<AppState>,
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let not_verified = || AppError::Unauthorized("WebAuthn verification required".to_string());

    let user_id = session::user_id(&session)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))?;
    let marker: String = session
        .get(session::WEBAUTH_CREDENTIAL_ID)
        .await?
        .ok_or_else(not_verified)?;
    let credential_id = base64url_decode(&marker).map_err(|_| not_verified())?;

    match state.rp.credentials().find_by_credential_id(&credential_id).await? {
        Some(credential) if credential.user_id == user_id => Ok(next.run(request).await),
        _ => {
            // Credential was deleted or reassigned since the assertion
            session.remove::<String>(session::WEBAUTH_CREDENTIAL_ID).await?;
            Err(not_verified())
        }
    }
}
