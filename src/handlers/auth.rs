//! # WebAuthn and Session Handlers
//!
//! ## Routes
//! - `POST /api/webauthn/register/start`: creation options for the logged-in user
//! - `POST /api/webauthn/register/finish`: verify attestation, store credential
//! - `POST /api/webauthn/authenticate/start`: request options
//! - `POST /api/webauthn/authenticate/finish`: verify assertion, mark the
//!   session as second-factor verified
//! - `POST /api/auth/logout`, `GET /api/auth/session`

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_sessions::Session;

use crate::db::users;
use crate::error::{AppError, AppResult};
use crate::session;
use crate::state::AppState;
use crate::webauthn::types::*;
use crate::webauthn::{CeremonyError, CredentialStore};

/// Longest label accepted for a credential.
pub const MAX_CREDENTIAL_NAME: usize = 250;

#[derive(Debug, Deserialize)]
pub struct RegistrationFinishRequest {
    pub name: String,
    pub credential: RegisterPublicKeyCredential,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuthenticationStartRequest {
    pub username: Option<String>,
}

async fn current_user_id(session: &Session) -> AppResult<String> {
    session::user_id(session)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))
}

// Registration endpoints

/// Start registering a new credential for the logged-in user
///
/// ## Route
/// POST /api/webauthn/register/start
///
/// ## Authentication
/// Requires a login (protected by `require_auth`)
///
/// ## Response
/// `CreationChallengeResponse`, ready for `navigator.credentials.create()`.
/// Credentials the user already owns are listed in `excludeCredentials`.
pub async fn register_start(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<CreationChallengeResponse>> {
    let user = users::find_by_id(&state.db, &current_user_id(&session).await?).await?;
    let key = session::ceremony_key(&session).await?;

    let options = state.rp.begin_registration(&key, &user).await?;
    Ok(Json(options))
}

/// Finish registration and store the new credential
///
/// ## Route
/// POST /api/webauthn/register/finish
///
/// ## Request
/// ```json
/// {
///   "name": "YubiKey",
///   "credential": { "id": "...", "rawId": "...", "type": "public-key", "response": { ... } }
/// }
/// ```
///
/// ## Errors
/// - BadRequest: empty or over-long name, missing or expired challenge,
///   attestation that does not verify
/// - Conflict: the credential ID is already registered
///
/// ## Security Note
/// Registering does not mark the session as verified. The user still has
/// to complete an assertion before `require_webauthn` lets them through.
pub async fn register_finish(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<RegistrationFinishRequest>,
) -> AppResult<Json<Value>> {
    let name = req.name.trim();
    if name.is_empty() || name.chars().count() > MAX_CREDENTIAL_NAME {
        return Err(AppError::BadRequest(format!(
            "Credential name must be 1 to {} characters",
            MAX_CREDENTIAL_NAME
        )));
    }

    let user = users::find_by_id(&state.db, &current_user_id(&session).await?).await?;
    let key = session::ceremony_key(&session).await?;

    let credential = state
        .rp
        .finish_registration(&key, &user, name, &req.credential)
        .await?;

    Ok(Json(json!({
        "success": true,
        "credential_id": base64url_encode(&credential.credential_id),
        "name": credential.name,
    })))
}

// Authentication endpoints

/// Start an assertion ceremony
///
/// The challenge is bound to the logged-in user, or to `username` when no
/// one is logged in. With neither, any discoverable credential may answer.
///
/// ## Route
/// POST /api/webauthn/authenticate/start
///
/// ## Request
/// Optional body: `{ "username": "alice" }`
pub async fn authenticate_start(
    State(state): State<AppState>,
    session: Session,
    body: Option<Json<AuthenticationStartRequest>>,
) -> AppResult<Json<RequestChallengeResponse>> {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let user = match (session::user_id(&session).await?, req.username) {
        (Some(user_id), _) => Some(users::find_by_id(&state.db, &user_id).await?),
        (None, Some(username)) => Some(users::find_by_username(&state.db, &username).await?),
        (None, None) => None,
    };
    let key = session::ceremony_key(&session).await?;

    let options = state.rp.begin_authentication(&key, user.as_ref()).await?;
    Ok(Json(options))
}

/// Finish an assertion ceremony
///
/// ## Route
/// POST /api/webauthn/authenticate/finish
///
/// ## How it works
/// 1. Verify the assertion and advance the stored counter
/// 2. Log the owner in if the session belongs to someone else
/// 3. Remember which credential verified the session
///
/// ## Response
/// ```json
/// { "success": true, "user_id": "...", "sign_count": 7 }
/// ```
///
/// ## Security Note
/// A counter that did not advance answers `403`. With `REVOKE_ON_CLONE`
/// set the credential is deleted as well, so neither copy works again.
pub async fn authenticate_finish(
    State(state): State<AppState>,
    session: Session,
    Json(credential): Json<PublicKeyCredential>,
) -> AppResult<Json<Value>> {
    let key = session::ceremony_key(&session).await?;

    let result = match state.rp.finish_authentication(&key, &credential).await {
        Ok(result) => result,
        Err(CeremonyError::PossibleCloneDetected { stored, presented }) => {
            if state.revoke_on_clone {
                let revoked = state.rp.credentials().delete(&credential.raw_id.0).await?;
                tracing::warn!(
                    credential = %base64url_encode(&credential.raw_id.0),
                    revoked,
                    "revoked credential after counter regression"
                );
            }
            return Err(CeremonyError::PossibleCloneDetected { stored, presented }.into());
        }
        Err(e) => return Err(e.into()),
    };

    // A second factor completed for another account replaces the login
    if session::user_id(&session).await?.as_deref() != Some(result.user_id.as_str()) {
        session::log_in(&session, &result.user_id).await?;
    }
    session
        .insert(
            session::WEBAUTH_CREDENTIAL_ID,
            base64url_encode(&result.credential_id),
        )
        .await?;

    Ok(Json(json!({
        "success": true,
        "user_id": result.user_id,
        "sign_count": result.sign_count,
    })))
}

// Session endpoints

/// POST /api/auth/logout
pub async fn logout(session: Session) -> AppResult<Json<Value>> {
    session.delete().await?;

    Ok(Json(json!({
        "success": true,
        "message": "Logged out successfully"
    })))
}

/// GET /api/auth/session
///
/// Reports whether someone is logged in and whether the session has passed
/// the second factor.
pub async fn session_info(session: Session) -> AppResult<Json<Value>> {
    let webauth_verified = session
        .get::<String>(session::WEBAUTH_CREDENTIAL_ID)
        .await?
        .is_some();

    match session::user_id(&session).await? {
        Some(id) => Ok(Json(json!({
            "authenticated": true,
            "user_id": id,
            "webauth_verified": webauth_verified,
        }))),
        None => Ok(Json(json!({
            "authenticated": false
        }))),
    }
}
