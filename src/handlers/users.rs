//! # User Handlers
//!
//! Account creation and the current user's profile. Password handling is
//! left to whatever fronts this service; creating an account logs it in.

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_sessions::Session;

use crate::db::users;
use crate::error::{AppError, AppResult};
use crate::session;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub display_name: Option<String>,
}

/// Create an account and log it into the session
///
/// ## Route
/// POST /api/users
///
/// ## Response
/// `201 Created` with the new profile, `409` if the username is taken.
pub async fn create_user(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let username = req.username.trim();
    if username.is_empty() || username.len() > 150 {
        return Err(AppError::BadRequest(
            "Username must be 1 to 150 characters".to_string(),
        ));
    }
    let display_name = req
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(username);

    let user = users::create_user(&state.db, username, display_name).await?;
    session::log_in(&session, &user.id).await?;
    tracing::info!(user_id = %user.id, "created user");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": user.id,
            "username": user.username,
            "display_name": user.display_name,
            "created_at": user.created_at
        })),
    ))
}

/// Get the logged-in user's profile
///
/// ## Route
/// GET /api/users/me (behind `require_auth`)
pub async fn get_current_user(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<Value>> {
    let user_id = session::user_id(&session)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))?;

    let user = users::find_by_id(&state.db, &user_id).await?;

    Ok(Json(json!({
        "id": user.id,
        "username": user.username,
        "display_name": user.display_name,
        "created_at": user.created_at
    })))
}
