//! Example resource that needs both a login and a completed WebAuthn
//! assertion.

use axum::{extract::State, Json};
use serde_json::{json, Value};
use tower_sessions::Session;

use crate::db::users;
use crate::error::{AppError, AppResult};
use crate::session;
use crate::state::AppState;

/// GET /api/private (behind `require_auth` and `require_webauthn`)
pub async fn private_page(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<Value>> {
    let user_id = session::user_id(&session)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))?;
    let user = users::find_by_id(&state.db, &user_id).await?;

    Ok(Json(json!({
        "message": format!("Hello {}, you are verified with a security key", user.display_name),
        "user_id": user.id,
    })))
}
