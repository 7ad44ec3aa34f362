//! # WebAuth Server
//!
//! A WebAuthn relying party that adds hardware-key second-factor
//! authentication to an account system. The `webauthn` module is the ceremony
//! core; the rest is the HTTP surface around it.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod session;
pub mod state;
pub mod webauthn;

use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};

use crate::handlers::{auth, credentials, health, private, users};
use crate::middleware::auth::{require_auth, require_webauthn};
use crate::state::AppState;

/// All API routes with their guards.
///
/// The caller adds the session layer (and anything else, such as CORS or
/// static files); every handler here expects a `tower_sessions::Session`.
pub fn router(state: AppState) -> Router {
    // Logged in
    let protected = Router::new()
        .route("/api/users/me", get(users::get_current_user))
        .route("/api/webauthn/register/start", post(auth::register_start))
        .route("/api/webauthn/register/finish", post(auth::register_finish))
        .route("/api/credentials", get(credentials::list_credentials))
        .route("/api/credentials/{id}", delete(credentials::delete_credential))
        .route_layer(axum_middleware::from_fn(require_auth));

    // Logged in and verified with a security key
    let verified = Router::new()
        .route("/api/private", get(private::private_page))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_webauthn,
        ))
        .route_layer(axum_middleware::from_fn(require_auth));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/users", post(users::create_user))
        .route("/api/webauthn/authenticate/start", post(auth::authenticate_start))
        .route("/api/webauthn/authenticate/finish", post(auth::authenticate_finish))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/session", get(auth::session_info))
        .merge(protected)
        .merge(verified)
        .with_state(state)
}
