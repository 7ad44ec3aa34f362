//! # Middleware Module
//!
//! Guards run before route handlers and short-circuit with `401` when the
//! session lacks what the route needs.
//!
//! - `auth`: `require_auth` (logged in) and `require_webauthn` (second factor)

pub mod auth;
