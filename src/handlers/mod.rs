//! # HTTP Request Handlers
//!
//! ## Submodules
//! - `health`: liveness endpoint
//! - `users`: account creation and profile
//! - `auth`: WebAuthn ceremonies, logout, session info
//! - `credentials`: list and delete the user's authenticators
//! - `private`: a resource guarded by both factors
//!
//! Handlers extract state, session and body, call into the relying party or
//! the database, and return JSON or an [`crate::error::AppError`].

pub mod auth;
pub mod credentials;
pub mod health;
pub mod private;
pub mod users;
