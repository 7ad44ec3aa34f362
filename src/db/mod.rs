//! # Database Module
//!
//! - `models`: row types (User, Credential, ChallengeRow)
//! - `users`: account lookups
//! - `credentials`: SQLite credential store
//! - `challenges`: SQLite challenge store and expiry sweep

pub mod challenges;
pub mod credentials;
pub mod models;
pub mod users;

pub use challenges::SqliteChallengeStore;
pub use credentials::SqliteCredentialStore;
