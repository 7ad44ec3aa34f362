//! # Database Models
//!
//! Structs that map to rows of the SQLite tables created by
//! `migrations/0001_init.sql`. Timestamps are RFC3339 strings, as SQLite
//! stores them as text.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User account information
///
/// The primary login factor is owned by the surrounding application; this
/// row only carries what the WebAuthn ceremonies need (a stable ID for the
/// user handle, and names shown by the authenticator).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// UUID v4; its 16 bytes are the WebAuthn user handle
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn new(username: String, display_name: String) -> Self {
        let now = Utc::now().to_rfc3339();

        Self {
            id: Uuid::new_v4().to_string(),
            username,
            display_name,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// The user handle sent to authenticators.
    pub fn handle(&self) -> Vec<u8> {
        match Uuid::parse_str(&self.id) {
            Ok(uuid) => uuid.as_bytes().to_vec(),
            Err(_) => self.id.as_bytes().to_vec(),
        }
    }
}

/// A registered authenticator
///
/// One row per credential. `credential_id` is the primary key, so the store
/// can never hold two records for the same authenticator key.
///
/// `public_key`, `algorithm`, `rp_id` and `origin` are written once at
/// registration. `sign_count` only ever moves forward, through a
/// compare-and-set on the previous value.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Credential {
    /// Opaque ID chosen by the authenticator
    pub credential_id: Vec<u8>,

    /// Owning user; deleting a user with credentials is refused
    pub user_id: String,

    /// Label picked by the user ("YubiKey 5", "Laptop")
    pub name: String,

    /// COSE_Key bytes as attested
    pub public_key: Vec<u8>,

    /// COSE algorithm identifier of `public_key`
    pub algorithm: i64,

    pub rp_id: String,

    /// Exact origin that registered the credential
    pub origin: String,

    /// Last accepted signature counter
    pub sign_count: u32,

    pub aaguid: Vec<u8>,

    /// "none", "packed" or "fido-u2f"
    pub attestation_format: String,

    /// JSON array of transport hints, e.g. `["usb","nfc"]`
    pub transports: Option<String>,

    pub backup_eligible: bool,
    pub backup_state: bool,

    pub created_at: String,
    pub last_used_at: Option<String>,
}

impl Credential {
    pub fn transports(&self) -> Vec<String> {
        self.transports
            .as_deref()
            .and_then(|t| serde_json::from_str(t).ok())
            .unwrap_or_default()
    }
}

/// A pending ceremony challenge, keyed by the session that requested it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChallengeRow {
    pub session_key: String,

    /// "registration" or "authentication"
    pub ceremony: String,

    pub challenge: Vec<u8>,

    /// The user the ceremony was started for, when known
    pub user_id: Option<String>,

    pub issued_at: String,
}
