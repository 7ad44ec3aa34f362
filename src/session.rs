//! # Session Keys
//!
//! What the server keeps in the cookie session:
//! - `user_id`: the logged-in account (first factor)
//! - `webauth_credential_id`: base64url ID of the credential that completed
//!   an assertion in this session (second factor)
//! - `webauthn_ceremony_key`: key under which the pending challenge is stored

use tower_sessions::Session;
use uuid::Uuid;

use crate::error::AppResult;
use crate::webauthn::SessionKey;

pub const USER_ID: &str = "user_id";
pub const WEBAUTH_CREDENTIAL_ID: &str = "webauth_credential_id";
pub const CEREMONY_KEY: &str = "webauthn_ceremony_key";

pub async fn user_id(session: &Session) -> AppResult<Option<String>> {
    Ok(session.get(USER_ID).await?)
}

/// The session's challenge key, created on first use.
pub async fn ceremony_key(session: &Session) -> AppResult<SessionKey> {
    if let Some(key) = session.get::<String>(CEREMONY_KEY).await? {
        return Ok(SessionKey::new(key));
    }

    let key = Uuid::new_v4().to_string();
    session.insert(CEREMONY_KEY, &key).await?;
    Ok(SessionKey::new(key))
}

/// Starts a fresh login for `user_id`. Any earlier second-factor marker is
/// dropped along with the old session ID.
pub async fn log_in(session: &Session, user_id: &str) -> AppResult<()> {
    session.cycle_id().await?;
    session.remove::<String>(WEBAUTH_CREDENTIAL_ID).await?;
    session.insert(USER_ID, user_id).await?;
    Ok(())
}
