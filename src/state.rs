//! # Application State
//!
//! Resources shared by every request handler. Axum clones the state per
//! request, so everything here is either a pool or behind an `Arc`.

use anyhow::Result;
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;

use crate::config::Config;
use crate::db::{SqliteChallengeStore, SqliteCredentialStore};
use crate::webauthn::{RelyingParty, RpPolicy};

/// The relying party as the server runs it: both stores on SQLite.
pub type SqliteRelyingParty = RelyingParty<SqliteCredentialStore, SqliteChallengeStore>;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,

    /// Ceremony core, wired to the same pool as `db`
    pub rp: Arc<SqliteRelyingParty>,

    /// Delete a credential as soon as its counter goes backwards
    pub revoke_on_clone: bool,
}

impl AppState {
    /// Connects to the database, runs migrations and builds the relying
    /// party from the configured policy.
    ///
    /// # Errors
    /// Fails if the database is unreachable, a migration fails, or the RP
    /// settings do not form a valid policy.
    pub async fn new(config: &Config) -> Result<Self> {
        let policy = config.rp_policy()?;
        let db = SqlitePool::connect(&config.database_url).await?;
        sqlx::migrate!("./migrations").run(&db).await?;

        Ok(Self::from_parts(db, policy, config.revoke_on_clone))
    }

    /// Builds state around an existing, migrated pool.
    pub fn from_parts(db: SqlitePool, policy: RpPolicy, revoke_on_clone: bool) -> Self {
        let rp = RelyingParty::new(
            policy,
            SqliteCredentialStore::new(db.clone()),
            SqliteChallengeStore::new(db.clone()),
        );

        AppState {
            db,
            rp: Arc::new(rp),
            revoke_on_clone,
        }
    }
}
