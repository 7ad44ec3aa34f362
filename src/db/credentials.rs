//! # Credential Database Operations
//!
//! SQLite implementation of [`CredentialStore`]. Only public keys are stored;
//! private keys never leave the authenticator.
//!
//! ## Signature counter
//! `update_sign_count` is a compare-and-set: the `UPDATE` only matches while
//! the row still holds the counter the caller verified against. Zero rows
//! affected means someone else got there first.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::Credential;
use crate::webauthn::error::{CeremonyError, CeremonyResult};
use crate::webauthn::store::CredentialStore;

/// [`CredentialStore`] backed by the `credentials` table.
#[derive(Clone)]
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn find_by_credential_id(&self, id: &[u8]) -> CeremonyResult<Option<Credential>> {
        let credential =
            sqlx::query_as::<_, Credential>("SELECT * FROM credentials WHERE credential_id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(credential)
    }

    async fn find_by_user(&self, user_id: &str) -> CeremonyResult<Vec<Credential>> {
        let credentials = sqlx::query_as::<_, Credential>(
            "SELECT * FROM credentials WHERE user_id = ? ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(credentials)
    }

    /// Insert a newly registered credential.
    ///
    /// ## Errors
    /// - DuplicateCredential: the credential ID is already stored, for any user
    async fn create(&self, credential: &Credential) -> CeremonyResult<()> {
        let result = sqlx::query(
            "INSERT INTO credentials
             (credential_id, user_id, name, public_key, algorithm, rp_id, origin, sign_count,
              aaguid, attestation_format, transports, backup_eligible, backup_state,
              created_at, last_used_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&credential.credential_id)
        .bind(&credential.user_id)
        .bind(&credential.name)
        .bind(&credential.public_key)
        .bind(credential.algorithm)
        .bind(&credential.rp_id)
        .bind(&credential.origin)
        .bind(credential.sign_count as i64)
        .bind(&credential.aaguid)
        .bind(&credential.attestation_format)
        .bind(&credential.transports)
        .bind(credential.backup_eligible)
        .bind(credential.backup_state)
        .bind(&credential.created_at)
        .bind(&credential.last_used_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(CeremonyError::DuplicateCredential)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Advance the counter from `expected` to `new_count` and stamp
    /// `last_used_at`.
    ///
    /// ## Parameters
    /// - `id`: Credential ID
    /// - `expected`: Counter the assertion was verified against
    /// - `new_count`: Counter the authenticator presented
    ///
    /// ## Errors
    /// - StorageConflict: the stored counter is no longer `expected`, or the
    ///   credential is gone. The caller must not retry.
    async fn update_sign_count(
        &self,
        id: &[u8],
        expected: u32,
        new_count: u32,
    ) -> CeremonyResult<()> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "UPDATE credentials
             SET sign_count = ?, last_used_at = ?
             WHERE credential_id = ? AND sign_count = ?",
        )
        .bind(new_count as i64)
        .bind(now)
        .bind(id)
        .bind(expected as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CeremonyError::StorageConflict);
        }
        Ok(())
    }

    async fn delete(&self, id: &[u8]) -> CeremonyResult<bool> {
        let result = sqlx::query("DELETE FROM credentials WHERE credential_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a credential only if `user_id` owns it. `false` when nothing
    /// matched, so callers cannot tell another user's credential from a
    /// missing one.
    async fn delete_for_user(&self, user_id: &str, id: &[u8]) -> CeremonyResult<bool> {
        let result = sqlx::query("DELETE FROM credentials WHERE credential_id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
