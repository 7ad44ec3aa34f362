//! # Challenge Database Operations
//!
//! Pending challenges live in the `challenges` table, one row per session.
//! Issuing replaces the row; consuming deletes it with `DELETE ... RETURNING`,
//! so a challenge is handed out at most once even under concurrent requests.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;

use crate::db::models::ChallengeRow;
use crate::webauthn::challenge::{Ceremony, Challenge, SessionKey};
use crate::webauthn::error::CeremonyResult;
use crate::webauthn::store::ChallengeStore;

/// Fixed-width timestamps keep the text column ordered.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// [`ChallengeStore`] backed by the `challenges` table.
#[derive(Clone)]
pub struct SqliteChallengeStore {
    pool: SqlitePool,
}

impl SqliteChallengeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChallengeStore for SqliteChallengeStore {
    async fn put(&self, session: &SessionKey, challenge: Challenge) -> CeremonyResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO challenges
                 (session_key, ceremony, challenge, user_id, issued_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(session.as_str())
        .bind(challenge.ceremony.as_str())
        .bind(&challenge.bytes)
        .bind(&challenge.user_id)
        .bind(timestamp(challenge.issued_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove and return the session's challenge.
    ///
    /// ## Security Note
    /// The row is deleted by the same statement that reads it. Two requests
    /// racing on one session cannot both receive the challenge.
    async fn take(&self, session: &SessionKey) -> CeremonyResult<Option<Challenge>> {
        let row = sqlx::query_as::<_, ChallengeRow>(
            "DELETE FROM challenges WHERE session_key = ?
             RETURNING session_key, ceremony, challenge, user_id, issued_at",
        )
        .bind(session.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        // A row we cannot read back is as good as no challenge
        let ceremony = Ceremony::parse(&row.ceremony);
        let issued_at = DateTime::parse_from_rfc3339(&row.issued_at)
            .ok()
            .map(|t| t.with_timezone(&Utc));
        match (ceremony, issued_at) {
            (Some(ceremony), Some(issued_at)) => Ok(Some(Challenge {
                bytes: row.challenge,
                ceremony,
                user_id: row.user_id,
                issued_at,
            })),
            _ => {
                tracing::warn!(session = %row.session_key, "discarding unreadable challenge row");
                Ok(None)
            }
        }
    }
}

/// Delete challenges issued before `cutoff`
///
/// Run periodically so abandoned ceremonies do not pile up. Expired rows
/// are already rejected when consumed; this only reclaims space.
///
/// ## Parameters
/// - `pool`: Database connection pool
/// - `cutoff`: Anything issued strictly before this instant goes
///
/// ## Returns
/// How many rows were removed.
pub async fn purge_expired(pool: &SqlitePool, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM challenges WHERE issued_at < ?")
        .bind(timestamp(cutoff))
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
