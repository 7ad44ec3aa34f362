//! # Challenge Generator
//!
//! Issues random single-use challenges bound to a session and consumes them
//! exactly once. The store's `take` is an atomic pop, so two concurrent
//! requests from the same session can never both receive the challenge.

use chrono::{DateTime, Utc};
use rand::RngCore;

use super::error::{CeremonyError, CeremonyResult};
use super::policy::RpPolicy;
use super::store::ChallengeStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ceremony {
    Registration,
    Authentication,
}

impl Ceremony {
    pub fn as_str(self) -> &'static str {
        match self {
            Ceremony::Registration => "registration",
            Ceremony::Authentication => "authentication",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "registration" => Some(Ceremony::Registration),
            "authentication" => Some(Ceremony::Authentication),
            _ => None,
        }
    }
}

/// Opaque key identifying the browser session a challenge belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub bytes: Vec<u8>,
    pub ceremony: Ceremony,
    pub user_id: Option<String>,
    pub issued_at: DateTime<Utc>,
}

impl Challenge {
    pub fn is_expired(&self, policy: &RpPolicy, now: DateTime<Utc>) -> bool {
        let deadline = chrono::Duration::from_std(policy.timeout())
            .ok()
            .and_then(|timeout| self.issued_at.checked_add_signed(timeout));
        match deadline {
            Some(deadline) => now > deadline,
            None => false,
        }
    }
}

/// Generates a fresh challenge and stores it for `session`, replacing any
/// challenge the session had not consumed yet.
pub async fn issue_challenge<C: ChallengeStore + ?Sized>(
    store: &C,
    policy: &RpPolicy,
    session: &SessionKey,
    ceremony: Ceremony,
    user_id: Option<&str>,
) -> CeremonyResult<Challenge> {
    let mut bytes = vec![0u8; policy.challenge_length()];
    rand::thread_rng().fill_bytes(&mut bytes);

    let challenge = Challenge {
        bytes,
        ceremony,
        user_id: user_id.map(str::to_string),
        issued_at: Utc::now(),
    };
    store.put(session, challenge.clone()).await?;

    tracing::debug!(ceremony = ceremony.as_str(), "issued challenge");
    Ok(challenge)
}

/// Pops the session's challenge. After this call the session has no pending
/// challenge, whatever the outcome.
pub async fn consume_challenge<C: ChallengeStore + ?Sized>(
    store: &C,
    policy: &RpPolicy,
    session: &SessionKey,
    ceremony: Ceremony,
) -> CeremonyResult<Challenge> {
    let challenge = store.take(session).await?.ok_or(CeremonyError::MissingChallenge)?;

    if challenge.ceremony != ceremony {
        tracing::debug!(
            expected = ceremony.as_str(),
            found = challenge.ceremony.as_str(),
            "challenge was issued for another ceremony"
        );
        return Err(CeremonyError::MissingChallenge);
    }
    if challenge.is_expired(policy, Utc::now()) {
        return Err(CeremonyError::ChallengeExpired);
    }

    Ok(challenge)
}
