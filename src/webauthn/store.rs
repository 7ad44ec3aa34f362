//! # Store Interfaces
//!
//! The ceremonies persist through these two traits. `db` implements them on
//! SQLite; [`MemoryStore`] keeps everything in process behind mutexes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::challenge::{Challenge, SessionKey};
use super::error::{CeremonyError, CeremonyResult};
use crate::db::models::Credential;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_credential_id(&self, id: &[u8]) -> CeremonyResult<Option<Credential>>;

    async fn find_by_user(&self, user_id: &str) -> CeremonyResult<Vec<Credential>>;

    /// Fails with `DuplicateCredential` if the ID is already stored.
    async fn create(&self, credential: &Credential) -> CeremonyResult<()>;

    /// Sets the counter to `new_count` only if it still equals `expected`;
    /// otherwise fails with `StorageConflict` and leaves the record alone.
    async fn update_sign_count(
        &self,
        id: &[u8],
        expected: u32,
        new_count: u32,
    ) -> CeremonyResult<()>;

    async fn delete(&self, id: &[u8]) -> CeremonyResult<bool>;

    /// Deletes the credential only if `user_id` owns it.
    async fn delete_for_user(&self, user_id: &str, id: &[u8]) -> CeremonyResult<bool>;
}

#[async_trait]
pub trait ChallengeStore: Send + Sync {
    /// Stores `challenge` for `session`, replacing any pending one.
    async fn put(&self, session: &SessionKey, challenge: Challenge) -> CeremonyResult<()>;

    /// Atomically removes and returns the session's challenge.
    async fn take(&self, session: &SessionKey) -> CeremonyResult<Option<Challenge>>;
}

#[async_trait]
impl<T: CredentialStore + ?Sized> CredentialStore for Arc<T> {
    async fn find_by_credential_id(&self, id: &[u8]) -> CeremonyResult<Option<Credential>> {
        (**self).find_by_credential_id(id).await
    }

    async fn find_by_user(&self, user_id: &str) -> CeremonyResult<Vec<Credential>> {
        (**self).find_by_user(user_id).await
    }

    async fn create(&self, credential: &Credential) -> CeremonyResult<()> {
        (**self).create(credential).await
    }

    async fn update_sign_count(
        &self,
        id: &[u8],
        expected: u32,
        new_count: u32,
    ) -> CeremonyResult<()> {
        (**self).update_sign_count(id, expected, new_count).await
    }

    async fn delete(&self, id: &[u8]) -> CeremonyResult<bool> {
        (**self).delete(id).await
    }

    async fn delete_for_user(&self, user_id: &str, id: &[u8]) -> CeremonyResult<bool> {
        (**self).delete_for_user(user_id, id).await
    }
}

#[async_trait]
impl<T: ChallengeStore + ?Sized> ChallengeStore for Arc<T> {
    async fn put(&self, session: &SessionKey, challenge: Challenge) -> CeremonyResult<()> {
        (**self).put(session, challenge).await
    }

    async fn take(&self, session: &SessionKey) -> CeremonyResult<Option<Challenge>> {
        (**self).take(session).await
    }
}

/// In-process store for both credentials and challenges.
#[derive(Default)]
pub struct MemoryStore {
    credentials: Mutex<HashMap<Vec<u8>, Credential>>,
    challenges: Mutex<HashMap<SessionKey, Challenge>>,
}

impl MemoryStore {
    fn credentials(&self) -> std::sync::MutexGuard<'_, HashMap<Vec<u8>, Credential>> {
        self.credentials.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn challenges(&self) -> std::sync::MutexGuard<'_, HashMap<SessionKey, Challenge>> {
        self.challenges.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_by_credential_id(&self, id: &[u8]) -> CeremonyResult<Option<Credential>> {
        Ok(self.credentials().get(id).cloned())
    }

    async fn find_by_user(&self, user_id: &str) -> CeremonyResult<Vec<Credential>> {
        let mut found: Vec<Credential> = self
            .credentials()
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }

    async fn create(&self, credential: &Credential) -> CeremonyResult<()> {
        let mut credentials = self.credentials();
        if credentials.contains_key(&credential.credential_id) {
            return Err(CeremonyError::DuplicateCredential);
        }
        credentials.insert(credential.credential_id.clone(), credential.clone());
        Ok(())
    }

    async fn update_sign_count(
        &self,
        id: &[u8],
        expected: u32,
        new_count: u32,
    ) -> CeremonyResult<()> {
        let mut credentials = self.credentials();
        match credentials.get_mut(id) {
            Some(credential) if credential.sign_count == expected => {
                credential.sign_count = new_count;
                credential.last_used_at = Some(chrono::Utc::now().to_rfc3339());
                Ok(())
            }
            _ => Err(CeremonyError::StorageConflict),
        }
    }

    async fn delete(&self, id: &[u8]) -> CeremonyResult<bool> {
        Ok(self.credentials().remove(id).is_some())
    }

    async fn delete_for_user(&self, user_id: &str, id: &[u8]) -> CeremonyResult<bool> {
        let mut credentials = self.credentials();
        match credentials.get(id) {
            Some(c) if c.user_id == user_id => Ok(credentials.remove(id).is_some()),
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ChallengeStore for MemoryStore {
    async fn put(&self, session: &SessionKey, challenge: Challenge) -> CeremonyResult<()> {
        self.challenges().insert(session.clone(), challenge);
        Ok(())
    }

    async fn take(&self, session: &SessionKey) -> CeremonyResult<Option<Challenge>> {
        Ok(self.challenges().remove(session))
    }
}
