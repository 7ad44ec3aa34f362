//! # Passkey Authentication
//!
//! `begin_authentication` sends a challenge listing the credentials that may
//! answer it; `finish_authentication` verifies the signed assertion and
//! advances the stored signature counter.
//!
//! The counter is committed with a compare-and-set against the value read
//! before verification. Two assertions racing on the same credential can
//! therefore never both succeed with the same counter.

use super::authenticator_data::AuthenticatorData;
use super::challenge::{consume_challenge, issue_challenge, Ceremony, SessionKey};
use super::client_data::{client_data_hash, CollectedClientData, TYPE_GET};
use super::cose::CoseKey;
use super::error::{CeremonyError, CeremonyResult, VerifyError};
use super::policy::{CoseAlgorithm, RpPolicy};
use super::store::{ChallengeStore, CredentialStore};
use super::types::*;
use super::RelyingParty;
use crate::db::models::{Credential, User};

/// Counter rule
///
/// An authenticator that implements counters must present a value strictly
/// greater than the stored one. When both values are zero the authenticator
/// does not implement counters and any assertion passes this check.
pub fn check_sign_count(stored: u32, presented: u32) -> CeremonyResult<()> {
    if (stored != 0 || presented != 0) && presented <= stored {
        return Err(CeremonyError::PossibleCloneDetected { stored, presented });
    }
    Ok(())
}

/// Verifies an assertion against a stored credential and returns the counter
/// the authenticator presented. Nothing is written.
///
/// Checks run in order: credential type and ID, client data (type, challenge, and
/// origin equal to the registering origin), RP ID hash, flags, signature over
/// `authenticatorData || SHA-256(clientDataJSON)`, user handle, then the
/// counter rule.
pub fn verify_assertion(
    policy: &RpPolicy,
    challenge: &[u8],
    credential: &Credential,
    response: &PublicKeyCredential,
) -> CeremonyResult<u32> {
    let failed = CeremonyError::AssertionVerificationFailed;

    check_credential_envelope(&response.type_, &response.id, &response.raw_id.0)
        .map_err(failed)?;
    if response.raw_id.0 != credential.credential_id {
        return Err(failed(VerifyError::CredentialIdMismatch));
    }

    let raw_client_data = response.response.client_data_json.as_ref();
    let client_data = CollectedClientData::from_json(raw_client_data).map_err(failed)?;
    client_data.verify(TYPE_GET, challenge).map_err(failed)?;
    if client_data.origin != credential.origin {
        return Err(failed(VerifyError::OriginMismatch(client_data.origin)));
    }

    // The credential is scoped to the RP ID it was registered under
    if credential.rp_id != policy.rp_id() {
        return Err(failed(VerifyError::RpIdMismatch));
    }

    let raw_auth_data = response.response.authenticator_data.as_ref();
    let auth_data = AuthenticatorData::parse(raw_auth_data).map_err(failed)?;
    auth_data.verify_rp_id_hash(policy.rp_id_hash()).map_err(failed)?;
    auth_data
        .verify_flags(policy.require_user_verification())
        .map_err(failed)?;

    let (key, alg) = CoseKey::from_cbor(&credential.public_key).map_err(failed)?;
    if CoseAlgorithm::from_i64(credential.algorithm) != Some(alg)
        || !policy.accepts_algorithm(alg)
    {
        return Err(failed(VerifyError::UnsupportedAlgorithm(credential.algorithm)));
    }

    let mut signed = Vec::with_capacity(raw_auth_data.len() + 32);
    signed.extend_from_slice(raw_auth_data);
    signed.extend_from_slice(&client_data_hash(raw_client_data));
    key.verify(&signed, response.response.signature.as_ref())
        .map_err(failed)?;

    if let Some(handle) = &response.response.user_handle {
        if !handle.0.is_empty() && handle.0 != owner_handle(&credential.user_id) {
            return Err(failed(VerifyError::CredentialNotAllowed));
        }
    }

    check_sign_count(credential.sign_count, auth_data.sign_count)?;
    Ok(auth_data.sign_count)
}

fn owner_handle(user_id: &str) -> Vec<u8> {
    match uuid::Uuid::parse_str(user_id) {
        Ok(uuid) => uuid.as_bytes().to_vec(),
        Err(_) => user_id.as_bytes().to_vec(),
    }
}

impl<S: CredentialStore, C: ChallengeStore> RelyingParty<S, C> {
    /// Start an authentication ceremony
    ///
    /// With a known `user`, `allowCredentials` lists that user's credentials
    /// and only they may answer. Without one the list is empty and the
    /// authenticator picks a discoverable credential.
    pub async fn begin_authentication(
        &self,
        session: &SessionKey,
        user: Option<&User>,
    ) -> CeremonyResult<RequestChallengeResponse> {
        let policy = self.policy();

        let allow_credentials = match user {
            Some(user) => self
                .credentials()
                .find_by_user(&user.id)
                .await?
                .into_iter()
                .map(|c| {
                    let transports = c.transports();
                    let mut descriptor = CredentialDescriptor::public_key(c.credential_id);
                    descriptor.transports = transports;
                    descriptor
                })
                .collect(),
            None => Vec::new(),
        };

        let challenge = issue_challenge(
            self.challenges(),
            policy,
            session,
            Ceremony::Authentication,
            user.map(|u| u.id.as_str()),
        )
        .await?;

        Ok(RequestChallengeResponse {
            public_key: PublicKeyCredentialRequestOptions {
                challenge: Base64UrlBytes(challenge.bytes),
                timeout: policy.timeout_ms(),
                rp_id: policy.rp_id().to_string(),
                allow_credentials,
                user_verification: policy.user_verification(),
            },
        })
    }

    /// Finish authentication
    ///
    /// Consumes the session's challenge, verifies the assertion, then commits
    /// the new counter with a compare-and-set.
    ///
    /// ## Errors
    /// - `MissingChallenge` / `ChallengeExpired`: no usable challenge
    /// - `UnknownCredential`: no credential with the presented ID
    /// - `AssertionVerificationFailed`: any check on the response failed
    /// - `PossibleCloneDetected`: the counter did not advance; the stored
    ///   counter is left unchanged
    /// - `StorageConflict`: another assertion committed first
    pub async fn finish_authentication(
        &self,
        session: &SessionKey,
        response: &PublicKeyCredential,
    ) -> CeremonyResult<AuthenticationResult> {
        let challenge = consume_challenge(
            self.challenges(),
            self.policy(),
            session,
            Ceremony::Authentication,
        )
        .await?;

        let credential = self
            .credentials()
            .find_by_credential_id(&response.raw_id.0)
            .await?
            .ok_or(CeremonyError::UnknownCredential)?;

        if let Some(expected_user) = &challenge.user_id {
            if *expected_user != credential.user_id {
                return Err(CeremonyError::AssertionVerificationFailed(
                    VerifyError::CredentialNotAllowed,
                ));
            }
        }

        let verified = verify_assertion(self.policy(), &challenge.bytes, &credential, response);
        let presented = match verified {
            Ok(count) => count,
            Err(CeremonyError::PossibleCloneDetected { stored, presented }) => {
                tracing::warn!(
                    user_id = %credential.user_id,
                    credential = %base64url_encode(&credential.credential_id),
                    stored,
                    presented,
                    "signature counter did not advance, possible cloned authenticator"
                );
                return Err(CeremonyError::PossibleCloneDetected { stored, presented });
            }
            Err(e) => {
                tracing::info!(user_id = %credential.user_id, error = %e, "assertion rejected");
                return Err(e);
            }
        };

        self.credentials()
            .update_sign_count(&credential.credential_id, credential.sign_count, presented)
            .await?;

        tracing::debug!(
            user_id = %credential.user_id,
            sign_count = presented,
            "assertion accepted"
        );
        Ok(AuthenticationResult {
            user_id: credential.user_id,
            credential_id: credential.credential_id,
            sign_count: presented,
        })
    }
}
