//! # Passkey Registration
//!
//! Registration is a two-step process: `begin_registration` sends a
//! challenge, `finish_registration` verifies the authenticator's attestation
//! and stores the new credential.
//!
//! Verification never writes anything; the credential is created only after
//! every check passed, so a failed registration leaves no trace.

use chrono::Utc;

use super::attestation::AttestationObject;
use super::challenge::{consume_challenge, issue_challenge, Ceremony, SessionKey};
use super::client_data::{client_data_hash, CollectedClientData, TYPE_CREATE};
use super::cose::CoseKey;
use super::error::{CeremonyError, CeremonyResult, VerifyError};
use super::policy::RpPolicy;
use super::store::{ChallengeStore, CredentialStore};
use super::types::*;
use super::RelyingParty;
use crate::db::models::{Credential, User};

/// Everything a verified attestation tells us about the new credential.
#[derive(Debug, Clone)]
pub struct RegistrationVerification {
    pub credential_id: Vec<u8>,
    pub public_key: Vec<u8>,
    pub algorithm: i64,
    pub aaguid: [u8; 16],
    pub sign_count: u32,
    pub origin: String,
    pub attestation_format: String,
    pub backup_eligible: bool,
    pub backup_state: bool,
}

/// Validates a `navigator.credentials.create()` response against the
/// challenge that was issued for it.
pub fn verify_registration(
    policy: &RpPolicy,
    challenge: &[u8],
    response: &RegisterPublicKeyCredential,
) -> Result<RegistrationVerification, VerifyError> {
    check_credential_envelope(&response.type_, &response.id, &response.raw_id.0)?;

    // Client data: type, challenge, origin
    let raw_client_data = response.response.client_data_json.as_ref();
    let client_data = CollectedClientData::from_json(raw_client_data)?;
    client_data.verify(TYPE_CREATE, challenge)?;
    if !policy.is_allowed_origin(&client_data.origin) {
        return Err(VerifyError::OriginMismatch(client_data.origin));
    }
    let hash = client_data_hash(raw_client_data);

    let attestation = AttestationObject::parse(response.response.attestation_object.as_ref())?;
    let auth_data = &attestation.auth_data;
    auth_data.verify_rp_id_hash(policy.rp_id_hash())?;
    auth_data.verify_flags(policy.require_user_verification())?;

    let attested = auth_data
        .attested
        .as_ref()
        .ok_or_else(|| {
            VerifyError::MalformedAuthenticatorData("no attested credential data".into())
        })?;
    if attested.credential_id != response.raw_id.0 {
        return Err(VerifyError::CredentialIdMismatch);
    }

    let (key, alg) = CoseKey::from_cbor(&attested.public_key)?;
    if !policy.accepts_algorithm(alg) {
        return Err(VerifyError::UnsupportedAlgorithm(alg.as_i64()));
    }

    if policy.attestation().verifies_statement() {
        attestation.verify_statement(&hash, &key, alg)?;
    }

    Ok(RegistrationVerification {
        credential_id: attested.credential_id.clone(),
        public_key: attested.public_key.clone(),
        algorithm: alg.as_i64(),
        aaguid: attested.aaguid,
        sign_count: auth_data.sign_count,
        origin: client_data.origin,
        attestation_format: attestation.fmt.clone(),
        backup_eligible: auth_data.backup_eligible(),
        backup_state: auth_data.backup_state(),
    })
}

impl<S: CredentialStore, C: ChallengeStore> RelyingParty<S, C> {
    /// Start registering a new authenticator for `user`
    ///
    /// Issues a registration challenge bound to `session` and returns the
    /// options for `navigator.credentials.create()`. The user's existing
    /// credentials are listed in `excludeCredentials` so the same
    /// authenticator is not registered twice.
    pub async fn begin_registration(
        &self,
        session: &SessionKey,
        user: &User,
    ) -> CeremonyResult<CreationChallengeResponse> {
        let policy = self.policy();
        let existing = self.credentials().find_by_user(&user.id).await?;

        let challenge = issue_challenge(
            self.challenges(),
            policy,
            session,
            Ceremony::Registration,
            Some(&user.id),
        )
        .await?;

        let exclude_credentials = existing
            .into_iter()
            .map(|c| {
                let transports = c.transports();
                let mut descriptor = CredentialDescriptor::public_key(c.credential_id);
                descriptor.transports = transports;
                descriptor
            })
            .collect();

        Ok(CreationChallengeResponse {
            public_key: PublicKeyCredentialCreationOptions {
                rp: RelyingPartyEntity {
                    id: policy.rp_id().to_string(),
                    name: policy.rp_name().to_string(),
                },
                user: UserEntity {
                    id: Base64UrlBytes(user.handle()),
                    name: user.username.clone(),
                    display_name: user.display_name.clone(),
                },
                challenge: Base64UrlBytes(challenge.bytes),
                pub_key_cred_params: policy
                    .algorithms()
                    .iter()
                    .map(|alg| PubKeyCredParam {
                        type_: "public-key",
                        alg: alg.as_i64(),
                    })
                    .collect(),
                timeout: policy.timeout_ms(),
                attestation: policy.attestation(),
                authenticator_selection: AuthenticatorSelection {
                    user_verification: policy.user_verification(),
                },
                exclude_credentials,
            },
        })
    }

    /// Finish registration
    ///
    /// Consumes the session's challenge (whatever the outcome), verifies the
    /// attestation and stores the credential under `user` with the label
    /// `name`.
    ///
    /// ## Errors
    /// - `MissingChallenge` / `ChallengeExpired`: no usable challenge
    /// - `AttestationVerificationFailed`: any check on the response failed
    /// - `DuplicateCredential`: the credential ID is already registered
    pub async fn finish_registration(
        &self,
        session: &SessionKey,
        user: &User,
        name: &str,
        response: &RegisterPublicKeyCredential,
    ) -> CeremonyResult<Credential> {
        let challenge = consume_challenge(
            self.challenges(),
            self.policy(),
            session,
            Ceremony::Registration,
        )
        .await?;

        if challenge.user_id.as_deref() != Some(user.id.as_str()) {
            return Err(CeremonyError::AttestationVerificationFailed(
                VerifyError::ChallengeMismatch,
            ));
        }

        let verified = verify_registration(self.policy(), &challenge.bytes, response)
            .map_err(|reason| {
                tracing::info!(user_id = %user.id, %reason, "registration rejected");
                CeremonyError::AttestationVerificationFailed(reason)
            })?;

        let transports = if response.response.transports.is_empty() {
            None
        } else {
            serde_json::to_string(&response.response.transports).ok()
        };

        let credential = Credential {
            credential_id: verified.credential_id,
            user_id: user.id.clone(),
            name: name.to_string(),
            public_key: verified.public_key,
            algorithm: verified.algorithm,
            rp_id: self.policy().rp_id().to_string(),
            origin: verified.origin,
            sign_count: verified.sign_count,
            aaguid: verified.aaguid.to_vec(),
            attestation_format: verified.attestation_format,
            transports,
            backup_eligible: verified.backup_eligible,
            backup_state: verified.backup_state,
            created_at: Utc::now().to_rfc3339(),
            last_used_at: None,
        };

        self.credentials().create(&credential).await?;

        tracing::info!(
            user_id = %user.id,
            format = %credential.attestation_format,
            alg = credential.algorithm,
            "registered credential"
        );
        Ok(credential)
    }
}
