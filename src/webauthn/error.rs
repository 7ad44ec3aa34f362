//! # Ceremony Errors
//!
//! Every way a registration or authentication ceremony can fail. All of them
//! are terminal for the attempt: the caller restarts with a fresh challenge.

use thiserror::Error;

/// Why a response failed verification.
///
/// Carried inside [`CeremonyError::AttestationVerificationFailed`] and
/// [`CeremonyError::AssertionVerificationFailed`] so callers can log the
/// precise reason while clients only ever see a generic failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("credential type {0:?} is not \"public-key\"")]
    WrongCredentialType(String),

    #[error("client data is malformed: {0}")]
    MalformedClientData(String),

    #[error("client data type is {found:?}, expected {expected:?}")]
    WrongCeremonyType { expected: &'static str, found: String },

    #[error("challenge does not match the issued challenge")]
    ChallengeMismatch,

    #[error("origin {0:?} is not allowed")]
    OriginMismatch(String),

    #[error("RP ID hash does not match")]
    RpIdMismatch,

    #[error("user presence flag is not set")]
    UserPresenceMissing,

    #[error("user verification is required")]
    UserVerificationRequired,

    #[error("unsupported COSE algorithm {0}")]
    UnsupportedAlgorithm(i64),

    #[error("unsupported attestation format {0:?}")]
    UnsupportedAttestationFormat(String),

    #[error("authenticator data is malformed: {0}")]
    MalformedAuthenticatorData(String),

    #[error("attestation object is malformed: {0}")]
    MalformedAttestation(String),

    #[error("public key is malformed: {0}")]
    MalformedPublicKey(String),

    #[error("credential ID in the response does not match the authenticator data")]
    CredentialIdMismatch,

    #[error("credential is not allowed for this ceremony")]
    CredentialNotAllowed,

    #[error("signature is invalid")]
    BadSignature,
}

/// Outcome of a failed ceremony step.
#[derive(Error, Debug)]
pub enum CeremonyError {
    #[error("no challenge is pending for this session")]
    MissingChallenge,

    #[error("challenge has expired")]
    ChallengeExpired,

    #[error("attestation verification failed: {0}")]
    AttestationVerificationFailed(VerifyError),

    #[error("unknown credential")]
    UnknownCredential,

    #[error("assertion verification failed: {0}")]
    AssertionVerificationFailed(VerifyError),

    /// The authenticator reported a counter that did not advance. Surrounding
    /// code treats this as a security event, not a retry prompt.
    #[error("possible cloned authenticator (stored counter {stored}, presented {presented})")]
    PossibleCloneDetected { stored: u32, presented: u32 },

    #[error("credential is already registered")]
    DuplicateCredential,

    /// The stored counter changed between read and compare-and-set.
    #[error("credential was updated concurrently")]
    StorageConflict,

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl CeremonyError {
    /// The verification reason, if this is a verification failure.
    pub fn reason(&self) -> Option<&VerifyError> {
        match self {
            CeremonyError::AttestationVerificationFailed(reason)
            | CeremonyError::AssertionVerificationFailed(reason) => Some(reason),
            _ => None,
        }
    }
}

pub type CeremonyResult<T> = Result<T, CeremonyError>;
