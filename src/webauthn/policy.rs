//! # Relying Party Policy
//!
//! The immutable configuration every ceremony is checked against. It is built
//! once at startup from [`crate::config::Config`] and shared behind an `Arc`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;

/// Smallest challenge the generator will ever issue.
pub const MIN_CHALLENGE_LENGTH: usize = 16;

/// COSE algorithm identifiers the verifier knows how to check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoseAlgorithm {
    /// ECDSA P-256 with SHA-256
    Es256,
    /// Ed25519
    EdDsa,
    /// RSASSA-PKCS1-v1_5 with SHA-256
    Rs256,
}

impl CoseAlgorithm {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            -7 => Some(Self::Es256),
            -8 => Some(Self::EdDsa),
            -257 => Some(Self::Rs256),
            _ => None,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Self::Es256 => -7,
            Self::EdDsa => -8,
            Self::Rs256 => -257,
        }
    }
}

/// How much attestation the RP asks the authenticator for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationConveyancePreference {
    None,
    Indirect,
    Direct,
    Enterprise,
}

impl AttestationConveyancePreference {
    /// Whether attestation statements must be cryptographically verified.
    pub fn verifies_statement(self) -> bool {
        matches!(self, Self::Direct | Self::Enterprise)
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Self::None),
            "indirect" => Some(Self::Indirect),
            "direct" => Some(Self::Direct),
            "enterprise" => Some(Self::Enterprise),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerificationRequirement {
    Required,
    Preferred,
    Discouraged,
}

impl UserVerificationRequirement {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "required" => Some(Self::Required),
            "preferred" => Some(Self::Preferred),
            "discouraged" => Some(Self::Discouraged),
            _ => None,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PolicyError {
    #[error("relying party ID cannot be empty")]
    EmptyRpId,
    #[error("at least one origin is required")]
    NoOrigins,
    #[error("origin {0:?} must be https (http is only allowed for localhost)")]
    InsecureOrigin(String),
    #[error("at least one signature algorithm is required")]
    NoAlgorithms,
    #[error("challenge length {0} is below the minimum of {MIN_CHALLENGE_LENGTH} bytes")]
    ChallengeTooShort(usize),
}

/// Relying-party configuration. Cheap to read, never mutated after `build`.
#[derive(Debug, Clone)]
pub struct RpPolicy {
    rp_id: String,
    rp_id_hash: [u8; 32],
    rp_name: String,
    origins: Vec<String>,
    algorithms: Vec<CoseAlgorithm>,
    attestation: AttestationConveyancePreference,
    user_verification: UserVerificationRequirement,
    timeout: Duration,
    challenge_length: usize,
}

impl RpPolicy {
    pub fn builder(rp_id: &str, rp_name: &str) -> RpPolicyBuilder {
        RpPolicyBuilder {
            rp_id: rp_id.to_string(),
            rp_name: rp_name.to_string(),
            origins: Vec::new(),
            algorithms: vec![CoseAlgorithm::Es256],
            attestation: AttestationConveyancePreference::Direct,
            user_verification: UserVerificationRequirement::Discouraged,
            timeout: Duration::from_millis(60_000),
            challenge_length: 32,
        }
    }

    pub fn rp_id(&self) -> &str {
        &self.rp_id
    }

    /// SHA-256 of the RP ID, as embedded in authenticator data.
    pub fn rp_id_hash(&self) -> &[u8; 32] {
        &self.rp_id_hash
    }

    pub fn rp_name(&self) -> &str {
        &self.rp_name
    }

    pub fn origins(&self) -> &[String] {
        &self.origins
    }

    pub fn is_allowed_origin(&self, origin: &str) -> bool {
        self.origins.iter().any(|o| o == origin)
    }

    pub fn algorithms(&self) -> &[CoseAlgorithm] {
        &self.algorithms
    }

    pub fn accepts_algorithm(&self, alg: CoseAlgorithm) -> bool {
        self.algorithms.contains(&alg)
    }

    pub fn attestation(&self) -> AttestationConveyancePreference {
        self.attestation
    }

    pub fn user_verification(&self) -> UserVerificationRequirement {
        self.user_verification
    }

    pub fn require_user_verification(&self) -> bool {
        self.user_verification == UserVerificationRequirement::Required
    }

    /// How long a client has to answer a challenge.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ceremony timeout as sent to the browser, saturating at `u64::MAX`.
    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    pub fn challenge_length(&self) -> usize {
        self.challenge_length
    }
}

pub struct RpPolicyBuilder {
    rp_id: String,
    rp_name: String,
    origins: Vec<String>,
    algorithms: Vec<CoseAlgorithm>,
    attestation: AttestationConveyancePreference,
    user_verification: UserVerificationRequirement,
    timeout: Duration,
    challenge_length: usize,
}

impl RpPolicyBuilder {
    pub fn origin(mut self, origin: &str) -> Self {
        self.origins.push(origin.trim_end_matches('/').to_string());
        self
    }

    pub fn algorithms(mut self, algorithms: Vec<CoseAlgorithm>) -> Self {
        self.algorithms = algorithms;
        self
    }

    pub fn attestation(mut self, attestation: AttestationConveyancePreference) -> Self {
        self.attestation = attestation;
        self
    }

    pub fn user_verification(mut self, user_verification: UserVerificationRequirement) -> Self {
        self.user_verification = user_verification;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn challenge_length(mut self, challenge_length: usize) -> Self {
        self.challenge_length = challenge_length;
        self
    }

    pub fn build(self) -> Result<RpPolicy, PolicyError> {
        if self.rp_id.is_empty() {
            return Err(PolicyError::EmptyRpId);
        }
        if self.origins.is_empty() {
            return Err(PolicyError::NoOrigins);
        }
        if let Some(origin) = self.origins.iter().find(|o| !is_secure_origin(o)) {
            return Err(PolicyError::InsecureOrigin(origin.clone()));
        }
        if self.algorithms.is_empty() {
            return Err(PolicyError::NoAlgorithms);
        }
        if self.challenge_length < MIN_CHALLENGE_LENGTH {
            return Err(PolicyError::ChallengeTooShort(self.challenge_length));
        }

        let rp_id_hash: [u8; 32] = Sha256::digest(self.rp_id.as_bytes()).into();

        Ok(RpPolicy {
            rp_id: self.rp_id,
            rp_id_hash,
            rp_name: self.rp_name,
            origins: self.origins,
            algorithms: self.algorithms,
            attestation: self.attestation,
            user_verification: self.user_verification,
            timeout: self.timeout,
            challenge_length: self.challenge_length,
        })
    }
}

fn is_secure_origin(origin: &str) -> bool {
    origin.starts_with("https://")
        || origin == "http://localhost"
        || origin.starts_with("http://localhost:")
}
