//! CollectedClientData decoding and checks.

use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::error::VerifyError;
use super::types::base64url_encode;

pub const TYPE_CREATE: &str = "webauthn.create";
pub const TYPE_GET: &str = "webauthn.get";

/// The JSON the browser hashes and hands to the authenticator.
#[derive(Debug, Deserialize)]
pub struct CollectedClientData {
    #[serde(rename = "type")]
    pub ceremony_type: String,
    pub challenge: String,
    pub origin: String,
    #[serde(rename = "crossOrigin", default)]
    pub cross_origin: Option<bool>,
}

impl CollectedClientData {
    pub fn from_json(raw: &[u8]) -> Result<Self, VerifyError> {
        serde_json::from_slice(raw).map_err(|e| VerifyError::MalformedClientData(e.to_string()))
    }

    /// Checks type, challenge and cross-origin. Origin policy differs per
    /// ceremony and is checked by the caller.
    pub fn verify(&self, expected_type: &'static str, challenge: &[u8]) -> Result<(), VerifyError> {
        if self.ceremony_type != expected_type {
            return Err(VerifyError::WrongCeremonyType {
                expected: expected_type,
                found: self.ceremony_type.clone(),
            });
        }

        let expected = base64url_encode(challenge);
        let presented = self.challenge.trim_end_matches('=');
        if !bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
            return Err(VerifyError::ChallengeMismatch);
        }

        if self.cross_origin == Some(true) {
            return Err(VerifyError::OriginMismatch(self.origin.clone()));
        }

        Ok(())
    }
}

pub fn client_data_hash(raw: &[u8]) -> [u8; 32] {
    Sha256::digest(raw).into()
}
