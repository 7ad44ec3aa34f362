//! # WebAuthn Wire Types
//!
//! Ceremony options sent to the browser and the credential responses it
//! posts back. Field names follow the WebAuthn JSON conventions
//! (`pubKeyCredParams`, `clientDataJSON`, ...); binary values travel as
//! base64url without padding.

use base64::prelude::*;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::error::VerifyError;
use super::policy::{AttestationConveyancePreference, UserVerificationRequirement};

pub const PUBLIC_KEY_TYPE: &str = "public-key";

pub fn base64url_encode(data: &[u8]) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(data)
}

/// Decodes base64url, tolerating trailing padding some clients still send.
pub fn base64url_decode(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64_URL_SAFE_NO_PAD.decode(data.trim_end_matches('='))
}

/// Checks the fields every returned credential carries: `type` must be
/// `"public-key"` and `id` must be the base64url form of `rawId`.
pub fn check_credential_envelope(type_: &str, id: &str, raw_id: &[u8]) -> Result<(), VerifyError> {
    if type_ != PUBLIC_KEY_TYPE {
        return Err(VerifyError::WrongCredentialType(type_.to_string()));
    }
    match base64url_decode(id) {
        Ok(decoded) if decoded == raw_id => Ok(()),
        _ => Err(VerifyError::CredentialIdMismatch),
    }
}

/// Bytes that serialize as a base64url string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Base64UrlBytes(pub Vec<u8>);

impl From<Vec<u8>> for Base64UrlBytes {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl AsRef<[u8]> for Base64UrlBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Base64UrlBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64url_encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Base64UrlBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        base64url_decode(&s)
            .map(Base64UrlBytes)
            .map_err(serde::de::Error::custom)
    }
}

// Options sent to the client

#[derive(Debug, Clone, Serialize)]
pub struct RelyingPartyEntity {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    /// User handle (the 16 bytes of the account UUID).
    pub id: Base64UrlBytes,
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PubKeyCredParam {
    #[serde(rename = "type")]
    pub type_: &'static str,
    pub alg: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CredentialDescriptor {
    #[serde(rename = "type")]
    pub type_: &'static str,
    pub id: Base64UrlBytes,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<String>,
}

impl CredentialDescriptor {
    pub fn public_key(id: Vec<u8>) -> Self {
        Self {
            type_: "public-key",
            id: Base64UrlBytes(id),
            transports: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    pub user_verification: UserVerificationRequirement,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialCreationOptions {
    pub rp: RelyingPartyEntity,
    pub user: UserEntity,
    pub challenge: Base64UrlBytes,
    pub pub_key_cred_params: Vec<PubKeyCredParam>,
    /// Milliseconds
    pub timeout: u64,
    pub attestation: AttestationConveyancePreference,
    pub authenticator_selection: AuthenticatorSelection,
    pub exclude_credentials: Vec<CredentialDescriptor>,
}

/// Registration options, shaped for `navigator.credentials.create()`.
#[derive(Debug, Clone, Serialize)]
pub struct CreationChallengeResponse {
    #[serde(rename = "publicKey")]
    pub public_key: PublicKeyCredentialCreationOptions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialRequestOptions {
    pub challenge: Base64UrlBytes,
    pub timeout: u64,
    pub rp_id: String,
    pub allow_credentials: Vec<CredentialDescriptor>,
    pub user_verification: UserVerificationRequirement,
}

/// Authentication options, shaped for `navigator.credentials.get()`.
#[derive(Debug, Clone, Serialize)]
pub struct RequestChallengeResponse {
    #[serde(rename = "publicKey")]
    pub public_key: PublicKeyCredentialRequestOptions,
}

// Responses posted back by the client

#[derive(Debug, Clone, Deserialize)]
pub struct AuthenticatorAttestationResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: Base64UrlBytes,
    #[serde(rename = "attestationObject")]
    pub attestation_object: Base64UrlBytes,
    #[serde(default)]
    pub transports: Vec<String>,
}

/// The `PublicKeyCredential` returned by `navigator.credentials.create()`.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterPublicKeyCredential {
    pub id: String,
    #[serde(rename = "rawId")]
    pub raw_id: Base64UrlBytes,
    #[serde(rename = "type")]
    pub type_: String,
    pub response: AuthenticatorAttestationResponse,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthenticatorAssertionResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: Base64UrlBytes,
    #[serde(rename = "authenticatorData")]
    pub authenticator_data: Base64UrlBytes,
    pub signature: Base64UrlBytes,
    #[serde(rename = "userHandle", default)]
    pub user_handle: Option<Base64UrlBytes>,
}

/// The `PublicKeyCredential` returned by `navigator.credentials.get()`.
#[derive(Debug, Clone, Deserialize)]
pub struct PublicKeyCredential {
    pub id: String,
    #[serde(rename = "rawId")]
    pub raw_id: Base64UrlBytes,
    #[serde(rename = "type")]
    pub type_: String,
    pub response: AuthenticatorAssertionResponse,
}

/// What a successful assertion yields: who signed in, and the counter the
/// store now holds for the credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationResult {
    pub user_id: String,
    pub credential_id: Vec<u8>,
    pub sign_count: u32,
}
