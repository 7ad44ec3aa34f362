//! Software authenticator and fixtures shared by the integration suites.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use ciborium::value::Value;
use p256::ecdsa::signature::Signer;
use p256::pkcs8::DecodePrivateKey;
use serde_json::json;
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use webauth_server::db::models::User;
use webauth_server::webauthn::policy::{CoseAlgorithm, RpPolicy};
use webauth_server::webauthn::types::{
    base64url_encode, PublicKeyCredential, RegisterPublicKeyCredential,
};
use webauth_server::webauthn::{MemoryStore, RelyingParty, SessionKey};

pub const RP_ID: &str = "localhost";
pub const ORIGIN: &str = "http://localhost:8080";

pub const FLAG_UP: u8 = 0x01;
pub const FLAG_UV: u8 = 0x04;
pub const FLAG_AT: u8 = 0x40;

pub type MemoryRp = RelyingParty<Arc<MemoryStore>, Arc<MemoryStore>>;

pub fn policy() -> RpPolicy {
    RpPolicy::builder(RP_ID, "Test RP")
        .origin(ORIGIN)
        .algorithms(vec![CoseAlgorithm::Es256, CoseAlgorithm::EdDsa])
        .timeout(Duration::from_secs(60))
        .build()
        .unwrap()
}

pub fn memory_rp(policy: RpPolicy) -> MemoryRp {
    let store = Arc::new(MemoryStore::default());
    RelyingParty::new(policy, store.clone(), store)
}

pub fn user(name: &str) -> User {
    User::new(name.to_string(), name.to_uppercase())
}

pub fn session(name: &str) -> SessionKey {
    SessionKey::new(name)
}

/// Fresh in-memory database with the schema applied. A single connection,
/// since every `sqlite::memory:` connection is its own database.
pub async fn sqlite_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

pub async fn insert_user(pool: &SqlitePool, name: &str) -> User {
    webauth_server::db::users::create_user(pool, name, &name.to_uppercase())
        .await
        .unwrap()
}

pub enum SoftKey {
    P256(p256::ecdsa::SigningKey),
    Ed25519(ed25519_dalek::SigningKey),
}

/// Attestation the soft authenticator attaches at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attestation {
    None,
    PackedSelf,
    /// `packed`, signed by the attestation certificate's key
    PackedX5c,
    /// `fido-u2f`, P-256 credentials only
    FidoU2f,
}

impl Attestation {
    pub fn fmt(self) -> &'static str {
        match self {
            Attestation::None => "none",
            Attestation::PackedSelf | Attestation::PackedX5c => "packed",
            Attestation::FidoU2f => "fido-u2f",
        }
    }
}

/// Self-signed P-256 attestation certificate (DER) and its signing key.
pub fn attestation_certificate() -> (Vec<u8>, p256::ecdsa::SigningKey) {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["attestation.test".to_string()]).unwrap();
    let key = p256::ecdsa::SigningKey::from_pkcs8_der(&key_pair.serialize_der()).unwrap();
    (cert.der().to_vec(), key)
}

/// A software authenticator holding one credential.
pub struct SoftAuthenticator {
    key: SoftKey,
    pub credential_id: Vec<u8>,
    pub counter: u32,
    /// Added to `counter` before every assertion; zero models an
    /// authenticator without counters.
    pub step: u32,
    pub rp_id: String,
    pub origin: String,
    pub flags: u8,
    pub attestation_cert: Vec<u8>,
    /// Signs `x5c` statements. Replacing it leaves the certificate
    /// advertising a key that did not sign.
    pub attestation_key: p256::ecdsa::SigningKey,
}

impl SoftAuthenticator {
    pub fn p256(seed: u8) -> Self {
        let key = p256::ecdsa::SigningKey::from_slice(&[seed; 32]).unwrap();
        Self::with_key(SoftKey::P256(key), seed)
    }

    pub fn ed25519(seed: u8) -> Self {
        let key = ed25519_dalek::SigningKey::from_bytes(&[seed; 32]);
        Self::with_key(SoftKey::Ed25519(key), seed)
    }

    fn with_key(key: SoftKey, seed: u8) -> Self {
        let (attestation_cert, attestation_key) = attestation_certificate();
        Self {
            key,
            credential_id: vec![seed; 16],
            counter: 0,
            step: 1,
            rp_id: RP_ID.to_string(),
            origin: ORIGIN.to_string(),
            flags: FLAG_UP,
            attestation_cert,
            attestation_key,
        }
    }

    pub fn algorithm(&self) -> i64 {
        match self.key {
            SoftKey::P256(_) => -7,
            SoftKey::Ed25519(_) => -8,
        }
    }

    pub fn cose_key(&self) -> Vec<u8> {
        let map = match &self.key {
            SoftKey::P256(key) => {
                let point = key.verifying_key().to_encoded_point(false);
                vec![
                    (Value::Integer(1.into()), Value::Integer(2.into())),
                    (Value::Integer(3.into()), Value::Integer((-7).into())),
                    (Value::Integer((-1).into()), Value::Integer(1.into())),
                    (Value::Integer((-2).into()), Value::Bytes(point.x().unwrap().to_vec())),
                    (Value::Integer((-3).into()), Value::Bytes(point.y().unwrap().to_vec())),
                ]
            }
            SoftKey::Ed25519(key) => vec![
                (Value::Integer(1.into()), Value::Integer(1.into())),
                (Value::Integer(3.into()), Value::Integer((-8).into())),
                (Value::Integer((-1).into()), Value::Integer(6.into())),
                (
                    Value::Integer((-2).into()),
                    Value::Bytes(key.verifying_key().to_bytes().to_vec()),
                ),
            ],
        };
        cbor(&Value::Map(map))
    }

    /// Raw uncompressed P-256 point as U2F carries it; empty for other keys.
    pub fn u2f_public_key(&self) -> Vec<u8> {
        match &self.key {
            SoftKey::P256(key) => key.verifying_key().to_encoded_point(false).as_bytes().to_vec(),
            SoftKey::Ed25519(_) => Vec::new(),
        }
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        match &self.key {
            SoftKey::P256(key) => {
                let signature: p256::ecdsa::Signature = key.sign(message);
                signature.to_der().as_bytes().to_vec()
            }
            SoftKey::Ed25519(key) => {
                use ed25519_dalek::Signer as _;
                key.sign(message).to_bytes().to_vec()
            }
        }
    }

    pub fn authenticator_data(&self, flags: u8, counter: u32, attested: bool) -> Vec<u8> {
        let mut data = Sha256::digest(self.rp_id.as_bytes()).to_vec();
        data.push(if attested { flags | FLAG_AT } else { flags });
        data.extend_from_slice(&counter.to_be_bytes());
        if attested {
            data.extend_from_slice(&[0u8; 16]);
            data.extend_from_slice(&(self.credential_id.len() as u16).to_be_bytes());
            data.extend_from_slice(&self.credential_id);
            data.extend_from_slice(&self.cose_key());
        }
        data
    }

    pub fn client_data(&self, ceremony_type: &str, challenge: &[u8]) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "type": ceremony_type,
            "challenge": base64url_encode(challenge),
            "origin": self.origin,
            "crossOrigin": false,
        }))
        .unwrap()
    }

    /// Answers `navigator.credentials.create()` for `challenge`.
    pub fn register(
        &self,
        challenge: &[u8],
        attestation: Attestation,
    ) -> RegisterPublicKeyCredential {
        serde_json::from_value(self.register_json(challenge, attestation)).unwrap()
    }

    /// The same response as the browser would post it.
    pub fn register_json(&self, challenge: &[u8], attestation: Attestation) -> serde_json::Value {
        let client_data = self.client_data("webauthn.create", challenge);
        let auth_data = self.authenticator_data(self.flags, self.counter, true);

        let client_data_hash = Sha256::digest(&client_data);
        let mut signed = auth_data.clone();
        signed.extend_from_slice(&client_data_hash);
        let x5c = Value::Array(vec![Value::Bytes(self.attestation_cert.clone())]);

        let att_stmt = match attestation {
            Attestation::None => Vec::new(),
            Attestation::PackedSelf => vec![
                (Value::Text("alg".into()), Value::Integer(self.algorithm().into())),
                (Value::Text("sig".into()), Value::Bytes(self.sign(&signed))),
            ],
            Attestation::PackedX5c => vec![
                (Value::Text("alg".into()), Value::Integer((-7).into())),
                (Value::Text("sig".into()), Value::Bytes(self.attestation_sign(&signed))),
                (Value::Text("x5c".into()), x5c),
            ],
            Attestation::FidoU2f => {
                let mut data = vec![0x00];
                data.extend_from_slice(&Sha256::digest(self.rp_id.as_bytes()));
                data.extend_from_slice(&client_data_hash);
                data.extend_from_slice(&self.credential_id);
                data.extend_from_slice(&self.u2f_public_key());
                vec![
                    (Value::Text("sig".into()), Value::Bytes(self.attestation_sign(&data))),
                    (Value::Text("x5c".into()), x5c),
                ]
            }
        };
        let object = cbor(&Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text(attestation.fmt().into())),
            (Value::Text("attStmt".into()), Value::Map(att_stmt)),
            (Value::Text("authData".into()), Value::Bytes(auth_data)),
        ]));

        json!({
            "id": base64url_encode(&self.credential_id),
            "rawId": base64url_encode(&self.credential_id),
            "type": "public-key",
            "response": {
                "clientDataJSON": base64url_encode(&client_data),
                "attestationObject": base64url_encode(&object),
                "transports": ["usb"],
            }
        })
    }

    fn attestation_sign(&self, message: &[u8]) -> Vec<u8> {
        let signature: p256::ecdsa::Signature = self.attestation_key.sign(message);
        signature.to_der().as_bytes().to_vec()
    }

    /// Answers `navigator.credentials.get()` for `challenge`, advancing the
    /// counter by `step`.
    pub fn assert(&mut self, challenge: &[u8], user_handle: Option<&[u8]>) -> PublicKeyCredential {
        self.counter = self.counter.wrapping_add(self.step);
        self.assert_with_counter(challenge, self.counter, user_handle)
    }

    /// Signs an assertion with an arbitrary counter, as a cloned key would.
    pub fn assert_with_counter(
        &self,
        challenge: &[u8],
        counter: u32,
        user_handle: Option<&[u8]>,
    ) -> PublicKeyCredential {
        serde_json::from_value(self.assertion_json(challenge, counter, user_handle)).unwrap()
    }

    pub fn assertion_json(
        &self,
        challenge: &[u8],
        counter: u32,
        user_handle: Option<&[u8]>,
    ) -> serde_json::Value {
        let client_data = self.client_data("webauthn.get", challenge);
        let auth_data = self.authenticator_data(self.flags, counter, false);

        let mut signed = auth_data.clone();
        signed.extend_from_slice(&Sha256::digest(&client_data));
        let signature = self.sign(&signed);

        json!({
            "id": base64url_encode(&self.credential_id),
            "rawId": base64url_encode(&self.credential_id),
            "type": "public-key",
            "response": {
                "clientDataJSON": base64url_encode(&client_data),
                "authenticatorData": base64url_encode(&auth_data),
                "signature": base64url_encode(&signature),
                "userHandle": user_handle.map(base64url_encode),
            }
        })
    }
}

pub fn cbor(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    ciborium::into_writer(value, &mut out).unwrap();
    out
}

/// Challenge bytes from options serialized the way the browser receives them.
pub fn challenge_of<T: serde::Serialize>(options: &T) -> Vec<u8> {
    let json = serde_json::to_value(options).unwrap();
    let encoded = json["publicKey"]["challenge"].as_str().unwrap();
    webauth_server::webauthn::types::base64url_decode(encoded).unwrap()
}
