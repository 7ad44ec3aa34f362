//! # COSE Public Keys
//!
//! Decodes the COSE_Key maps found in attested credential data and checks
//! signatures made with them. Supported: EC2/P-256 with ES256, OKP/Ed25519
//! with EdDSA, and RSA with RS256.

use ciborium::value::Value;
use p256::ecdsa::signature::Verifier as _;
use rsa::signature::Verifier as _;
use sha2::Sha256;

use super::error::VerifyError;
use super::policy::CoseAlgorithm;

// COSE_Key labels and values (RFC 9053)
const LABEL_KTY: i64 = 1;
const LABEL_ALG: i64 = 3;
const LABEL_CRV: i64 = -1;
const LABEL_X: i64 = -2;
const LABEL_Y: i64 = -3;
const LABEL_RSA_N: i64 = -1;
const LABEL_RSA_E: i64 = -2;

const KTY_OKP: i64 = 1;
const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;

const CRV_P256: i64 = 1;
const CRV_ED25519: i64 = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoseKey {
    Ec2 { x: [u8; 32], y: [u8; 32] },
    Okp { x: [u8; 32] },
    Rsa { n: Vec<u8>, e: Vec<u8> },
}

impl CoseKey {
    /// Decodes a COSE_Key and returns it with its declared algorithm.
    ///
    /// Algorithms outside the supported set fail with `UnsupportedAlgorithm`;
    /// a key type that contradicts its algorithm is malformed.
    pub fn from_cbor(bytes: &[u8]) -> Result<(Self, CoseAlgorithm), VerifyError> {
        let value: Value = ciborium::from_reader(bytes).map_err(|e| malformed(e.to_string()))?;
        let Value::Map(map) = value else {
            return Err(malformed("COSE key is not a map".into()));
        };

        let kty = cbor_int(&map, LABEL_KTY).ok_or_else(|| malformed("missing kty".into()))?;
        let alg_id = cbor_int(&map, LABEL_ALG).ok_or_else(|| malformed("missing alg".into()))?;
        let alg = CoseAlgorithm::from_i64(alg_id).ok_or(VerifyError::UnsupportedAlgorithm(alg_id))?;

        let key = match (kty, alg) {
            (KTY_EC2, CoseAlgorithm::Es256) => {
                if cbor_int(&map, LABEL_CRV) != Some(CRV_P256) {
                    return Err(malformed("EC2 key is not on P-256".into()));
                }
                CoseKey::Ec2 {
                    x: coordinate(&map, LABEL_X)?,
                    y: coordinate(&map, LABEL_Y)?,
                }
            }
            (KTY_OKP, CoseAlgorithm::EdDsa) => {
                if cbor_int(&map, LABEL_CRV) != Some(CRV_ED25519) {
                    return Err(malformed("OKP key is not Ed25519".into()));
                }
                CoseKey::Okp {
                    x: coordinate(&map, LABEL_X)?,
                }
            }
            (KTY_RSA, CoseAlgorithm::Rs256) => CoseKey::Rsa {
                n: cbor_bytes(&map, LABEL_RSA_N)
                    .ok_or_else(|| malformed("missing RSA modulus".into()))?
                    .to_vec(),
                e: cbor_bytes(&map, LABEL_RSA_E)
                    .ok_or_else(|| malformed("missing RSA exponent".into()))?
                    .to_vec(),
            },
            _ => return Err(malformed(format!("key type {kty} does not match algorithm {alg_id}"))),
        };

        Ok((key, alg))
    }

    /// SEC1 uncompressed point (`0x04 || x || y`) for EC2 keys.
    pub fn ec2_uncompressed(&self) -> Option<Vec<u8>> {
        match self {
            CoseKey::Ec2 { x, y } => {
                let mut point = Vec::with_capacity(65);
                point.push(0x04);
                point.extend_from_slice(x);
                point.extend_from_slice(y);
                Some(point)
            }
            _ => None,
        }
    }

    /// Verifies `signature` over `message`. ES256 signatures are DER encoded,
    /// as WebAuthn authenticators produce them.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), VerifyError> {
        match self {
            CoseKey::Ec2 { .. } => {
                let point = self.ec2_uncompressed().unwrap_or_default();
                verify_p256_sec1(&point, message, signature)
            }
            CoseKey::Okp { x } => {
                let key = ed25519_dalek::VerifyingKey::from_bytes(x)
                    .map_err(|e| malformed(e.to_string()))?;
                let sig = ed25519_dalek::Signature::from_slice(signature)
                    .map_err(|_| VerifyError::BadSignature)?;
                key.verify_strict(message, &sig)
                    .map_err(|_| VerifyError::BadSignature)
            }
            CoseKey::Rsa { n, e } => {
                let key = rsa::RsaPublicKey::new(
                    rsa::BigUint::from_bytes_be(n),
                    rsa::BigUint::from_bytes_be(e),
                )
                .map_err(|e| malformed(e.to_string()))?;
                let verifying_key = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(key);
                let sig = rsa::pkcs1v15::Signature::try_from(signature)
                    .map_err(|_| VerifyError::BadSignature)?;
                verifying_key
                    .verify(message, &sig)
                    .map_err(|_| VerifyError::BadSignature)
            }
        }
    }
}

/// ES256 check against a SEC1-encoded P-256 point. Also used for
/// attestation certificates, whose keys arrive as SEC1 bytes.
pub fn verify_p256_sec1(
    point: &[u8],
    message: &[u8],
    der_signature: &[u8],
) -> Result<(), VerifyError> {
    let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(point)
        .map_err(|_| malformed("invalid P-256 point".into()))?;
    let sig = p256::ecdsa::Signature::from_der(der_signature)
        .map_err(|_| VerifyError::BadSignature)?;
    key.verify(message, &sig).map_err(|_| VerifyError::BadSignature)
}

pub(crate) fn cbor_get(map: &[(Value, Value)], key: i64) -> Option<&Value> {
    let target = Value::Integer(key.into());
    map.iter().find(|(k, _)| k == &target).map(|(_, v)| v)
}

fn cbor_int(map: &[(Value, Value)], key: i64) -> Option<i64> {
    match cbor_get(map, key)? {
        Value::Integer(i) => i64::try_from(*i).ok(),
        _ => None,
    }
}

fn cbor_bytes(map: &[(Value, Value)], key: i64) -> Option<&[u8]> {
    match cbor_get(map, key)? {
        Value::Bytes(b) => Some(b),
        _ => None,
    }
}

fn coordinate(map: &[(Value, Value)], key: i64) -> Result<[u8; 32], VerifyError> {
    cbor_bytes(map, key)
        .and_then(|b| <[u8; 32]>::try_from(b).ok())
        .ok_or_else(|| malformed(format!("coordinate {key} must be 32 bytes")))
}

fn malformed(msg: String) -> VerifyError {
    VerifyError::MalformedPublicKey(msg)
}
