//! # Attestation Objects
//!
//! Decodes the CBOR attestation object returned at registration and verifies
//! its statement for the `none`, `packed` and `fido-u2f` formats.
//!
//! Certificate chains are not validated against vendor roots: an `x5c` leaf
//! only has to produce a valid signature.

use ciborium::value::Value;

use super::authenticator_data::AuthenticatorData;
use super::cose::{verify_p256_sec1, CoseKey};
use super::error::VerifyError;
use super::policy::CoseAlgorithm;

pub const FMT_NONE: &str = "none";
pub const FMT_PACKED: &str = "packed";
pub const FMT_FIDO_U2F: &str = "fido-u2f";

#[derive(Debug, Clone)]
pub struct AttestationObject {
    pub fmt: String,
    pub att_stmt: Vec<(Value, Value)>,
    /// Raw authenticator data, needed verbatim for signature checks.
    pub auth_data_raw: Vec<u8>,
    pub auth_data: AuthenticatorData,
}

impl AttestationObject {
    pub fn parse(bytes: &[u8]) -> Result<Self, VerifyError> {
        let value: Value = ciborium::from_reader(bytes).map_err(|e| malformed(e.to_string()))?;
        let Value::Map(map) = value else {
            return Err(malformed("attestation object is not a map".into()));
        };

        let mut fmt = None;
        let mut att_stmt = None;
        let mut auth_data_raw = None;
        for (key, value) in map {
            match (key, value) {
                (Value::Text(k), Value::Text(v)) if k == "fmt" => fmt = Some(v),
                (Value::Text(k), Value::Map(v)) if k == "attStmt" => att_stmt = Some(v),
                (Value::Text(k), Value::Bytes(v)) if k == "authData" => auth_data_raw = Some(v),
                _ => {}
            }
        }

        let fmt = fmt.ok_or_else(|| malformed("missing fmt".into()))?;
        let att_stmt = att_stmt.ok_or_else(|| malformed("missing attStmt".into()))?;
        let auth_data_raw = auth_data_raw.ok_or_else(|| malformed("missing authData".into()))?;
        let auth_data = AuthenticatorData::parse(&auth_data_raw)?;

        Ok(Self {
            fmt,
            att_stmt,
            auth_data_raw,
            auth_data,
        })
    }

    /// Verifies the attestation statement against the client data hash and
    /// the credential key the authenticator just attested.
    pub fn verify_statement(
        &self,
        client_data_hash: &[u8; 32],
        credential_key: &CoseKey,
        credential_alg: CoseAlgorithm,
    ) -> Result<(), VerifyError> {
        match self.fmt.as_str() {
            FMT_NONE => {
                if !self.att_stmt.is_empty() {
                    return Err(malformed("none attestation carries a statement".into()));
                }
                Ok(())
            }
            FMT_PACKED => self.verify_packed(client_data_hash, credential_key, credential_alg),
            FMT_FIDO_U2F => self.verify_fido_u2f(client_data_hash, credential_key),
            other => Err(VerifyError::UnsupportedAttestationFormat(other.to_string())),
        }
    }

    fn verify_packed(
        &self,
        client_data_hash: &[u8; 32],
        credential_key: &CoseKey,
        credential_alg: CoseAlgorithm,
    ) -> Result<(), VerifyError> {
        let alg_id = stmt_int(&self.att_stmt, "alg")
            .ok_or_else(|| malformed("packed: missing alg".into()))?;
        let sig = stmt_bytes(&self.att_stmt, "sig")
            .ok_or_else(|| malformed("packed: missing sig".into()))?;

        let mut signed = self.auth_data_raw.clone();
        signed.extend_from_slice(client_data_hash);

        match stmt_get(&self.att_stmt, "x5c") {
            Some(Value::Array(x5c)) => {
                if CoseAlgorithm::from_i64(alg_id) != Some(CoseAlgorithm::Es256) {
                    return Err(VerifyError::UnsupportedAlgorithm(alg_id));
                }
                let point = leaf_certificate_key(x5c)?;
                verify_p256_sec1(&point, &signed, sig)
            }
            Some(_) => Err(malformed("packed: x5c is not an array".into())),
            None => {
                // Self attestation: signed by the credential key itself.
                if alg_id != credential_alg.as_i64() {
                    return Err(malformed(format!(
                        "packed: alg {alg_id} does not match credential alg {}",
                        credential_alg.as_i64()
                    )));
                }
                credential_key.verify(&signed, sig)
            }
        }
    }

    fn verify_fido_u2f(
        &self,
        client_data_hash: &[u8; 32],
        credential_key: &CoseKey,
    ) -> Result<(), VerifyError> {
        let sig = stmt_bytes(&self.att_stmt, "sig")
            .ok_or_else(|| malformed("fido-u2f: missing sig".into()))?;
        let x5c = match stmt_get(&self.att_stmt, "x5c") {
            Some(Value::Array(x5c)) if x5c.len() == 1 => x5c,
            _ => return Err(malformed("fido-u2f: x5c must hold exactly one certificate".into())),
        };
        let public_key = credential_key
            .ec2_uncompressed()
            .ok_or_else(|| malformed("fido-u2f: credential key is not P-256".into()))?;
        let attested = self
            .auth_data
            .attested
            .as_ref()
            .ok_or_else(|| malformed("fido-u2f: no attested credential data".into()))?;

        let data = u2f_verification_data(
            &self.auth_data.rp_id_hash,
            client_data_hash,
            &attested.credential_id,
            &public_key,
        );
        let point = leaf_certificate_key(x5c)?;
        verify_p256_sec1(&point, &data, sig)
    }
}

/// `0x00 || rpIdHash || clientDataHash || credentialId || publicKeyU2F`
pub fn u2f_verification_data(
    rp_id_hash: &[u8; 32],
    client_data_hash: &[u8; 32],
    credential_id: &[u8],
    public_key: &[u8],
) -> Vec<u8> {
    let mut data = Vec::with_capacity(1 + 32 + 32 + credential_id.len() + public_key.len());
    data.push(0x00);
    data.extend_from_slice(rp_id_hash);
    data.extend_from_slice(client_data_hash);
    data.extend_from_slice(credential_id);
    data.extend_from_slice(public_key);
    data
}

/// SEC1 public key bytes of the first (leaf) certificate in `x5c`.
fn leaf_certificate_key(x5c: &[Value]) -> Result<Vec<u8>, VerifyError> {
    let der = match x5c.first() {
        Some(Value::Bytes(der)) => der,
        _ => return Err(malformed("x5c has no leaf certificate".into())),
    };
    let (_, cert) = x509_parser::parse_x509_certificate(der)
        .map_err(|e| malformed(format!("attestation certificate: {e}")))?;
    Ok(cert.public_key().subject_public_key.data.to_vec())
}

fn stmt_get<'a>(stmt: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    stmt.iter()
        .find(|(k, _)| matches!(k, Value::Text(s) if s == key))
        .map(|(_, v)| v)
}

fn stmt_int(stmt: &[(Value, Value)], key: &str) -> Option<i64> {
    match stmt_get(stmt, key)? {
        Value::Integer(i) => i64::try_from(*i).ok(),
        _ => None,
    }
}

fn stmt_bytes<'a>(stmt: &'a [(Value, Value)], key: &str) -> Option<&'a [u8]> {
    match stmt_get(stmt, key)? {
        Value::Bytes(b) => Some(b),
        _ => None,
    }
}

fn malformed(msg: String) -> VerifyError {
    VerifyError::MalformedAttestation(msg)
}
