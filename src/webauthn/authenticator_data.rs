//! Authenticator data parser.
//!
//! Layout: `rpIdHash(32) | flags(1) | signCount(4, BE) | [attested credential
//! data] | [extensions]`, where attested credential data is
//! `aaguid(16) | credIdLen(2, BE) | credId | COSE_Key`.

use ciborium::value::Value;

use super::error::VerifyError;

pub const FLAG_UP: u8 = 0x01;
pub const FLAG_UV: u8 = 0x04;
pub const FLAG_BE: u8 = 0x08;
pub const FLAG_BS: u8 = 0x10;
pub const FLAG_AT: u8 = 0x40;
pub const FLAG_ED: u8 = 0x80;

const HEADER_LEN: usize = 37;
const AAGUID_LEN: usize = 16;

#[derive(Debug, Clone)]
pub struct AttestedCredentialData {
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    /// The COSE_Key exactly as the authenticator encoded it.
    pub public_key: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub sign_count: u32,
    pub attested: Option<AttestedCredentialData>,
}

impl AuthenticatorData {
    pub fn parse(data: &[u8]) -> Result<Self, VerifyError> {
        if data.len() < HEADER_LEN {
            return Err(malformed(format!("{} bytes, need at least {HEADER_LEN}", data.len())));
        }

        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&data[..32]);
        let flags = data[32];
        let sign_count = u32::from_be_bytes([data[33], data[34], data[35], data[36]]);

        let mut rest = &data[HEADER_LEN..];

        let attested = if flags & FLAG_AT != 0 {
            Some(parse_attested(&mut rest)?)
        } else {
            None
        };

        if flags & FLAG_ED != 0 {
            let extensions: Value = ciborium::from_reader(&mut rest)
                .map_err(|e| malformed(format!("extensions: {e}")))?;
            if !matches!(extensions, Value::Map(_)) {
                return Err(malformed("extensions are not a map".into()));
            }
        }

        if !rest.is_empty() {
            return Err(malformed(format!("{} trailing bytes", rest.len())));
        }

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested,
        })
    }

    pub fn user_present(&self) -> bool {
        self.flags & FLAG_UP != 0
    }

    pub fn user_verified(&self) -> bool {
        self.flags & FLAG_UV != 0
    }

    pub fn backup_eligible(&self) -> bool {
        self.flags & FLAG_BE != 0
    }

    pub fn backup_state(&self) -> bool {
        self.flags & FLAG_BS != 0
    }

    pub fn verify_rp_id_hash(&self, expected: &[u8; 32]) -> Result<(), VerifyError> {
        if &self.rp_id_hash != expected {
            return Err(VerifyError::RpIdMismatch);
        }
        Ok(())
    }

    /// UP must always be set; UV only when the policy requires it.
    pub fn verify_flags(&self, require_user_verification: bool) -> Result<(), VerifyError> {
        if !self.user_present() {
            return Err(VerifyError::UserPresenceMissing);
        }
        if require_user_verification && !self.user_verified() {
            return Err(VerifyError::UserVerificationRequired);
        }
        Ok(())
    }
}

fn parse_attested(rest: &mut &[u8]) -> Result<AttestedCredentialData, VerifyError> {
    if rest.len() < AAGUID_LEN + 2 {
        return Err(malformed("attested credential data is truncated".into()));
    }
    let mut aaguid = [0u8; 16];
    aaguid.copy_from_slice(&rest[..AAGUID_LEN]);
    let id_len = u16::from_be_bytes([rest[AAGUID_LEN], rest[AAGUID_LEN + 1]]) as usize;
    *rest = &rest[AAGUID_LEN + 2..];

    if id_len == 0 || rest.len() < id_len {
        return Err(malformed(format!("credential ID length {id_len} is invalid")));
    }
    let credential_id = rest[..id_len].to_vec();
    *rest = &rest[id_len..];

    // Decode one CBOR item to find where the key ends; extensions may follow.
    let before = *rest;
    let _: Value =
        ciborium::from_reader(&mut *rest).map_err(|e| malformed(format!("COSE key: {e}")))?;
    let consumed = before.len() - rest.len();

    Ok(AttestedCredentialData {
        aaguid,
        credential_id,
        public_key: before[..consumed].to_vec(),
    })
}

fn malformed(msg: String) -> VerifyError {
    VerifyError::MalformedAuthenticatorData(msg)
}
