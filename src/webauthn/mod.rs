//! # WebAuthn Relying Party
//!
//! The ceremony core: challenge issuance, attestation verification at
//! registration, assertion verification at authentication, and the
//! signature-counter bookkeeping that detects cloned authenticators.
//!
//! ## Submodules
//! - `policy`: immutable RP configuration
//! - `challenge`: single-use, session-bound challenges
//! - `client_data`, `authenticator_data`, `cose`, `attestation`: parsers and
//!   signature checks for the WebAuthn/CTAP2 wire structures
//! - `registration`, `authentication`: the two ceremonies
//! - `store`: persistence traits the ceremonies call into
//! - `types`: options and responses exchanged with the browser
//!
//! ## Registration
//! 1. `begin_registration()` issues a challenge and returns creation options
//! 2. The browser calls `navigator.credentials.create()`
//! 3. `finish_registration()` verifies the attestation and stores the credential
//!
//! ## Authentication
//! 1. `begin_authentication()` issues a challenge listing allowed credentials
//! 2. The browser calls `navigator.credentials.get()`
//! 3. `finish_authentication()` verifies the assertion and advances the counter

pub mod attestation;
pub mod authentication;
pub mod authenticator_data;
pub mod challenge;
pub mod client_data;
pub mod cose;
pub mod error;
pub mod policy;
pub mod registration;
pub mod store;
pub mod types;

use std::sync::Arc;

pub use challenge::{Ceremony, Challenge, SessionKey};
pub use error::{CeremonyError, CeremonyResult, VerifyError};
pub use policy::RpPolicy;
pub use store::{ChallengeStore, CredentialStore, MemoryStore};

/// Entry point for both ceremonies.
///
/// Generic over its stores so the server can run on SQLite while tests use
/// [`MemoryStore`].
pub struct RelyingParty<S, C> {
    policy: Arc<RpPolicy>,
    credentials: S,
    challenges: C,
}

impl<S: CredentialStore, C: ChallengeStore> RelyingParty<S, C> {
    pub fn new(policy: RpPolicy, credentials: S, challenges: C) -> Self {
        Self {
            policy: Arc::new(policy),
            credentials,
            challenges,
        }
    }

    pub fn policy(&self) -> &RpPolicy {
        &self.policy
    }

    pub fn credentials(&self) -> &S {
        &self.credentials
    }

    pub fn challenges(&self) -> &C {
        &self.challenges
    }
}
