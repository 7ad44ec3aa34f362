//! # Configuration Management
//!
//! Configuration comes from the environment (and an optional `.env` file).
//!
//! ## Environment Variables
//! - `HOST`: Server bind address (default: 127.0.0.1)
//! - `PORT`: Server port (default: 8080)
//! - `DATABASE_URL`: SQLite connection string
//! - `RP_ID`: Relying Party ID, the domain credentials are scoped to
//! - `RP_ORIGIN`: Comma-separated list of allowed origins
//! - `RP_NAME`: Name shown by the authenticator
//! - `RP_ALGORITHMS`: Comma-separated COSE algorithm IDs (default: -7)
//! - `RP_ATTESTATION`: none | indirect | direct | enterprise (default: direct)
//! - `RP_USER_VERIFICATION`: required | preferred | discouraged (default: discouraged)
//! - `CEREMONY_TIMEOUT_MS`: Challenge lifetime (default: 60000)
//! - `CHALLENGE_LENGTH`: Challenge size in bytes (default: 32, minimum 16)
//! - `REVOKE_ON_CLONE`: Delete a credential whose counter went backwards (default: false)
//! - `SESSION_EXPIRY_HOURS`: Session inactivity timeout (default: 24)

use anyhow::{anyhow, Context, Result};
use std::env;
use std::time::Duration;

use crate::webauthn::policy::{
    AttestationConveyancePreference, CoseAlgorithm, RpPolicy, UserVerificationRequirement,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,

    /// Format: "sqlite:filename.db?mode=rwc" (read, write, create)
    pub database_url: String,

    /// Domain without scheme or port, e.g. "example.com" or "localhost"
    pub rp_id: String,

    /// Full origins, e.g. "https://example.com"
    pub rp_origins: Vec<String>,

    pub rp_name: String,

    /// COSE algorithm identifiers, in preference order
    pub rp_algorithms: Vec<i64>,

    pub rp_attestation: String,
    pub rp_user_verification: String,
    pub ceremony_timeout_ms: u64,
    pub challenge_length: usize,
    pub revoke_on_clone: bool,
    pub session_expiry_hours: i64,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// ## Example .env file
    /// ```text
    /// HOST=127.0.0.1
    /// PORT=8080
    /// DATABASE_URL=sqlite:webauth.db?mode=rwc
    /// RP_ID=localhost
    /// RP_ORIGIN=http://localhost:8080
    /// RP_NAME=WebAuth Demo
    /// RP_ALGORITHMS=-7,-8
    /// ```
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let rp_algorithms = split_list(&var_or("RP_ALGORITHMS", "-7"))
            .map(|alg| {
                alg.parse::<i64>()
                    .with_context(|| format!("RP_ALGORITHMS: {alg:?} is not an integer"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Config {
            host: var_or("HOST", "127.0.0.1"),
            port: var_or("PORT", "8080").parse().context("PORT")?,
            database_url: var_or("DATABASE_URL", "sqlite:webauth.db?mode=rwc"),
            rp_id: var_or("RP_ID", "localhost"),
            rp_origins: split_list(&var_or("RP_ORIGIN", "http://localhost:8080"))
                .map(str::to_string)
                .collect(),
            rp_name: var_or("RP_NAME", "WebAuth Demo"),
            rp_algorithms,
            rp_attestation: var_or("RP_ATTESTATION", "direct"),
            rp_user_verification: var_or("RP_USER_VERIFICATION", "discouraged"),
            ceremony_timeout_ms: var_or("CEREMONY_TIMEOUT_MS", "60000")
                .parse()
                .context("CEREMONY_TIMEOUT_MS")?,
            challenge_length: var_or("CHALLENGE_LENGTH", "32")
                .parse()
                .context("CHALLENGE_LENGTH")?,
            revoke_on_clone: var_or("REVOKE_ON_CLONE", "false")
                .parse()
                .context("REVOKE_ON_CLONE")?,
            session_expiry_hours: var_or("SESSION_EXPIRY_HOURS", "24")
                .parse()
                .context("SESSION_EXPIRY_HOURS")?,
        })
    }

    /// Validates the RP settings into the immutable policy the ceremonies use.
    pub fn rp_policy(&self) -> Result<RpPolicy> {
        let algorithms = self
            .rp_algorithms
            .iter()
            .map(|&alg| {
                CoseAlgorithm::from_i64(alg)
                    .ok_or_else(|| anyhow!("unsupported COSE algorithm {alg}"))
            })
            .collect::<Result<Vec<_>>>()?;

        let attestation = AttestationConveyancePreference::parse(&self.rp_attestation)
            .ok_or_else(|| anyhow!("RP_ATTESTATION: unknown value {:?}", self.rp_attestation))?;
        let user_verification = UserVerificationRequirement::parse(&self.rp_user_verification)
            .ok_or_else(|| {
                anyhow!("RP_USER_VERIFICATION: unknown value {:?}", self.rp_user_verification)
            })?;

        let mut builder = RpPolicy::builder(&self.rp_id, &self.rp_name)
            .algorithms(algorithms)
            .attestation(attestation)
            .user_verification(user_verification)
            .timeout(Duration::from_millis(self.ceremony_timeout_ms))
            .challenge_length(self.challenge_length);
        for origin in &self.rp_origins {
            builder = builder.origin(origin);
        }

        Ok(builder.build()?)
    }

    /// "host:port" for `tokio::net::TcpListener::bind()`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
