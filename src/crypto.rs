//! Password hashing.

use std::sync::LazyLock;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Argon2, Params, Version};
use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::OsRng;
use regex_lite::Regex;
use serde::Serialize;

use crate::config::Argon2 as ArgonConfig;

/// Prefix of a password that can never be verified.
pub const UNUSABLE_PASSWORD_PREFIX: &str = "!";
const UNUSABLE_PASSWORD_SUFFIX_LENGTH: usize = 40;

static PHC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$([a-z0-9-]{1,32})(?:\$v=(\d+))?(?:\$([^$]+))?\$([^$]+)\$([^$]+)$")
        .expect("PHC regex is valid")
});

type Result<T> = std::result::Result<T, CryptoError>;

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("argon2 error: {0}")]
    Argon2(String),
}

/// Password manager that uses Argon2id and PHC string format for hashing and
/// verification.
pub struct PasswordManager {
    params: Params,
}

impl std::fmt::Debug for PasswordManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordManager")
            .field("m_cost", &self.params.m_cost())
            .field("t_cost", &self.params.t_cost())
            .field("p_cost", &self.params.p_cost())
            .finish()
    }
}

impl PasswordManager {
    /// Create a new [`PasswordManager`].
    pub fn new(config: Option<ArgonConfig>) -> Result<Self> {
        let config = config.unwrap_or_default();

        let params = Params::new(
            config.memory_cost,
            config.iterations,
            config.parallelism,
            Some(config.hash_length),
        )
        .map_err(|err| CryptoError::Argon2(err.to_string()))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'_> {
        Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash password using Argon2id.
    pub fn hash_password(&self, password: impl AsRef<[u8]>) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_ref(), &salt)
            .map_err(|e| CryptoError::Argon2(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Verify password against a PHC string.
    ///
    /// Unusable and malformed hashes never verify.
    pub fn verify_password(&self, password: impl AsRef<[u8]>, phc_hash: &str) -> bool {
        if !is_usable(phc_hash) {
            return false;
        }

        match PasswordHash::new(phc_hash) {
            Ok(parsed) => self
                .argon2()
                .verify_password(password.as_ref(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    /// Value stored for accounts created without a password.
    pub fn unusable_password(&self) -> String {
        format!(
            "{UNUSABLE_PASSWORD_PREFIX}{}",
            Alphanumeric.sample_string(&mut OsRng, UNUSABLE_PASSWORD_SUFFIX_LENGTH)
        )
    }
}

/// Whether a stored password can ever match.
pub fn is_usable(stored: &str) -> bool {
    !stored.starts_with(UNUSABLE_PASSWORD_PREFIX)
}

/// Read-only description of a stored hash. Never contains the hash itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PasswordSummary {
    pub algorithm: String,
    pub version: Option<String>,
    pub params: Option<String>,
    /// First characters of the salt, the rest is masked.
    pub salt: String,
}

/// Describe a stored PHC string.
///
/// Returns `None` for unusable or unrecognised values.
pub fn summarize(stored: &str) -> Option<PasswordSummary> {
    if !is_usable(stored) {
        return None;
    }

    let captures = PHC_RE.captures(stored)?;
    let salt = captures.get(4).map(|m| m.as_str()).unwrap_or_default();

    Some(PasswordSummary {
        algorithm: captures.get(1)?.as_str().to_owned(),
        version: captures.get(2).map(|m| m.as_str().to_owned()),
        params: captures.get(3).map(|m| m.as_str().to_owned()),
        salt: mask(salt),
    })
}

fn mask(value: &str) -> String {
    let shown = value.chars().take(6).collect::<String>();
    let hidden = value.chars().count().saturating_sub(6);
    format!("{shown}{}", "*".repeat(hidden))
}

#[cfg(test)]
pub(crate) fn test_manager() -> PasswordManager {
    PasswordManager::new(Some(ArgonConfig {
        memory_cost: 64,
        iterations: 1,
        parallelism: 1,
        hash_length: 32,
    }))
    .expect("valid test parameters")
}
