//! Argon2id password hashing
//!
//! Hashes are PHC strings carrying their own salt and parameters, so a hash
//! made under old parameters still verifies after the parameters change.

use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use gazette_core::ApiError;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Argon2 cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingParams {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl HashingParams {
    /// Smallest parameters argon2 accepts; only for tests
    pub fn minimal() -> Self {
        Self {
            memory_kib: Params::MIN_M_COST,
            iterations: Params::MIN_T_COST,
            parallelism: Params::MIN_P_COST,
        }
    }
}

#[derive(Clone)]
pub struct PasswordHasher {
    argon: Argon2<'static>,
}

impl fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordHasher").finish_non_exhaustive()
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            argon: Argon2::default(),
        }
    }
}

impl PasswordHasher {
    pub fn new(params: HashingParams) -> Result<Self, ApiError> {
        let params = Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            None,
        )
        .map_err(|e| ApiError::internal(format!("invalid argon2 parameters: {e}")))?;
        Ok(Self {
            argon: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash with a fresh random 16-byte salt
    pub fn hash(&self, password: &str) -> Result<String, ApiError> {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        let salt = SaltString::encode_b64(&bytes)
            .map_err(|e| ApiError::internal(format!("failed to encode salt: {e}")))?;

        self.argon
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ApiError::internal(format!("failed to hash password: {e}")))
    }

    /// False for a wrong password and for a malformed hash
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        PasswordHash::new(hash)
            .map(|parsed| self.argon.verify_password(password.as_bytes(), &parsed).is_ok())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(HashingParams::minimal()).unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = hasher();
        let hash = hasher.hash("Correct1horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("Correct1horse", &hash));
        assert!(!hasher.verify("correct1horse", &hash));
    }

    #[test]
    fn test_salts_differ() {
        let hasher = hasher();
        assert_ne!(hasher.hash("Same1pass").unwrap(), hasher.hash("Same1pass").unwrap());
    }

    #[test]
    fn test_malformed_hash_never_verifies() {
        assert!(!hasher().verify("anything", "not-a-phc-string"));
        assert!(!hasher().verify("anything", ""));
    }

    #[test]
    fn test_hash_verifies_under_other_params() {
        let hash = hasher().hash("Portable1").unwrap();
        assert!(PasswordHasher::default().verify("Portable1", &hash));
    }

    #[test]
    fn test_rejects_invalid_params() {
        let params = HashingParams {
            memory_kib: 0,
            ..HashingParams::minimal()
        };
        assert!(PasswordHasher::new(params).is_err());
    }
}
