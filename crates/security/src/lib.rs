//! Credentials and access control for gazette
//!
//! - [`TokenService`] issues and verifies signed, purpose-tagged credentials
//! - [`password`] hashes and verifies passwords with Argon2id
//! - [`IdentityResolver`] turns an `Authorization` header into an [`Identity`]
//! - [`authorize`] holds the checks resolvers call before touching data
//!
//! [`Identity`]: gazette_core::Identity

pub mod authorize;
pub mod identity;
pub mod password;
pub mod token;

pub use authorize::{require_authenticated, require_owner_or_role, require_role};
pub use identity::{bearer_token, IdentityResolver};
pub use password::{HashingParams, PasswordHasher};
pub use token::{Credential, Purpose, SigningKeys, TokenService, TokenSettings, VerifiedCredential};
