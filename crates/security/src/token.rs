//! Signed, purpose-tagged credentials
//!
//! Tokens are HS256 JWTs. Access and refresh tokens are signed with their own
//! secrets; email-verification and password-reset tokens share a third secret
//! and are told apart by their purpose claim. Expiry is checked against the
//! injected [`Clock`], never the wall clock.
//!
//! A token may be bound to a value such as an email address. Only the
//! value's SHA-256 is carried in the claims.

use chrono::{DateTime, Duration, Utc};
use gazette_core::{ApiError, Clock, SubjectId};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    Access,
    Refresh,
    EmailVerification,
    PasswordReset,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Access => "access",
            Purpose::Refresh => "refresh",
            Purpose::EmailVerification => "email_verification",
            Purpose::PasswordReset => "password_reset",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three signing secrets, wiped from memory on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningKeys {
    access: Vec<u8>,
    refresh: Vec<u8>,
    single_use: Vec<u8>,
}

impl SigningKeys {
    pub fn new(
        access: impl Into<Vec<u8>>,
        refresh: impl Into<Vec<u8>>,
        single_use: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
            single_use: single_use.into(),
        }
    }

    fn secret(&self, purpose: Purpose) -> &[u8] {
        match purpose {
            Purpose::Access => &self.access,
            Purpose::Refresh => &self.refresh,
            Purpose::EmailVerification | Purpose::PasswordReset => &self.single_use,
        }
    }
}

impl fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeys")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .field("single_use", &"<redacted>")
            .finish()
    }
}

/// Lifetimes of each credential purpose
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenSettings {
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    pub email_verification_ttl_secs: u64,
    pub password_reset_ttl_secs: u64,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            access_ttl_secs: 15 * 60,
            refresh_ttl_secs: 7 * 24 * 60 * 60,
            email_verification_ttl_secs: 24 * 60 * 60,
            password_reset_ttl_secs: 60 * 60,
        }
    }
}

impl TokenSettings {
    pub fn ttl(&self, purpose: Purpose) -> Duration {
        let secs = match purpose {
            Purpose::Access => self.access_ttl_secs,
            Purpose::Refresh => self.refresh_ttl_secs,
            Purpose::EmailVerification => self.email_verification_ttl_secs,
            Purpose::PasswordReset => self.password_reset_ttl_secs,
        };
        saturating_seconds(secs)
    }
}

/// `secs` as a [`Duration`], saturating at [`Duration::MAX`]
pub fn saturating_seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
    purpose: Purpose,
    ver: u64,
    jti: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bnd: Option<String>,
}

/// A freshly issued token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// What a valid token proves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedCredential {
    pub subject_id: SubjectId,
    pub issued_at: DateTime<Utc>,
    pub session_version: u64,
    pub token_id: String,
    binding: Option<String>,
}

impl VerifiedCredential {
    /// True when the token was issued with [`TokenService::issue_bound`] for
    /// `value`
    pub fn is_bound_to(&self, value: &str) -> bool {
        self.binding.as_deref() == Some(TokenService::fingerprint(value).as_str())
    }
}

/// Why a token was refused; only ever logged
#[derive(Debug, thiserror::Error)]
enum Rejection {
    #[error("token could not be decoded: {0}")]
    Decode(#[from] jsonwebtoken::errors::Error),
    #[error("token expired at {0}")]
    Expired(i64),
    #[error("expected a {expected} token, got {actual}")]
    Purpose { expected: Purpose, actual: Purpose },
    #[error("issued-at {0} is not a valid timestamp")]
    IssuedAt(i64),
}

#[derive(Debug)]
pub struct TokenService {
    keys: SigningKeys,
    settings: TokenSettings,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(keys: SigningKeys, settings: TokenSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            keys,
            settings,
            clock,
        }
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    /// Issue a token for `purpose` with its configured lifetime
    pub fn issue(
        &self,
        subject: &SubjectId,
        purpose: Purpose,
        session_version: u64,
    ) -> Result<Credential, ApiError> {
        self.issue_with_ttl(subject, purpose, session_version, self.settings.ttl(purpose))
    }

    /// Issue a token that only holds for `binding`, see
    /// [`VerifiedCredential::is_bound_to`]
    pub fn issue_bound(
        &self,
        subject: &SubjectId,
        purpose: Purpose,
        session_version: u64,
        binding: &str,
    ) -> Result<Credential, ApiError> {
        self.sign(
            subject,
            purpose,
            session_version,
            self.settings.ttl(purpose),
            Some(Self::fingerprint(binding)),
        )
    }

    pub fn issue_with_ttl(
        &self,
        subject: &SubjectId,
        purpose: Purpose,
        session_version: u64,
        ttl: Duration,
    ) -> Result<Credential, ApiError> {
        self.sign(subject, purpose, session_version, ttl, None)
    }

    fn sign(
        &self,
        subject: &SubjectId,
        purpose: Purpose,
        session_version: u64,
        ttl: Duration,
        binding: Option<String>,
    ) -> Result<Credential, ApiError> {
        let now = self.clock.now();
        let expires_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            purpose,
            ver: session_version,
            jti: uuid::Uuid::new_v4().to_string(),
            bnd: binding,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.keys.secret(purpose)),
        )
        .map_err(|e| ApiError::internal(format!("failed to sign {purpose} token: {e}")))?;

        Ok(Credential { token, expires_at })
    }

    /// Check signature, expiry and purpose.
    ///
    /// Every failure is reported as [`ApiError::InvalidCredential`].
    pub fn verify(&self, token: &str, expected: Purpose) -> Result<VerifiedCredential, ApiError> {
        self.check(token, expected).map_err(|rejection| {
            debug!(purpose = %expected, reason = %rejection, "credential rejected");
            ApiError::InvalidCredential
        })
    }

    fn check(&self, token: &str, expected: Purpose) -> Result<VerifiedCredential, Rejection> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims = HashSet::new();
        validation.leeway = 0;

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.keys.secret(expected)),
            &validation,
        )?;
        let claims = data.claims;

        if claims.purpose != expected {
            return Err(Rejection::Purpose {
                expected,
                actual: claims.purpose,
            });
        }
        if self.clock.now().timestamp() >= claims.exp {
            return Err(Rejection::Expired(claims.exp));
        }
        let issued_at =
            DateTime::from_timestamp(claims.iat, 0).ok_or(Rejection::IssuedAt(claims.iat))?;

        Ok(VerifiedCredential {
            subject_id: SubjectId::new(claims.sub),
            issued_at,
            session_version: claims.ver,
            token_id: claims.jti,
            binding: claims.bnd,
        })
    }

    /// SHA-256 of a token, hex encoded; stored instead of the token itself
    pub fn fingerprint(token: &str) -> String {
        hex::encode(Sha256::digest(token.as_bytes()))
    }
}
