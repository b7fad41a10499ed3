//! Header-to-identity resolution
//!
//! Runs once per operation. Any problem with the credential or the subject it
//! names yields [`Identity::Anonymous`]; resolution itself never fails.

use crate::token::{Purpose, TokenService};
use gazette_core::{Collection, DocumentStore, Identity, Role};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Extract the token from `Bearer <token>`; the scheme is case-insensitive
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(char::is_whitespace)?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

#[derive(Clone)]
pub struct IdentityResolver {
    tokens: Arc<TokenService>,
    store: Arc<dyn DocumentStore>,
}

impl IdentityResolver {
    pub fn new(tokens: Arc<TokenService>, store: Arc<dyn DocumentStore>) -> Self {
        Self { tokens, store }
    }

    /// Resolve the raw `Authorization` header value.
    ///
    /// The subject is re-read from the store on every call, so a deleted
    /// account, a changed role or a bumped session version takes effect on
    /// the next request.
    pub async fn resolve(&self, raw_header: Option<&str>) -> Identity {
        let Some(token) = raw_header.and_then(bearer_token) else {
            return Identity::Anonymous;
        };

        let Ok(verified) = self.tokens.verify(token, Purpose::Access) else {
            return Identity::Anonymous;
        };

        let user = match self
            .store
            .find_by_id(Collection::Users, verified.subject_id.as_str())
            .await
        {
            Ok(Some(user)) => user,
            Ok(None) => {
                debug!(subject = %verified.subject_id, "credential names a missing user");
                return Identity::Anonymous;
            }
            Err(e) => {
                warn!(error = %e, "store failure while resolving identity");
                return Identity::Anonymous;
            }
        };

        let current_version = user
            .get("sessionVersion")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        if current_version != verified.session_version {
            debug!(subject = %verified.subject_id, "credential from a revoked session");
            return Identity::Anonymous;
        }

        let role = match user.get("role").and_then(Value::as_str).map(str::parse::<Role>) {
            Some(Ok(role)) => role,
            _ => {
                warn!(subject = %verified.subject_id, "user has no recognised role");
                return Identity::Anonymous;
            }
        };

        Identity::authenticated(verified.subject_id, role, verified.issued_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{SigningKeys, TokenSettings};
    use gazette_core::{ManualClock, MemoryStore, SubjectId};
    use serde_json::json;

    struct Fixture {
        resolver: IdentityResolver,
        tokens: Arc<TokenService>,
        store: Arc<MemoryStore>,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let tokens = Arc::new(TokenService::new(
            SigningKeys::new("a", "r", "s"),
            TokenSettings::default(),
            Arc::new(ManualClock::default()),
        ));
        let user = json!({"id": "u1", "username": "ada", "role": "ADMIN", "sessionVersion": 2});
        store
            .insert(Collection::Users, user.as_object().cloned().unwrap())
            .await
            .unwrap();
        Fixture {
            resolver: IdentityResolver::new(tokens.clone(), store.clone()),
            tokens,
            store,
        }
    }

    fn header(fx: &Fixture, purpose: Purpose, version: u64) -> String {
        let credential = fx
            .tokens
            .issue(&SubjectId::new("u1"), purpose, version)
            .unwrap();
        format!("Bearer {}", credential.token)
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer   abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token(""), None);
    }

    #[tokio::test]
    async fn test_valid_access_token() {
        let fx = fixture().await;
        let identity = fx.resolver.resolve(Some(&header(&fx, Purpose::Access, 2))).await;
        assert!(identity.is_subject("u1"));
        assert_eq!(identity.role(), Some(Role::Admin));
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent() {
        let fx = fixture().await;
        let raw = header(&fx, Purpose::Access, 2);
        let first = fx.resolver.resolve(Some(&raw)).await;
        let second = fx.resolver.resolve(Some(&raw)).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_anonymous_cases() {
        let fx = fixture().await;
        assert_eq!(fx.resolver.resolve(None).await, Identity::Anonymous);
        assert_eq!(fx.resolver.resolve(Some("Bearer junk")).await, Identity::Anonymous);

        let refresh = header(&fx, Purpose::Refresh, 2);
        assert_eq!(fx.resolver.resolve(Some(&refresh)).await, Identity::Anonymous);

        let stale = header(&fx, Purpose::Access, 1);
        assert_eq!(fx.resolver.resolve(Some(&stale)).await, Identity::Anonymous);
    }

    #[tokio::test]
    async fn test_store_failure_degrades_to_anonymous() {
        let fx = fixture().await;
        let raw = header(&fx, Purpose::Access, 2);
        fx.store.set_failure(Some("connection reset"));
        assert_eq!(fx.resolver.resolve(Some(&raw)).await, Identity::Anonymous);
    }

    #[tokio::test]
    async fn test_deleted_user_is_anonymous() {
        let fx = fixture().await;
        let raw = header(&fx, Purpose::Access, 2);
        fx.store.delete_by_id(Collection::Users, "u1").await.unwrap();
        assert_eq!(fx.resolver.resolve(Some(&raw)).await, Identity::Anonymous);
    }
}
