//! Authorization checks called by resolvers

use gazette_core::{ApiError, Identity, Principal, Role};

pub fn require_authenticated(identity: &Identity) -> Result<&Principal, ApiError> {
    identity.principal().ok_or(ApiError::Unauthenticated)
}

/// The caller must hold one of `roles`
pub fn require_role<'a>(identity: &'a Identity, roles: &[Role]) -> Result<&'a Principal, ApiError> {
    let principal = require_authenticated(identity)?;
    if roles.contains(&principal.role) {
        Ok(principal)
    } else {
        Err(ApiError::forbidden(format!(
            "Requires role {}",
            roles
                .iter()
                .map(Role::as_str)
                .collect::<Vec<_>>()
                .join(" or ")
        )))
    }
}

/// The caller must be `owner_id` or hold one of `roles`
pub fn require_owner_or_role<'a>(
    identity: &'a Identity,
    owner_id: &str,
    roles: &[Role],
) -> Result<&'a Principal, ApiError> {
    let principal = require_authenticated(identity)?;
    if principal.subject_id.as_str() == owner_id || roles.contains(&principal.role) {
        Ok(principal)
    } else {
        Err(ApiError::forbidden("Not the owner of this resource"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gazette_core::{ErrorCode, SubjectId};

    fn user(id: &str, role: Role) -> Identity {
        Identity::authenticated(SubjectId::new(id), role, Utc::now())
    }

    #[test]
    fn test_anonymous_is_unauthenticated() {
        let err = require_authenticated(&Identity::Anonymous).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unauthenticated);
        assert_eq!(
            require_role(&Identity::Anonymous, &[Role::Admin]).unwrap_err().code(),
            ErrorCode::Unauthenticated
        );
    }

    #[test]
    fn test_role_requirement() {
        assert!(require_role(&user("a", Role::Admin), &[Role::Admin]).is_ok());
        let err = require_role(&user("u", Role::User), &[Role::Admin]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }

    #[test]
    fn test_owner_or_role() {
        assert!(require_owner_or_role(&user("u1", Role::User), "u1", &[Role::Admin]).is_ok());
        assert!(require_owner_or_role(&user("a", Role::Admin), "u1", &[Role::Admin]).is_ok());
        let err =
            require_owner_or_role(&user("u2", Role::User), "u1", &[Role::Admin]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }
}
