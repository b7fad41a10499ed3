//! Per-request identity
//!
//! An [`Identity`] is derived fresh from the inbound credential on every
//! request, attached once, and dropped when the request ends. Consumers match
//! on it exhaustively; there is no "maybe a user" state.

use super::newtypes::SubjectId;
use crate::errors::ApiError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account role. Serialized in one canonical lowercase form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsing is case-insensitive so stored `"ADMIN"` and `"admin"` agree.
impl FromStr for Role {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(ApiError::validation(
                "role",
                format!("Unknown role '{other}'"),
            )),
        }
    }
}

/// An authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject_id: SubjectId,
    pub role: Role,
    pub issued_at: DateTime<Utc>,
}

/// Resolved caller context for one request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Identity {
    #[default]
    Anonymous,
    Authenticated(Principal),
}

impl Identity {
    pub fn authenticated(subject_id: SubjectId, role: Role, issued_at: DateTime<Utc>) -> Self {
        Identity::Authenticated(Principal {
            subject_id,
            role,
            issued_at,
        })
    }

    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Identity::Anonymous => None,
            Identity::Authenticated(principal) => Some(principal),
        }
    }

    pub fn subject_id(&self) -> Option<&SubjectId> {
        self.principal().map(|p| &p.subject_id)
    }

    pub fn role(&self) -> Option<Role> {
        self.principal().map(|p| p.role)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::Authenticated(_))
    }

    /// True when the caller is the subject with this id
    pub fn is_subject(&self, id: &str) -> bool {
        match self {
            Identity::Anonymous => false,
            Identity::Authenticated(p) => p.subject_id.as_str() == id,
        }
    }

    pub fn has_role(&self, roles: &[Role]) -> bool {
        match self {
            Identity::Anonymous => false,
            Identity::Authenticated(p) => roles.contains(&p.role),
        }
    }
}
