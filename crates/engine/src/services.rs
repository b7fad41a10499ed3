//! Collaborators shared by every request

use gazette_cache::ResponseCache;
use gazette_core::{Clock, DocumentStore, Mailer};
use gazette_security::{PasswordHasher, TokenService};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Account behaviour that is configuration rather than code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountSettings {
    /// Base URL used in links sent by mail
    pub public_url: String,
    /// Accounts registered with one of these addresses start as admins
    pub admin_emails: Vec<String>,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            public_url: "http://localhost:4000".to_string(),
            admin_emails: Vec::new(),
        }
    }
}

impl AccountSettings {
    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails
            .iter()
            .any(|admin| admin.eq_ignore_ascii_case(email))
    }
}

/// Everything a resolver may reach, constructed once and shared
pub struct Services {
    pub store: Arc<dyn DocumentStore>,
    pub tokens: Arc<TokenService>,
    pub passwords: PasswordHasher,
    pub mailer: Arc<dyn Mailer>,
    pub cache: Arc<ResponseCache>,
    pub clock: Arc<dyn Clock>,
    pub accounts: AccountSettings,
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("tokens", &self.tokens)
            .field("clock", &self.clock)
            .field("accounts", &self.accounts)
            .finish_non_exhaustive()
    }
}
