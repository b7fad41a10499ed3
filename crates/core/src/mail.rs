//! Outbound mail contract
//!
//! Delivery is best-effort: callers log a `false` return and carry on.

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Returns whether the message was accepted for delivery
    async fn send(&self, message: MailMessage) -> bool;
}
