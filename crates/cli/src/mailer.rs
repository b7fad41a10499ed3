//! Development mailer that writes messages to the log

use async_trait::async_trait;
use gazette_core::{MailMessage, Mailer};
use tracing::{debug, info};

#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: MailMessage) -> bool {
        info!(to = %message.to, subject = %message.subject, "mail queued");
        if let Some(text) = &message.text {
            debug!(to = %message.to, body = %text, "mail body");
        }
        true
    }
}
