//! Test doubles shared by the workspace's test suites

use crate::mail::{MailMessage, Mailer};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// A [`Mailer`] that records every message and can be told to fail
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<MailMessage>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose every send reports failure
    pub fn failing() -> Self {
        let mailer = Self::default();
        mailer.failing.store(true, Ordering::SeqCst);
        mailer
    }

    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().clone()
    }

    /// The most recent message addressed to `to`
    pub fn last_to(&self, to: &str) -> Option<MailMessage> {
        self.sent.lock().iter().rev().find(|m| m.to == to).cloned()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: MailMessage) -> bool {
        if self.failing.load(Ordering::SeqCst) {
            return false;
        }
        self.sent.lock().push(message);
        true
    }
}
