//! Per-request state handed to resolvers

use crate::services::Services;
use gazette_core::{DocumentStore, Identity, SubjectId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug)]
pub struct RequestContext {
    identity: Identity,
    services: Arc<Services>,
    request_id: String,
    private: AtomicBool,
    /// Accounts that proved their credentials earlier in this request
    signed_in: Mutex<Vec<SubjectId>>,
}

impl RequestContext {
    pub fn new(identity: Identity, services: Arc<Services>, request_id: impl Into<String>) -> Self {
        Self {
            identity,
            services,
            request_id: request_id.into(),
            private: AtomicBool::new(false),
            signed_in: Mutex::new(Vec::new()),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.services.store.as_ref()
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// The response depends on who asked and must not be cached
    pub fn mark_private(&self) {
        self.private.store(true, Ordering::Relaxed);
    }

    pub fn is_private(&self) -> bool {
        self.private.load(Ordering::Relaxed)
    }

    /// Record that the caller just signed in as `subject`, through a
    /// registration or a login in this same request
    pub fn signed_in_as(&self, subject: SubjectId) {
        self.signed_in.lock().push(subject);
    }

    /// True when the caller is `id`, by bearer credential or by signing in
    /// during this request
    pub fn acts_for(&self, id: &str) -> bool {
        self.identity.is_subject(id)
            || self.signed_in.lock().iter().any(|subject| subject.as_str() == id)
    }
}
