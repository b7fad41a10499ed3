#![allow(dead_code)]

use gazette_cache::{MemoryBackend, ResponseCache, ResponseCacheConfig};
use gazette_core::testing::RecordingMailer;
use gazette_core::{ManualClock, MemoryStore};
use gazette_engine::{AccountSettings, ExecutionOutcome, GraphRequest, Pipeline, Services};
use gazette_query::CostPolicy;
use gazette_security::{HashingParams, PasswordHasher, SigningKeys, TokenService, TokenSettings};
use serde_json::{json, Value};
use std::sync::Arc;

pub const PASSWORD: &str = "Secret123!";
pub const ADMIN_EMAIL: &str = "admin@x.com";

/// A pipeline wired to in-memory collaborators, with handles on each of them
pub struct Harness {
    pub pipeline: Pipeline,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    pub clock: Arc<ManualClock>,
}

/// Credentials returned by `register`
pub struct Session {
    pub user_id: String,
    pub access: String,
    pub refresh: String,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(CostPolicy::default(), Arc::new(RecordingMailer::new()))
    }

    pub fn with_cost(cost: CostPolicy) -> Self {
        Self::build(cost, Arc::new(RecordingMailer::new()))
    }

    pub fn with_mailer(mailer: RecordingMailer) -> Self {
        Self::build(CostPolicy::default(), Arc::new(mailer))
    }

    fn build(cost: CostPolicy, mailer: Arc<RecordingMailer>) -> Self {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemoryStore::new());
        let tokens = Arc::new(TokenService::new(
            SigningKeys::new("access-secret", "refresh-secret", "single-use-secret"),
            TokenSettings::default(),
            clock.clone(),
        ));
        let cache = Arc::new(ResponseCache::new(
            Arc::new(MemoryBackend::new(clock.clone())),
            ResponseCacheConfig::default(),
            clock.clone(),
        ));
        let services = Services {
            store: store.clone(),
            tokens,
            passwords: PasswordHasher::new(HashingParams::minimal()).unwrap(),
            mailer: mailer.clone(),
            cache,
            clock: clock.clone(),
            accounts: AccountSettings {
                admin_emails: vec![ADMIN_EMAIL.to_string()],
                ..AccountSettings::default()
            },
        };
        Self {
            pipeline: Pipeline::new(Arc::new(services), cost),
            store,
            mailer,
            clock,
        }
    }

    pub async fn run(&self, query: &str, variables: Value, token: Option<&str>) -> ExecutionOutcome {
        let header = token.map(|token| format!("Bearer {token}"));
        self.pipeline
            .execute(GraphRequest::new(query).variables(variables), header.as_deref())
            .await
    }

    /// Run and return the serialized envelope
    pub async fn json(&self, query: &str, variables: Value, token: Option<&str>) -> Value {
        serde_json::to_value(self.run(query, variables, token).await.response).unwrap()
    }

    pub async fn register(&self, username: &str, email: &str) -> Session {
        let body = self
            .json(
                "mutation Register($input: RegisterInput!) {
                   register(input: $input) { user { id } accessToken refreshToken }
                 }",
                json!({"input": {"username": username, "email": email, "password": PASSWORD}}),
                None,
            )
            .await;
        let payload = &body["data"]["register"];
        assert!(payload.is_object(), "registration failed: {body}");
        Session {
            user_id: payload["user"]["id"].as_str().unwrap().to_string(),
            access: payload["accessToken"].as_str().unwrap().to_string(),
            refresh: payload["refreshToken"].as_str().unwrap().to_string(),
        }
    }

    pub async fn create_post(&self, session: &Session, title: &str, published: bool) -> String {
        let body = self
            .json(
                "mutation Create($input: PostInput!) { createPost(input: $input) { id } }",
                json!({"input": {"title": title, "body": "Body text", "published": published}}),
                Some(&session.access),
            )
            .await;
        body["data"]["createPost"]["id"]
            .as_str()
            .unwrap_or_else(|| panic!("createPost failed: {body}"))
            .to_string()
    }

    /// The credential carried by the last mail sent to `to`
    pub fn mailed_token(&self, to: &str) -> String {
        let message = self.mailer.last_to(to).expect("no mail sent");
        let text = message.text.expect("mail has no text part");
        text.split("token=").nth(1).expect("mail has no token").to_string()
    }
}

/// The `extensions.code` of the first error
pub fn first_code(body: &Value) -> &str {
    body["errors"][0]["extensions"]["code"].as_str().unwrap_or("")
}
