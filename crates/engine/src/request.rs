//! Request body and pipeline outcome

use gazette_core::Response;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `POST /graphql` body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRequest {
    pub query: String,
    #[serde(default)]
    pub variables: Option<Map<String, Value>>,
    #[serde(default)]
    pub operation_name: Option<String>,
}

impl GraphRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn variables(mut self, variables: Value) -> Self {
        self.variables = match variables {
            Value::Object(map) => Some(map),
            _ => None,
        };
        self
    }

    #[must_use]
    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }
}

/// How the response cache took part in answering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit { age: u64 },
    Miss,
    /// Not eligible for the cache at all
    Bypass,
}

impl CacheStatus {
    /// Value of the `x-cache` response header
    pub fn header_value(&self) -> &'static str {
        match self {
            CacheStatus::Hit { .. } => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Bypass => "BYPASS",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub response: Response,
    pub cache: CacheStatus,
}

impl ExecutionOutcome {
    pub fn new(response: Response, cache: CacheStatus) -> Self {
        Self { response, cache }
    }

    pub fn bypass(response: Response) -> Self {
        Self::new(response, CacheStatus::Bypass)
    }
}
