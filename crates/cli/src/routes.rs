//! HTTP surface: `POST /graphql` and `GET /health`

use crate::limiting::{caller_key, RateLimiter};
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use gazette_core::{ApiError, Response as Envelope};
use gazette_engine::{CacheStatus, GraphRequest, Pipeline};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

pub const CACHE_HEADER: &str = "x-cache";

#[derive(Debug, Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// `None` when rate limiting is disabled
    pub limiter: Option<Arc<RateLimiter>>,
    pub trust_forwarded_for: bool,
    pub started: Instant,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            limiter: None,
            trust_forwarded_for: false,
            started: Instant::now(),
        }
    }

    #[must_use]
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    #[must_use]
    pub fn trust_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/graphql", post(graphql))
        .route("/health", get(health))
        .with_state(state)
}

async fn graphql(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Result<Json<GraphRequest>, JsonRejection>,
) -> Response {
    if let Some(limiter) = &state.limiter {
        let caller = caller_key(
            &headers,
            peer.map(|ConnectInfo(addr)| addr),
            state.trust_forwarded_for,
        );
        if let Err(exceeded) = limiter.check(&caller).await {
            warn!(caller = %caller, "rate limit exceeded");
            let error = ApiError::RateLimited {
                retry_after_secs: exceeded.retry_after_secs,
            };
            let mut response =
                (StatusCode::TOO_MANY_REQUESTS, Json(Envelope::from_error(&error))).into_response();
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(exceeded.retry_after_secs),
            );
            return response;
        }
    }

    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!(error = %rejection, "unreadable request body");
            let error = ApiError::malformed(
                format!("Invalid request body: {}", rejection.body_text()),
                None,
            );
            return (StatusCode::BAD_REQUEST, Json(Envelope::from_error(&error))).into_response();
        }
    };

    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let outcome = state.pipeline.execute(request, authorization).await;

    let mut response = (StatusCode::OK, Json(outcome.response)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        CACHE_HEADER,
        HeaderValue::from_static(outcome.cache.header_value()),
    );
    if let CacheStatus::Hit { age } = outcome.cache {
        headers.insert(header::AGE, HeaderValue::from(age));
    }
    response
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "uptime": state.started.elapsed().as_secs(),
    }))
}
