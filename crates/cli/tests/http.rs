use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use chrono::Duration;
use gazette::{Server, ServerConfig};
use gazette_core::testing::RecordingMailer;
use gazette_core::ManualClock;
use gazette_security::HashingParams;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct TestServer {
    server: Server,
    clock: Arc<ManualClock>,
}

fn config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.auth.access_secret = "access".into();
    config.auth.refresh_secret = "refresh".into();
    config.auth.single_use_secret = "single-use".into();
    config.auth.hashing = HashingParams::minimal();
    config
}

fn start(config: ServerConfig) -> TestServer {
    let clock = Arc::new(ManualClock::default());
    let server =
        Server::build_with(&config, clock.clone(), Arc::new(RecordingMailer::new())).unwrap();
    TestServer { server, clock }
}

fn graphql(body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/graphql")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(server: &TestServer, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = server.server.router().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

fn header_str<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[tokio::test]
async fn test_health_reports_ok() {
    let server = start(config());
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, _, body) = send(&server, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["uptime"].is_u64());
}

#[tokio::test]
async fn test_anonymous_query_is_cached_with_age() {
    let server = start(config());
    let query = json!({"query": "query Feed { posts { id title } }"});

    let (status, headers, first) = send(&server, graphql(query.clone(), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(header_str(&headers, "x-cache"), Some("MISS"));
    assert!(headers.get(header::AGE).is_none());
    assert_eq!(first, json!({"data": {"posts": []}}));

    server.clock.advance(Duration::seconds(3));
    let (_, headers, second) = send(&server, graphql(query, None)).await;
    assert_eq!(header_str(&headers, "x-cache"), Some("HIT"));
    assert_eq!(header_str(&headers, "age"), Some("3"));
    assert_eq!(second, first);
}

#[tokio::test]
async fn test_signed_in_requests_bypass_the_cache() {
    let server = start(config());
    let register = json!({
        "query": "mutation Register($input: RegisterInput!) { register(input: $input) { accessToken } }",
        "variables": {"input": {"username": "ada", "email": "ada@x.com", "password": "Secret123!"}},
        "operationName": "Register",
    });
    let (_, headers, body) = send(&server, graphql(register, None)).await;
    assert_eq!(header_str(&headers, "x-cache"), Some("BYPASS"));
    let token = body["data"]["register"]["accessToken"].as_str().unwrap().to_string();

    let me = json!({"query": "{ me { username } }"});
    let (status, headers, body) = send(&server, graphql(me, Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(header_str(&headers, "x-cache"), Some("BYPASS"));
    assert_eq!(body["data"]["me"]["username"], "ada");
}

#[tokio::test]
async fn test_unparsable_body_is_a_bad_request() {
    let server = start(config());
    let request = Request::builder()
        .method("POST")
        .uri("/graphql")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let (status, _, body) = send(&server, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["data"], Value::Null);
    assert_eq!(body["errors"][0]["extensions"]["code"], "MalformedOperation");
}

#[tokio::test]
async fn test_structural_errors_still_answer_200() {
    let server = start(config());
    let (status, _, body) = send(&server, graphql(json!({"query": "{ posts { "}), None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], Value::Null);
    assert_eq!(body["errors"][0]["extensions"]["code"], "MalformedOperation");
}

#[tokio::test]
async fn test_rate_limit_rejects_before_the_pipeline() {
    let mut config = config();
    config.rate_limit.requests = 2;
    let server = start(config);
    let query = json!({"query": "{ posts { id } }"});

    for _ in 0..2 {
        let (status, _, _) = send(&server, graphql(query.clone(), None)).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, headers, body) = send(&server, graphql(query, None)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(headers.get(header::RETRY_AFTER).is_some());
    assert_eq!(body["data"], Value::Null);
    assert_eq!(body["errors"][0]["extensions"]["code"], "RateLimited");

    let health = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, _, _) = send(&server, health).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_forwarded_callers_are_limited_separately() {
    let mut config = config();
    config.rate_limit.requests = 1;
    config.server.trust_forwarded_for = true;
    let server = start(config);

    for caller in ["203.0.113.1", "203.0.113.2"] {
        let mut request = graphql(json!({"query": "{ posts { id } }"}), None);
        request
            .headers_mut()
            .insert("x-forwarded-for", caller.parse().unwrap());
        let (status, _, _) = send(&server, request).await;
        assert_eq!(status, StatusCode::OK);
    }

    let mut request = graphql(json!({"query": "{ posts { id } }"}), None);
    request
        .headers_mut()
        .insert("x-forwarded-for", "203.0.113.1".parse().unwrap());
    let (status, _, _) = send(&server, request).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_cost_limits_come_from_config() {
    let mut config = config();
    config.cost.max_depth = 2;
    let server = start(config);

    let query = json!({"query": "{ posts { author { posts { id } } } }"});
    let (status, headers, body) = send(&server, graphql(query, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(header_str(&headers, "x-cache"), Some("BYPASS"));
    assert_eq!(body["errors"][0]["extensions"]["code"], "QueryDepthLimitExceeded");
    assert_eq!(body["errors"][0]["extensions"]["limit"], 2);
}

#[test]
fn test_invalid_config_refuses_to_build() {
    let mut config = config();
    config.auth.refresh_secret = "access".into();
    assert!(Server::build(&config).is_err());
}
