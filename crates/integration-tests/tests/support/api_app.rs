#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use api_server::http::{
    AppState, ClerkJwksCache, ClerkJwksCacheConfig, ClerkVerifier, build_router,
};
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use shared::llm::{OpenAiGateway, OpenAiGatewayConfig};
use shared::repos::ConversationRepository;
use tower::ServiceExt;

use super::clerk::TestClerkAuth;
use super::llm::MockLlm;

pub const CHAT_HISTORY_MAX_TURNS: usize = 6;
pub const DESCRIPTION_MAX_CHARS: usize = 42;

pub fn build_test_router(
    repository: Arc<dyn ConversationRepository>,
    clerk: &TestClerkAuth,
    llm: &MockLlm,
) -> axum::Router {
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("http client should initialize");
    let llm_gateway = OpenAiGateway::new(OpenAiGatewayConfig {
        chat_completions_url: llm.chat_completions_url.clone(),
        api_key: "test-openai-key".to_string(),
        model: "gpt-test".to_string(),
        timeout_ms: 5_000,
    })
    .expect("llm gateway should initialize");
    let clerk_jwks_cache = ClerkJwksCache::new(ClerkJwksCacheConfig {
        default_ttl_seconds: 300,
        stale_ttl_seconds: 300,
    })
    .expect("clerk jwks cache should initialize");

    build_router(AppState {
        repository,
        llm_gateway: Arc::new(llm_gateway),
        clerk: ClerkVerifier::new(
            http_client,
            clerk.jwks_url.clone(),
            clerk.issuer.clone(),
            clerk.audience.clone(),
            clerk_jwks_cache,
        ),
        calendar_description_max_chars: DESCRIPTION_MAX_CHARS,
        chat_history_max_turns: CHAT_HISTORY_MAX_TURNS,
    })
}

pub struct JsonResponse {
    pub status: StatusCode,
    pub body: Value,
}

pub async fn send_json(app: &axum::Router, request: Request<Body>) -> JsonResponse {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("request should succeed");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body should read");
    let body = serde_json::from_slice::<Value>(&body).unwrap_or_else(|_| json!({}));

    JsonResponse { status, body }
}

pub fn request(
    method: Method,
    path: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header(header::ACCEPT, "application/json");

    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, token);
    }

    let request_body = body
        .map(|value| serde_json::to_vec(&value).expect("json body should serialize"))
        .unwrap_or_default();
    if !request_body.is_empty() {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
    }

    builder
        .body(Body::from(request_body))
        .expect("integration request should build")
}

pub fn error_code(body: &Value) -> Option<&str> {
    body.get("error")?.get("code")?.as_str()
}
