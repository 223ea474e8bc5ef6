//! HTTP route tests driven through the router without a socket.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use ragchat::adapter::local::LocalAdapter;
use ragchat::limiter::RequestLimiter;
use ragchat::server::{create_router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{scripted_engine, MockAdapter, ScriptedBackend, ScriptedModel};

fn app(adapter: Arc<MockAdapter>, limit: usize) -> (axum::Router, RequestLimiter) {
    let limiter = RequestLimiter::new(limit);
    let state = AppState::new(adapter, limiter.clone());
    (create_router(state), limiter)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn info_and_default_config() {
    let (router, _) = app(Arc::new(MockAdapter::new(&[])), 3);

    let response = router.clone().oneshot(get("/chat/info")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"name": "Mock", "model": "mock-1", "accelerator": "External API"})
    );

    let response = router.oneshot(get("/chat/default_config")).await.unwrap();
    assert_eq!(
        body_json(response).await,
        json!({"config": {"temperature": 0.7, "max_new_tokens": 128}})
    );
}

#[tokio::test]
async fn prompt_returns_content_with_merged_config() {
    let adapter = Arc::new(MockAdapter::new(&["Hello ", "there"]));
    let (router, limiter) = app(Arc::clone(&adapter), 3);

    let response = router
        .oneshot(post_json(
            "/chat/prompt",
            json!({
                "messages": [{"role": "user", "content": "hi"}],
                "config": {"max_new_tokens": 50, "num_beams": 4},
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"content": "Hello there"}));

    let config = adapter.last_config().unwrap();
    assert_eq!(config.max_new_tokens, Some(50));
    assert_eq!(config.temperature, Some(0.7));
    assert_eq!(limiter.available_permits(), 2);
}

#[tokio::test]
async fn saturated_limiter_answers_503() {
    let adapter = Arc::new(MockAdapter::new(&["never"]));
    let (router, limiter) = app(Arc::clone(&adapter), 2);
    let _held = limiter.try_acquire().unwrap();

    let response = router
        .clone()
        .oneshot(get("/chat/availability"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await, json!(false));

    let response = router
        .oneshot(post_json(
            "/chat/prompt",
            json!({"messages": [{"role": "user", "content": "hi"}]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        body_json(response).await,
        json!({"detail": "The server is busy processing requests."})
    );
    assert_eq!(adapter.calls(), 0);
}

#[tokio::test]
async fn availability_is_true_when_idle() {
    let (router, limiter) = app(Arc::new(MockAdapter::new(&[])), 2);
    let response = router.oneshot(get("/chat/availability")).await.unwrap();
    assert_eq!(body_json(response).await, json!(true));
    assert_eq!(limiter.available_permits(), 1);
}

#[tokio::test]
async fn invalid_requests_answer_400() {
    let adapter = Arc::new(MockAdapter::new(&["x"]));
    let (router, _) = app(Arc::clone(&adapter), 3);

    let response = router
        .clone()
        .oneshot(post_json("/chat/prompt", json!({"messages": []})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = router
        .oneshot(post_json(
            "/chat/prompt",
            json!({
                "messages": [{"role": "user", "content": "hi"}],
                "config": {"top_p": 3.0},
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(adapter.calls(), 0);
}

#[tokio::test]
async fn backend_failure_answers_500() {
    let (router, limiter) = app(Arc::new(MockAdapter::new(&["x"]).failing_after(0)), 3);
    let response = router
        .oneshot(post_json(
            "/chat/prompt",
            json!({"messages": [{"role": "user", "content": "hi"}]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_json(response).await["detail"]
        .as_str()
        .unwrap()
        .contains("mock failure"));
    assert_eq!(limiter.available_permits(), 2);
}

#[tokio::test]
async fn streaming_prompt_returns_plain_text_chunks() {
    let (router, limiter) = app(Arc::new(MockAdapter::new(&["one ", "two ", "three"])), 3);
    let response = router
        .oneshot(post_json(
            "/chat/prompt_streaming",
            json!({"messages": [{"role": "user", "content": "count"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert_eq!(body_bytes(response).await, b"one two three");
    assert_eq!(limiter.available_permits(), 2);
}

#[tokio::test]
async fn streaming_permit_is_held_until_body_is_consumed() {
    let (router, limiter) = app(Arc::new(MockAdapter::new(&["a", "b"])), 2);
    let response = router
        .oneshot(post_json(
            "/chat/prompt_streaming",
            json!({"messages": [{"role": "user", "content": "x"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(limiter.available_permits(), 0);
    drop(response);
    assert_eq!(limiter.available_permits(), 1);
}

#[tokio::test]
async fn streaming_error_aborts_the_body() {
    let (router, _) = app(Arc::new(MockAdapter::new(&["ok ", "never"]).failing_after(1)), 3);
    let response = router
        .oneshot(post_json(
            "/chat/prompt_streaming",
            json!({"messages": [{"role": "user", "content": "x"}]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.into_body().collect().await.is_err());
}

#[tokio::test]
async fn streaming_over_a_local_model_honors_stop_words() {
    let engine = scripted_engine(ScriptedModel::new(" Fine thanks.\nHuman: and you"));
    let adapter = LocalAdapter::with_engine(
        ScriptedBackend {
            reply: String::new(),
        },
        engine,
    );
    let state = AppState::new(Arc::new(adapter), RequestLimiter::new(3));
    let response = create_router(state)
        .oneshot(post_json(
            "/chat/prompt_streaming",
            json!({
                "messages": [{"role": "user", "content": "How are you?"}],
                "stop_words": ["Human:"],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(body_bytes(response).await, b" Fine thanks.\n");
}

#[tokio::test]
async fn health_routes() {
    let (router, _) = app(Arc::new(MockAdapter::new(&[])), 2);

    let response = router.clone().oneshot(get("/health/status")).await.unwrap();
    assert_eq!(body_json(response).await, json!(true));

    let response = router.clone().oneshot(get("/health/version")).await.unwrap();
    assert_eq!(
        body_json(response).await,
        json!({"version": env!("CARGO_PKG_VERSION")})
    );

    let response = router.oneshot(get("/health/health")).await.unwrap();
    let health = body_json(response).await;
    assert!(health["cpu"]["used"].is_number());
    assert!(health["memory"]["used"].is_number());
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));
}
