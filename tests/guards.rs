#[path = "common/mod.rs"]
mod common;

use axum::body::Body;
use bytes::Bytes;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{state_with, EnvGuard, StubLlm};
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use paper_assist::*;
use std::convert::Infallible;
use tokio::sync::Mutex;
use tower::ServiceExt; // for oneshot

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

async fn json_body(resp: axum::response::Response) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn request_size_guard_triggers() {
    let _lock = ENV_MUTEX.lock().await;
    let mut env = EnvGuard::new();
    env.set("ASSIST_MAX_REQUEST_BYTES", "64");
    env.remove("ASSIST_CONFIG");
    let state = build_state_from_env().unwrap();
    let app: Router = app(state);

    let payload = serde_json::json!({ "text": "x".repeat(500) });
    let body = serde_json::to_vec(&payload).unwrap();
    let req = Request::builder()
        .method("POST")
        .uri("/api/classify-bookmark")
        .header("content-type", "application/json")
        .header("content-length", body.len().to_string())
        .body(Body::from(body))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let json = json_body(resp).await;
    assert_eq!(json["category"], "other");
    assert!(json["error"].as_str().unwrap().contains("64 bytes"));
}

#[tokio::test]
async fn streamed_body_without_length_hits_the_same_limit() {
    let _lock = ENV_MUTEX.lock().await;
    let mut env = EnvGuard::new();
    env.set("ASSIST_MAX_REQUEST_BYTES", "256");
    env.remove("ASSIST_CONFIG");
    let app = app(build_state_from_env().unwrap());

    let payload = serde_json::json!({
        "text": "X".repeat(2048),
        "transformType": "formalize",
        "context": common::context()
    })
    .to_string();
    let pieces: Vec<Result<Bytes, Infallible>> = payload
        .into_bytes()
        .chunks(128)
        .map(|piece| Ok(Bytes::copy_from_slice(piece)))
        .collect();
    let req = Request::builder()
        .method("POST")
        .uri("/api/polish-text")
        .header("content-type", "application/json")
        .body(Body::from_stream(tokio_stream::iter(pieces)))
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let json = json_body(resp).await;
    assert_eq!(json["polishedText"], "");
    assert!(json["error"].as_str().unwrap().starts_with("Request too large"));
}

#[tokio::test]
async fn options_answers_no_content_with_cors() {
    let app = app(state_with(None));
    let req = Request::builder()
        .method("OPTIONS")
        .uri("/api/polish-text")
        .header("origin", "https://school.example")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn browser_preflight_is_allowed() {
    let app = app(state_with(None));
    let req = Request::builder()
        .method("OPTIONS")
        .uri("/api/check-idea")
        .header("origin", "https://school.example")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
    assert!(resp.headers().contains_key("access-control-allow-methods"));
}

#[tokio::test]
async fn post_responses_carry_cors_header() {
    let llm = StubLlm::replying("case_study");
    let app = app(state_with(Some(llm)));
    let req = Request::builder()
        .method("POST")
        .uri("/api/classify-bookmark")
        .header("origin", "https://school.example")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"text":"Rwanda banned plastic bags in 2008"}"#))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
    let json = json_body(resp).await;
    assert_eq!(json["category"], "case_study");
}

#[tokio::test]
async fn other_methods_are_rejected() {
    let app = app(state_with(None));
    for method in ["GET", "PUT", "DELETE"] {
        let req = Request::builder()
            .method(method)
            .uri("/api/summarize-bookmarks")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED, "{}", method);
    }
}

#[tokio::test]
async fn missing_peer_address_still_rate_limits() {
    // oneshot carries no connection info, so every request shares "unknown"
    let mut config = AppConfig::default();
    config.endpoint_limits.insert("check-idea".into(), 1);
    let app = app(common::state_with_config(&config, None));
    let send = |app: Router| async move {
        let req = Request::builder()
            .method("POST")
            .uri("/api/check-idea")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        app.oneshot(req).await.unwrap().status()
    };
    assert_eq!(send(app.clone()).await, StatusCode::BAD_REQUEST);
    assert_eq!(send(app).await, StatusCode::TOO_MANY_REQUESTS);
}
