// tests/api_http.rs
//
// HTTP-level tests for the public Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /ping
// - POST /api/videos/evaluate (accepted, enqueued, rejected)
// - GET /metrics when enabled

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::json;
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use caption_evaluator::api::{self, AppState};
use caption_evaluator::metrics::Metrics;
use caption_evaluator::AppConfig;

const BODY_LIMIT: usize = 1024 * 1024;

/// Router + state with no workers attached, so submitted tasks stay in the queue.
fn test_app() -> (Router, AppState) {
    let state = AppState::new(AppConfig::default());
    (api::router(state.clone()), state)
}

async fn body_json(resp: axum::response::Response) -> Json {
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse json")
}

fn post_submit(payload: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/videos/evaluate")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("build POST /api/videos/evaluate")
}

#[tokio::test]
async fn ping_returns_pong() {
    let (app, _) = test_app();
    let req = Request::builder()
        .uri("/ping")
        .body(Body::empty())
        .expect("build GET /ping");

    let resp = app.oneshot(req).await.expect("oneshot /ping");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({ "message": "pong" }));
}

#[tokio::test]
async fn submit_acknowledges_immediately_and_enqueues() {
    let (app, state) = test_app();

    let payload = json!({ "videoId": "abc123", "categories": ["hatred", "clarity"] });
    let resp = app
        .oneshot(post_submit(&payload.to_string()))
        .await
        .expect("oneshot submit");

    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert_eq!(
        body_json(resp).await,
        json!({ "status": "submitted", "detail": "Video abc123 successfully enqueued." })
    );

    assert_eq!(state.queue.len(), 1);
    let task = state.queue.dequeue().await;
    assert_eq!(task.video_id, "abc123");
    assert_eq!(task.categories, vec!["hatred", "clarity"]);
    assert_eq!(task.custom_prompts, None);
}

#[tokio::test]
async fn submit_passes_custom_prompts_through_untouched() {
    let (app, state) = test_app();

    let payload = json!({
        "videoId": "v1",
        "categories": ["fraud"],
        "customPrompts": [{ "focus": "crypto" }, "be strict"]
    });
    let resp = app
        .oneshot(post_submit(&payload.to_string()))
        .await
        .expect("oneshot submit");
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let task = state.queue.dequeue().await;
    assert_eq!(
        task.custom_prompts,
        Some(json!([{ "focus": "crypto" }, "be strict"]))
    );
}

#[tokio::test]
async fn malformed_body_is_rejected_before_enqueue() {
    let (app, state) = test_app();

    // categories must be a list of strings
    let resp = app
        .clone()
        .oneshot(post_submit(r#"{"videoId":"abc","categories":"hatred"}"#))
        .await
        .expect("oneshot submit");
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let v = body_json(resp).await;
    assert_eq!(v["status"], "rejected");
    assert!(v["detail"].as_str().is_some_and(|d| !d.is_empty()));

    // not JSON at all
    let resp = app
        .oneshot(post_submit("videoId=abc"))
        .await
        .expect("oneshot submit");
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    assert_eq!(state.queue.len(), 0);
    assert_eq!(state.queue.unfinished(), 0);
}

#[tokio::test]
async fn blank_video_id_is_rejected() {
    let (app, state) = test_app();

    let resp = app
        .oneshot(post_submit(r#"{"videoId":"   ","categories":["clarity"]}"#))
        .await
        .expect("oneshot submit");
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body_json(resp).await,
        json!({ "status": "rejected", "detail": "videoId must not be empty" })
    );
    assert!(state.queue.is_empty());
}

#[tokio::test]
async fn metrics_route_only_exists_when_enabled() {
    let (app, _) = test_app();
    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let mut state = AppState::new(AppConfig::default());
    state.metrics = Some(Metrics::install().expect("install recorder"));
    let app = api::router(state);

    // generate at least one series
    let resp = app
        .clone()
        .oneshot(post_submit(r#"{"videoId":"m1","categories":[]}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(
        text.contains("tasks_enqueued_total"),
        "metrics exposition missing tasks_enqueued_total\n{text}"
    );
}
