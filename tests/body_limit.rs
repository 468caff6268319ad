#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use axum::Router;
use common::RecordingCluster;
use tower::ServiceExt; // for oneshot

use hookd::{app, AppConfig, AppState};

fn limited_app(limit: usize) -> Router {
    let config = AppConfig {
        max_request_bytes: Some(limit),
        ..AppConfig::default()
    };
    let state = AppState::new(config, Arc::new(RecordingCluster::default()));
    app(state)
}

fn webhook_request(body: Vec<u8>) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .header("x-github-event", "issue_comment")
        .header("content-length", body.len().to_string())
        .body(axum::body::Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn oversized_payload_is_rejected() {
    let app = limited_app(64);
    let payload = serde_json::json!({
        "action": "created",
        "comment": {"id": 1, "body": "X".repeat(256)},
        "issue": {"number": 1}
    });
    let resp = app
        .oneshot(webhook_request(serde_json::to_vec(&payload).unwrap()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn payload_within_limit_reaches_the_handler() {
    let app = limited_app(4096);
    // No trigger phrase, so a well-formed delivery is a no-op, not an error.
    let payload = serde_json::json!({
        "action": "created",
        "comment": {"id": 1, "body": "just a comment"},
        "issue": {"number": 1}
    });
    let resp = app
        .oneshot(webhook_request(serde_json::to_vec(&payload).unwrap()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
