//! Health endpoint integration tests

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use banter::api::{ApiServer, ApiState};
use tower::ServiceExt;

mod common;
use common::{FakeBackend, GUILD_ID, Harness, VOICE_CHANNEL_ID};

fn build_test_router(harness: &Harness, voice_enabled: bool) -> axum::Router {
    let state = ApiState {
        orchestrator: std::sync::Arc::clone(&harness.orchestrator),
        voice_enabled,
    };
    ApiServer::new(state, 0).router()
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_health_endpoint() {
    let harness = Harness::new(FakeBackend::new());
    let app = build_test_router(&harness, true);

    let (status, body) = get(app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
}

#[tokio::test]
async fn test_ready_before_platform_ready() {
    let harness = Harness::new(FakeBackend::new());
    let app = build_test_router(&harness, true);

    let (status, body) = get(app, "/ready").await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["status"], "starting");
    assert_eq!(json["checks"]["platform"]["status"], "fail");
}

#[tokio::test]
async fn test_ready_endpoint() {
    let harness = Harness::new(FakeBackend::new());
    harness.ready().await;
    harness
        .orchestrator
        .join_voice(GUILD_ID, VOICE_CHANNEL_ID)
        .await
        .unwrap();
    let app = build_test_router(&harness, true);

    let (status, body) = get(app, "/ready").await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["checks"]["platform"]["status"], "ok");
    assert_eq!(json["checks"]["voice"]["status"], "ok");
    assert_eq!(json["voice_sessions"], 1);

    harness.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_ready_with_voice_disabled() {
    let harness = Harness::text_only(FakeBackend::new());
    harness.ready().await;
    let app = build_test_router(&harness, false);

    let (status, body) = get(app, "/ready").await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["checks"]["voice"]["status"], "unavailable");
    assert_eq!(json["voice_sessions"], 0);
}

#[tokio::test]
async fn test_unknown_route() {
    let harness = Harness::new(FakeBackend::new());
    let app = build_test_router(&harness, true);

    let (status, _) = get(app, "/api/admin/sessions").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
