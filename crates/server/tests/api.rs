//! HTTP API integration tests.
//!
//! Exercises the router against the in-memory store, which carries the same
//! contract as the PostgreSQL backend: duplicate rejection, cascade on
//! segment deletion, and all-or-nothing membership batches.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header::CONTENT_TYPE, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use segmentd_server::api::{self, AppState};
use segmentd_server::sweeper::TtlSweeper;
use segmentd_storage::MemoryStore;

const BODY_LIMIT: usize = 1024 * 1024;

fn test_app() -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState {
        registry: store.clone(),
        engine: store.clone(),
        request_timeout: Duration::from_secs(4),
    };
    (api::router(state), store)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, body)
}

fn post_json(target: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(target)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(target: &str) -> Request<Body> {
    Request::builder().method("GET").uri(target).body(Body::empty()).unwrap()
}

fn delete(target: &str) -> Request<Body> {
    Request::builder().method("DELETE").uri(target).body(Body::empty()).unwrap()
}

async fn add_segment(app: &Router, slug: &str) {
    let (status, body) = send(app, post_json("/segments", &format!(r#"{{"slug":"{slug}"}}"#))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
}

#[tokio::test]
async fn health_returns_ok_envelope() {
    let (app, _) = test_app();
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
}

#[tokio::test]
async fn add_segment_returns_the_assigned_id() {
    let (app, _) = test_app();
    let (status, body) = send(&app, post_json("/segments", r#"{"slug":"beta"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
    assert!(body["id"].is_i64());
}

#[tokio::test]
async fn duplicate_segment_add_returns_error_envelope() {
    let (app, _) = test_app();
    add_segment(&app, "beta").await;

    let (status, body) = send(&app, post_json("/segments", r#"{"slug":"beta"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Error");
    assert_eq!(body["error"], "segment exists: beta");
}

#[tokio::test]
async fn empty_slug_is_rejected_as_invalid() {
    let (app, _) = test_app();
    let (status, body) = send(&app, post_json("/segments", r#"{"slug":""}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "Error");
}

#[tokio::test]
async fn overlong_slug_is_rejected_as_invalid() {
    let (app, _) = test_app();
    let slug = "a".repeat(65);
    let (status, _) = send(&app, post_json("/segments", &format!(r#"{{"slug":"{slug}"}}"#))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_json_is_rejected_as_invalid() {
    let (app, _) = test_app();
    let (status, body) = send(&app, post_json("/segments", "{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "Error");
}

#[tokio::test]
async fn removing_an_unknown_segment_returns_error_envelope() {
    let (app, _) = test_app();
    let (status, body) = send(&app, delete("/segments/ghost")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Error");
    assert_eq!(body["error"], "segment does not exist: ghost");
}

#[tokio::test]
async fn change_without_either_list_is_invalid() {
    let (app, _) = test_app();
    let (status, body) = send(&app, post_json("/user", r#"{"user_id":42}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "Error");
}

#[tokio::test]
async fn change_with_empty_lists_is_a_noop_success() {
    let (app, _) = test_app();
    let (status, body) = send(
        &app,
        post_json("/user", r#"{"user_id":42,"segments_to_add":[],"segments_to_delete":[]}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
}

#[tokio::test]
async fn duplicate_membership_returns_error_and_keeps_first() {
    let (app, _) = test_app();
    add_segment(&app, "beta").await;

    let join = r#"{"user_id":42,"segments_to_add":[{"slug":"beta"}]}"#;
    let (status, body) = send(&app, post_json("/user", join)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");

    let (status, body) = send(&app, post_json("/user", join)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Error");
    assert_eq!(body["error"], "user:42 is already in segment beta");

    let (_, body) = send(&app, get("/user/42")).await;
    assert_eq!(body["slugs"], serde_json::json!(["beta"]));
}

#[tokio::test]
async fn adding_to_an_unknown_segment_returns_error_envelope() {
    let (app, _) = test_app();
    let (status, body) = send(
        &app,
        post_json("/user", r#"{"user_id":42,"segments_to_add":[{"slug":"ghost"}]}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Error");
    assert_eq!(body["error"], "segment does not exist: ghost");
}

#[tokio::test]
async fn failing_delete_aborts_the_whole_batch() {
    let (app, _) = test_app();
    add_segment(&app, "valid").await;

    let (status, body) = send(
        &app,
        post_json(
            "/user",
            r#"{"user_id":7,"segments_to_add":[{"slug":"valid"}],"segments_to_delete":["ghost"]}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Error");

    // The add in the failed batch must not have landed.
    let (_, body) = send(&app, get("/user/7")).await;
    assert_eq!(body["slugs"], serde_json::json!([]));
}

#[tokio::test]
async fn unknown_user_reads_as_empty_list_not_error() {
    let (app, _) = test_app();
    let (status, body) = send(&app, get("/user/404")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
    assert_eq!(body["slugs"], serde_json::json!([]));
}

#[tokio::test]
async fn non_numeric_user_id_is_invalid() {
    let (app, _) = test_app();
    let (status, body) = send(&app, get("/user/abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "Error");
}

#[tokio::test]
async fn expired_membership_is_visible_until_swept() {
    let (app, store) = test_app();
    add_segment(&app, "flash-sale").await;

    let (status, body) = send(
        &app,
        post_json(
            "/user",
            r#"{"user_id":42,"segments_to_add":[{"slug":"flash-sale","expiration_date":"2020-01-01T00:00:00Z"}]}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");

    // Reads do not filter by expiration; the row is stale until the sweeper runs.
    let (_, body) = send(&app, get("/user/42")).await;
    assert_eq!(body["slugs"], serde_json::json!(["flash-sale"]));

    let sweeper = TtlSweeper::new(store, Duration::from_secs(60));
    sweeper.run_cycle().await;

    let (_, body) = send(&app, get("/user/42")).await;
    assert_eq!(body["slugs"], serde_json::json!([]));
}

#[tokio::test]
async fn segment_lifecycle_scenario() {
    // add "beta" -> join user 42 -> read -> delete "beta" -> read empty
    let (app, _) = test_app();
    add_segment(&app, "beta").await;

    let (status, _) =
        send(&app, post_json("/user", r#"{"user_id":42,"segments_to_add":[{"slug":"beta"}]}"#))
            .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, get("/user/42")).await;
    assert_eq!(body["slugs"], serde_json::json!(["beta"]));

    let (status, body) = send(&app, delete("/segments/beta")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");

    let (_, body) = send(&app, get("/user/42")).await;
    assert_eq!(body["slugs"], serde_json::json!([]));
}

#[tokio::test]
async fn batch_delete_then_add_in_one_request_succeeds() {
    let (app, _) = test_app();
    add_segment(&app, "beta").await;

    let join = r#"{"user_id":5,"segments_to_add":[{"slug":"beta"}]}"#;
    let (_, body) = send(&app, post_json("/user", join)).await;
    assert_eq!(body["status"], "OK");

    // Deletes run before adds inside one batch, so a rejoin works.
    let rejoin =
        r#"{"user_id":5,"segments_to_add":[{"slug":"beta"}],"segments_to_delete":["beta"]}"#;
    let (_, body) = send(&app, post_json("/user", rejoin)).await;
    assert_eq!(body["status"], "OK");

    let (_, body) = send(&app, get("/user/5")).await;
    assert_eq!(body["slugs"], serde_json::json!(["beta"]));
}
