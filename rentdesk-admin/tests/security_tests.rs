//! Security tests for rentdesk-admin
//!
//! Signed identity with a non-zero shared secret:
//! - a correctly signed request passes
//! - wrong signatures, stale timestamps and missing headers are rejected
//! - the signature covers method and path

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use rentdesk_admin::{build_router, AppState};
use rentdesk_common::api::auth::{calculate_signature, now_millis};
use rentdesk_common::db::{db_timestamp, init_database, new_id, Role};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt;

const SECRET: i64 = 12345;

/// Test helper: app with auth enabled and one admin row
async fn setup_app_with_auth() -> (Router, String, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("rentdesk.db")).await.unwrap();
    let admin_id = insert_admin(&pool).await;
    let app = build_router(AppState::new(pool, SECRET).with_max_skew_ms(60_000));
    (app, admin_id, dir)
}

async fn insert_admin(pool: &SqlitePool) -> String {
    let id = new_id();
    sqlx::query(
        "INSERT INTO admin_users (id, email, display_name, role, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind("ops@rentdesk.example")
    .bind("Ops")
    .bind(Role::Admin)
    .bind(db_timestamp(Utc::now()))
    .execute(pool)
    .await
    .unwrap();
    id
}

fn signed_request(method: &str, uri: &str, admin_id: &str, timestamp: i64, signature: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-admin-id", admin_id)
        .header("x-timestamp", timestamp.to_string())
        .header("x-signature", signature)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_valid_signature_accepted() {
    let (app, admin_id, _dir) = setup_app_with_auth().await;
    let ts = now_millis();
    let sig = calculate_signature(&admin_id, ts, "GET", "/api/admins", SECRET);

    let response = app
        .oneshot(signed_request("GET", "/api/admins", &admin_id, ts, &sig))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_query_string_not_part_of_signature() {
    let (app, admin_id, _dir) = setup_app_with_auth().await;
    let ts = now_millis();
    let sig = calculate_signature(&admin_id, ts, "GET", "/api/table/cars", SECRET);

    let response = app
        .oneshot(signed_request("GET", "/api/table/cars?page=2", &admin_id, ts, &sig.to_uppercase()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_wrong_secret_rejected() {
    let (app, admin_id, _dir) = setup_app_with_auth().await;
    let ts = now_millis();
    let sig = calculate_signature(&admin_id, ts, "GET", "/api/admins", SECRET + 1);

    let response = app
        .oneshot(signed_request("GET", "/api/admins", &admin_id, ts, &sig))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signature_bound_to_method_and_path() {
    let (app, admin_id, _dir) = setup_app_with_auth().await;
    let ts = now_millis();
    let get_sig = calculate_signature(&admin_id, ts, "GET", "/api/admins", SECRET);

    let response = app
        .clone()
        .oneshot(signed_request("GET", "/api/audit-logs", &admin_id, ts, &get_sig))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(signed_request("DELETE", "/api/admins", &admin_id, ts, &get_sig))
        .await
        .unwrap();
    assert_ne!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_stale_and_future_timestamps_rejected() {
    let (app, admin_id, _dir) = setup_app_with_auth().await;

    for ts in [now_millis() - 120_000, now_millis() + 120_000] {
        let sig = calculate_signature(&admin_id, ts, "GET", "/api/admins", SECRET);
        let response = app
            .clone()
            .oneshot(signed_request("GET", "/api/admins", &admin_id, ts, &sig))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_extreme_timestamps_rejected() {
    let (app, admin_id, _dir) = setup_app_with_auth().await;

    for ts in [i64::MIN, i64::MAX] {
        let sig = calculate_signature(&admin_id, ts, "GET", "/api/admins", SECRET);
        let response = app
            .clone()
            .oneshot(signed_request("GET", "/api/admins", &admin_id, ts, &sig))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_missing_signature_headers_rejected() {
    let (app, admin_id, _dir) = setup_app_with_auth().await;

    let request = Request::builder()
        .method("GET")
        .uri("/api/admins")
        .header("x-admin-id", &admin_id)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signed_unknown_admin_rejected() {
    let (app, _admin_id, _dir) = setup_app_with_auth().await;
    let ts = now_millis();
    let sig = calculate_signature("ghost", ts, "GET", "/api/admins", SECRET);

    let response = app
        .oneshot(signed_request("GET", "/api/admins", "ghost", ts, &sig))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_public_routes_skip_signature() {
    let (app, _admin_id, _dir) = setup_app_with_auth().await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let event = Request::builder()
        .method("POST")
        .uri("/api/events")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"event_type":"page_view","path":"/"}"#))
        .unwrap();
    let response = app.oneshot(event).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}
