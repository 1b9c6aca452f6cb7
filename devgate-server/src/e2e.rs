//! End-to-end tests: the core gateway against the simulator over real HTTP

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use tower::ServiceExt;

use devgate_core::{DeviceApi, Gateway, GatewayError, TokenStore};

use crate::router;
use crate::state::{AppState, SharedState};

fn shared_state(ttl: Duration) -> SharedState {
    AppState::new("admin", ttl).unwrap().into_shared()
}

/// Serve the simulator on an ephemeral port and return its base URL
async fn spawn_device(ttl: Duration) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(shared_state(ttl));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn count_notifications(gw: &Gateway) -> Arc<AtomicUsize> {
    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    gw.events().subscribe(move || {
        h.fetch_add(1, Ordering::SeqCst);
    });
    hits
}

#[tokio::test]
async fn test_protected_route_rejects_without_token() {
    let app = router(shared_state(Duration::from_secs(60)));

    let resp = app
        .oneshot(Request::get("/api/info").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_status_route_is_open() {
    let app = router(shared_state(Duration::from_secs(60)));

    let resp = app
        .oneshot(Request::get("/api/auth/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_request_logout_cycle() {
    let base = spawn_device(Duration::from_secs(60)).await;
    let gw = Gateway::connect(&base, TokenStore::in_memory());

    let outcome = gw.login("admin").await.unwrap();
    assert!(outcome.succeeded);
    assert_eq!(outcome.body["status"], "success");
    assert!(gw.is_authenticated());

    let info = gw.request("/api/info").await.unwrap();
    assert_eq!(info["hostname"], "devgate-sim");

    let status = gw.status().await.unwrap();
    assert_eq!(status["logged_in"], true);

    gw.logout().await.unwrap();
    assert!(!gw.is_authenticated());

    let status = gw.status().await.unwrap();
    assert_eq!(status["logged_in"], false);
}

#[tokio::test]
async fn test_wrong_password_is_an_outcome() {
    let base = spawn_device(Duration::from_secs(60)).await;
    let gw = Gateway::connect(&base, TokenStore::in_memory());
    let hits = count_notifications(&gw);

    let outcome = gw.login("wrong").await.unwrap();
    assert!(!outcome.succeeded);
    assert_eq!(outcome.body["status"], "error");
    assert!(!gw.is_authenticated());
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stale_token_triggers_notification() {
    let base = spawn_device(Duration::from_secs(60)).await;
    let gw = Gateway::connect(&base, TokenStore::in_memory());
    let hits = count_notifications(&gw);
    gw.set_token("not-a-session");

    // Status polling leaves the stale token alone
    let status = gw.status().await.unwrap();
    assert_eq!(status["logged_in"], false);
    assert!(gw.is_authenticated());
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let err = gw.request("/api/info").await.unwrap_err();
    assert!(err.is_unauthorized());
    assert!(!gw.is_authenticated());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_expired_session_is_rejected() {
    let base = spawn_device(Duration::from_millis(50)).await;
    let gw = Gateway::connect(&base, TokenStore::in_memory());
    let hits = count_notifications(&gw);

    assert!(gw.login("admin").await.unwrap().succeeded);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let resp = gw.raw_fetch("/api/plugins").await.unwrap();
    assert_eq!(resp.status.as_u16(), 401);
    assert!(!gw.is_authenticated());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_password_change_forces_relogin() {
    let base = spawn_device(Duration::from_secs(60)).await;
    let gw = Gateway::connect(&base, TokenStore::in_memory());
    assert!(gw.login("admin").await.unwrap().succeeded);

    gw.change_password("admin", "hunter2").await.unwrap();

    // Token is still stored locally but no longer valid on the device
    let err = gw.request("/api/info").await.unwrap_err();
    assert!(err.is_unauthorized());

    assert!(!gw.login("admin").await.unwrap().succeeded);
    assert!(gw.login("hunter2").await.unwrap().succeeded);
}

#[tokio::test]
async fn test_device_api_roundtrip() {
    let base = spawn_device(Duration::from_secs(60)).await;
    let api = DeviceApi::new(Gateway::connect(&base, TokenStore::in_memory()));
    assert!(api.gateway().login("admin").await.unwrap().succeeded);

    api.set_data_status(false).await.unwrap();
    let data = api.data_status().await.unwrap();
    assert_eq!(data["active"], false);

    let err = api.device_control("explode").await.unwrap_err();
    assert!(matches!(err, GatewayError::Http { status: 400 }));
    assert!(api.gateway().is_authenticated());

    let plugins = api.plugins().await.unwrap();
    assert!(plugins["plugins"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_logout_without_session_still_clears_locally() {
    let base = spawn_device(Duration::from_secs(60)).await;
    let gw = Gateway::connect(&base, TokenStore::in_memory());
    gw.set_token("never-issued");

    assert!(gw.logout().await.is_err());
    assert!(!gw.is_authenticated());
}
