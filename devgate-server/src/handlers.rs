//! HTTP handlers

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::auth::{self, AuthError};
use crate::state::SharedState;

/// `{"status":"error","message":...}` with the given status
fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "status": "error", "message": message }))).into_response()
}

fn success(message: &str) -> Response {
    Json(json!({ "status": "success", "message": message })).into_response()
}

/// Health check endpoint
pub async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "devgate-server"
    }))
}

/// Login request body
#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    password: String,
}

/// `POST /api/auth/login`
pub async fn login_handler(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> Response {
    if req.password.is_empty() {
        return error(StatusCode::BAD_REQUEST, "password must not be empty");
    }

    let result = state.write().await.login(&req.password);
    match result {
        Ok(token) => {
            tracing::info!("Login succeeded");
            Json(json!({ "status": "success", "message": "logged in", "token": token }))
                .into_response()
        }
        Err(AuthError::WrongPassword) => {
            tracing::info!("Login rejected: wrong password");
            error(StatusCode::UNAUTHORIZED, "wrong password")
        }
        Err(e) => {
            tracing::error!("Login failed: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "login failed")
        }
    }
}

/// `POST /api/auth/logout`, token taken from the Authorization header
pub async fn logout_handler(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let Some(token) = auth::bearer_token(&headers) else {
        return error(StatusCode::BAD_REQUEST, "no token provided");
    };

    if state.write().await.logout(token) {
        success("logged out")
    } else {
        error(StatusCode::BAD_REQUEST, "logout failed")
    }
}

/// Password change request body
#[derive(Deserialize)]
pub struct PasswordRequest {
    #[serde(default)]
    old_password: String,
    #[serde(default)]
    new_password: String,
}

/// `POST /api/auth/password`
pub async fn password_handler(
    State(state): State<SharedState>,
    Json(req): Json<PasswordRequest>,
) -> Response {
    if req.old_password.is_empty() || req.new_password.is_empty() {
        return error(
            StatusCode::BAD_REQUEST,
            "old and new password must not be empty",
        );
    }

    let result = state
        .write()
        .await
        .change_password(&req.old_password, &req.new_password);
    match result {
        Ok(()) => success("password changed, please log in again"),
        Err(AuthError::WrongPassword) => error(StatusCode::UNAUTHORIZED, "wrong old password"),
        Err(e) => {
            tracing::error!("Password change failed: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "password change failed")
        }
    }
}

/// `GET /api/auth/status`, never rejects
pub async fn status_handler(State(state): State<SharedState>, headers: HeaderMap) -> Json<Value> {
    let logged_in = match auth::bearer_token(&headers) {
        Some(token) => state.write().await.verify(token),
        None => false,
    };

    Json(json!({ "logged_in": logged_in, "auth_required": true }))
}

/// `GET /api/info`
pub async fn info_handler(State(state): State<SharedState>) -> Json<Value> {
    let uptime = state.read().await.started_at.elapsed().as_secs();
    Json(json!({
        "hostname": "devgate-sim",
        "model": "simulated-cpe",
        "firmware": env!("CARGO_PKG_VERSION"),
        "uptime": uptime,
    }))
}

/// `GET /api/data`
pub async fn data_status_handler(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({ "active": state.read().await.data_active }))
}

#[derive(Deserialize)]
pub struct DataRequest {
    active: bool,
}

/// `POST /api/data`
pub async fn set_data_status_handler(
    State(state): State<SharedState>,
    Json(req): Json<DataRequest>,
) -> Json<Value> {
    state.write().await.data_active = req.active;
    Json(json!({ "status": "success", "active": req.active }))
}

/// `GET /api/plugins`
pub async fn plugins_handler() -> Json<Value> {
    Json(json!({ "plugins": [] }))
}

#[derive(Deserialize)]
pub struct DeviceControlRequest {
    action: String,
}

/// `POST /api/device_control`; the simulator only acknowledges
pub async fn device_control_handler(Json(req): Json<DeviceControlRequest>) -> Response {
    match req.action.as_str() {
        "reboot" | "poweroff" => {
            tracing::info!("Device control requested: {}", req.action);
            success(&format!("{} scheduled", req.action))
        }
        other => error(StatusCode::BAD_REQUEST, &format!("unknown action: {other}")),
    }
}
