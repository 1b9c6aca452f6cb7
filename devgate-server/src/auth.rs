//! Password hashing, session tokens and the bearer middleware
//!
//! Everything under `/api/` except the `/api/auth/*` routes requires an
//! `Authorization: Bearer <token>` header matching the active session.
//! Anything else is answered with `401` and a JSON error body.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::state::SharedState;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Wrong password")]
    WrongPassword,

    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

/// Hash a password into an argon2 PHC string
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    use rand::Rng;
    let salt_bytes: [u8; 16] = rand::thread_rng().r#gen();
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AuthError::Hashing(e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// 32 random bytes, hex encoded (64 chars)
pub fn generate_token() -> String {
    use rand::Rng;
    let bytes: [u8; 32] = rand::thread_rng().r#gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

/// Constant-time byte comparison
pub fn constant_time_eq(expected: &[u8], provided: &[u8]) -> bool {
    let mut diff = u8::from(expected.len() != provided.len());
    for (i, e) in expected.iter().enumerate() {
        diff |= e ^ provided.get(i).copied().unwrap_or(0xff);
    }
    diff == 0
}

/// Axum middleware rejecting requests without a valid session token
pub async fn require_session(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let token = bearer_token(request.headers()).map(str::to_owned);
    let authorized = match token {
        Some(token) => state.write().await.verify(&token),
        None => false,
    };

    if !authorized {
        tracing::debug!("Rejecting unauthenticated {} {}", request.method(), request.uri());
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "status": "error", "message": "unauthorized" })),
        )
            .into_response();
    }

    next.run(request).await
}
