//! Shared simulator state

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::auth::{self, AuthError};

pub type SharedState = Arc<RwLock<AppState>>;

/// The single active session. A new login replaces it.
#[derive(Debug)]
struct Session {
    token: String,
    expires_at: Instant,
}

/// Shared application state
pub struct AppState {
    /// Argon2 PHC string of the device password
    password_hash: String,

    /// Currently valid session, if any
    session: Option<Session>,

    /// Session lifetime
    token_ttl: Duration,

    /// Mobile data toggle behind `/api/data`
    pub data_active: bool,

    /// Process start, reported as uptime by `/api/info`
    pub started_at: Instant,
}

impl AppState {
    pub fn new(initial_password: &str, token_ttl: Duration) -> Result<Self, AuthError> {
        Ok(Self {
            password_hash: auth::hash_password(initial_password)?,
            session: None,
            token_ttl,
            data_active: true,
            started_at: Instant::now(),
        })
    }

    pub fn into_shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }

    /// Check the password and start a new session
    pub fn login(&mut self, password: &str) -> Result<String, AuthError> {
        if !auth::verify_password(password, &self.password_hash) {
            return Err(AuthError::WrongPassword);
        }

        let token = auth::generate_token();
        self.session = Some(Session {
            token: token.clone(),
            expires_at: Instant::now() + self.token_ttl,
        });
        Ok(token)
    }

    /// True if `token` is the active, unexpired session. Expired sessions
    /// are dropped on the way.
    pub fn verify(&mut self, token: &str) -> bool {
        self.purge_expired();
        match &self.session {
            Some(session) => auth::constant_time_eq(session.token.as_bytes(), token.as_bytes()),
            None => false,
        }
    }

    /// End the session identified by `token`
    pub fn logout(&mut self, token: &str) -> bool {
        if self.verify(token) {
            self.session = None;
            true
        } else {
            false
        }
    }

    /// Replace the password and force a new login
    pub fn change_password(&mut self, old: &str, new: &str) -> Result<(), AuthError> {
        if !auth::verify_password(old, &self.password_hash) {
            return Err(AuthError::WrongPassword);
        }

        self.password_hash = auth::hash_password(new)?;
        self.session = None;
        Ok(())
    }

    pub fn has_session(&mut self) -> bool {
        self.purge_expired();
        self.session.is_some()
    }

    fn purge_expired(&mut self) {
        if self
            .session
            .as_ref()
            .is_some_and(|s| Instant::now() >= s.expires_at)
        {
            tracing::info!("Session expired, clearing token");
            self.session = None;
        }
    }
}
