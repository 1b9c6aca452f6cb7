//! devgate-server: Device management API simulator
//!
//! Reproduces the authentication contract of the device firmware so clients
//! can be exercised without hardware:
//! - Single password (argon2 hashed), single active session token
//! - Bearer-protected `/api/*` routes answering 401 on a bad session
//! - Login, logout, password change and status under `/api/auth/`

mod auth;
mod handlers;
mod state;

#[cfg(test)]
mod e2e;

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use devgate_core::Config;

use crate::state::{AppState, SharedState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "devgate_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}, using defaults", e);
        Config::default()
    });

    let state = AppState::new(
        &config.server.initial_password,
        Duration::from_secs(config.server.token_ttl),
    )?
    .into_shared();
    tracing::info!("Session lifetime: {}s", config.server.token_ttl);

    let app = router(state);

    let addr = SocketAddr::from((
        config.server.listen_addr.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));
    tracing::info!("devgate-server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the full router: open auth routes plus the bearer-protected API
pub fn router(state: SharedState) -> Router {
    let protected = Router::new()
        .route("/api/info", get(handlers::info_handler))
        .route(
            "/api/data",
            get(handlers::data_status_handler).post(handlers::set_data_status_handler),
        )
        .route("/api/plugins", get(handlers::plugins_handler))
        .route("/api/device_control", post(handlers::device_control_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/api/auth/login", post(handlers::login_handler))
        .route("/api/auth/logout", post(handlers::logout_handler))
        .route("/api/auth/password", post(handlers::password_handler))
        .route("/api/auth/status", get(handlers::status_handler))
        .merge(protected)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
