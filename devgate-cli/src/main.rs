//! devgate: Command-line client for device management APIs
//!
//! - Password login with the session token persisted between runs
//! - Authenticated GET/POST/raw calls against any `/api/*` path
//! - Session status polling that never forces a logout

mod app;
mod cli;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::{App, AppResult};
use crate::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize tracing to file (stdout carries command output)
    let log_dir = dirs::cache_dir()
        .map(|d| d.join("devgate"))
        .unwrap_or_else(|| std::env::temp_dir().join("devgate"));
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(&log_dir, "devgate.log");

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "devgate=debug,devgate_core=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false),
        )
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => devgate_core::Config::load_from(path)?,
        None => devgate_core::Config::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load config: {}, using defaults", e);
            devgate_core::Config::default()
        }),
    };

    let mut app = App::new(config, &cli)?;
    let result = app.run(cli.command).await;
    tracing::debug!(
        authenticated = app.gateway().is_authenticated(),
        "Command finished"
    );

    match result? {
        AppResult::Success => Ok(ExitCode::SUCCESS),
        AppResult::Failure => Ok(ExitCode::FAILURE),
    }
}
