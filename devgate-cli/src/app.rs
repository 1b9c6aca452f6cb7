//! Command execution

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use serde_json::Value;

use devgate_core::{
    ApiRequest, Config, DeviceApi, FileStore, Gateway, Method, TokenStore, config::DeviceConfig,
};

use crate::cli::{Cli, Command};

/// Whether the command did what was asked
#[derive(Debug, PartialEq, Eq)]
pub enum AppResult {
    Success,
    Failure,
}

/// Main application struct
pub struct App {
    /// Configuration
    config: Config,

    /// Where `config` came from, for `add-device`
    config_path: Option<PathBuf>,

    /// Device API over the session-aware gateway
    api: DeviceApi,
}

impl App {
    pub fn new(config: Config, cli: &Cli) -> anyhow::Result<Self> {
        let base_url = match &cli.url {
            Some(url) => url.clone(),
            None => config.resolve_base_url(cli.device.as_deref())?,
        };

        let session_path = config.session_path()?;
        tracing::debug!("Session file: {}", session_path.display());
        let tokens = TokenStore::new(Arc::new(FileStore::open(session_path)));

        Ok(Self::with_gateway(
            config,
            cli.config.clone(),
            Gateway::connect(&base_url, tokens),
        ))
    }

    pub fn with_gateway(config: Config, config_path: Option<PathBuf>, gateway: Gateway) -> Self {
        gateway.events().subscribe(|| {
            eprintln!("Session rejected by the device. Run `devgate login <password>`.");
        });

        Self {
            config,
            config_path,
            api: DeviceApi::new(gateway),
        }
    }

    pub fn gateway(&self) -> &Gateway {
        self.api.gateway()
    }

    pub async fn run(&mut self, command: Command) -> anyhow::Result<AppResult> {
        let gateway = self.api.gateway().clone();

        match command {
            Command::Login { password } => {
                let outcome = gateway.login(&password).await?;
                print_json(&outcome.body);
                if outcome.succeeded {
                    Ok(AppResult::Success)
                } else {
                    Ok(AppResult::Failure)
                }
            }
            Command::Logout => {
                gateway.logout().await?;
                println!("Logged out");
                Ok(AppResult::Success)
            }
            Command::Status => {
                print_json(&gateway.status().await?);
                Ok(AppResult::Success)
            }
            Command::Passwd { old, new } => {
                print_json(&gateway.change_password(&old, &new).await?);
                Ok(AppResult::Success)
            }
            Command::Get { path } => {
                print_json(&self.api.get(&path).await?);
                Ok(AppResult::Success)
            }
            Command::Post { path, json } => {
                let body = parse_body(json.as_deref())?;
                print_json(&self.api.post(&path, &body).await?);
                Ok(AppResult::Success)
            }
            Command::Raw { path, method, data } => {
                let method = method
                    .to_uppercase()
                    .parse::<Method>()
                    .with_context(|| format!("Invalid HTTP method: {method}"))?;
                let mut req = ApiRequest::new(path).method(method);
                if let Some(data) = data {
                    req = req.body(data);
                }

                let resp = gateway.raw_fetch(req).await?;
                println!("HTTP {}", resp.status);
                println!("{}", resp.text());
                if resp.is_success() {
                    Ok(AppResult::Success)
                } else {
                    Ok(AppResult::Failure)
                }
            }
            Command::Info => {
                print_json(&self.api.system_info().await?);
                Ok(AppResult::Success)
            }
            Command::AddDevice { name, url } => {
                self.config.upsert_device(DeviceConfig { name: name.clone(), url });
                match &self.config_path {
                    Some(path) => self.config.save_to(path)?,
                    None => self.config.save()?,
                }
                println!("Saved device {name}");
                Ok(AppResult::Success)
            }
        }
    }
}

fn parse_body(json: Option<&str>) -> anyhow::Result<Value> {
    match json {
        Some(raw) => serde_json::from_str(raw).context("Request body is not valid JSON"),
        None => Ok(Value::Object(Default::default())),
    }
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(pretty) => println!("{pretty}"),
        Err(_) => println!("{value}"),
    }
}
