//! devgate-core: Session-aware request gateway for device management APIs
//!
//! This crate provides:
//! - Token storage over pluggable key-value persistence
//! - Unauthorized notification channel (publish/subscribe)
//! - HTTP transport abstraction with a reqwest implementation
//! - The request gateway (bearer injection, 401 interception, login/logout)
//! - Thin device API wrappers on top of the gateway

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod store;
pub mod transport;

pub use api::DeviceApi;
pub use config::Config;
pub use error::GatewayError;
pub use events::{SubscriptionId, Unauthorized, UnauthorizedChannel};
pub use gateway::{ApiRequest, Gateway, LoginOutcome};
pub use store::{FileStore, KeyValueStore, MemoryStore, TokenStore};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};

pub use reqwest::{Method, StatusCode, header};

/// Default HTTP port of the device management API (and of devgate-server)
pub const DEFAULT_PORT: u16 = 9280;

/// Storage key holding the session token
pub const TOKEN_KEY: &str = "auth_token";
