//! Session-aware request gateway
//!
//! Every call to the device management API goes through [`Gateway`]:
//! - Injects `Content-Type: application/json` and, when a session token is
//!   stored, `Authorization: Bearer <token>` (applied last, after caller
//!   overrides)
//! - Treats HTTP 401 as session invalidation: clears the token and fires the
//!   [`UnauthorizedChannel`] before returning to the caller
//!
//! Two call styles are exposed on purpose. [`Gateway::request`] fails on any
//! non-2xx status and returns parsed JSON. [`Gateway::raw_fetch`] performs the
//! same 401 side effect but hands back the raw response untouched.

use std::sync::Arc;

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayError;
use crate::events::UnauthorizedChannel;
use crate::store::TokenStore;
use crate::transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};

const LOGIN_PATH: &str = "/api/auth/login";
const LOGOUT_PATH: &str = "/api/auth/logout";
const PASSWORD_PATH: &str = "/api/auth/password";
const STATUS_PATH: &str = "/api/auth/status";

/// Outbound request descriptor, consumed once by the gateway
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub path: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<String>,
}

impl ApiRequest {
    /// GET request for `path`
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(path).method(Method::POST)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(path).method(Method::PUT)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(path).method(Method::DELETE)
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Override a header. Overrides win over the default content type but
    /// never over the authorization header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn json(self, body: &Value) -> Self {
        self.body(body.to_string())
    }
}

impl From<&str> for ApiRequest {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for ApiRequest {
    fn from(path: String) -> Self {
        Self::new(path)
    }
}

/// Result of a login attempt. HTTP-level failures land here, not in `Err`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginOutcome {
    pub succeeded: bool,
    pub body: Value,
}

struct Inner {
    base_url: String,
    transport: Arc<dyn Transport>,
    tokens: TokenStore,
    events: Arc<UnauthorizedChannel>,
}

/// Cheap-to-clone handle; clones share the token slot and channel
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<Inner>,
}

impl Gateway {
    pub fn new(
        base_url: &str,
        transport: Arc<dyn Transport>,
        tokens: TokenStore,
        events: Arc<UnauthorizedChannel>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                base_url: base_url.trim_end_matches('/').to_string(),
                transport,
                tokens,
                events,
            }),
        }
    }

    /// Gateway over reqwest with a fresh notification channel
    pub fn connect(base_url: &str, tokens: TokenStore) -> Self {
        Self::new(
            base_url,
            Arc::new(ReqwestTransport::new()),
            tokens,
            Arc::new(UnauthorizedChannel::new()),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.inner.tokens
    }

    /// Channel fired whenever the device rejects the session
    pub fn events(&self) -> &Arc<UnauthorizedChannel> {
        &self.inner.events
    }

    pub fn token(&self) -> Option<String> {
        self.inner.tokens.get()
    }

    pub fn set_token(&self, token: &str) {
        self.inner.tokens.set(token);
    }

    pub fn clear_token(&self) {
        self.inner.tokens.clear();
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.tokens.is_authenticated()
    }

    /// Authenticated call returning the parsed JSON body.
    ///
    /// Fails with [`GatewayError::Unauthorized`] on 401 (after clearing the
    /// token and notifying), [`GatewayError::Http`] on any other non-2xx.
    pub async fn request(&self, req: impl Into<ApiRequest>) -> Result<Value, GatewayError> {
        let req = req.into();
        let (method, path) = (req.method.clone(), req.path.clone());
        let resp = self.raw_fetch(req).await?;

        if resp.status == StatusCode::UNAUTHORIZED {
            return Err(GatewayError::Unauthorized);
        }
        if !resp.is_success() {
            tracing::debug!("{} {} failed with HTTP {}", method, path, resp.status.as_u16());
            return Err(GatewayError::Http {
                status: resp.status.as_u16(),
            });
        }

        Ok(resp.json()?)
    }

    /// Like [`Gateway::request`], deserializing the payload into `T`
    pub async fn request_as<T: DeserializeOwned>(
        &self,
        req: impl Into<ApiRequest>,
    ) -> Result<T, GatewayError> {
        let value = self.request(req).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Authenticated call returning the raw response.
    ///
    /// A 401 still clears the token and notifies, but is returned to the
    /// caller as-is. Only transport failures produce an error.
    pub async fn raw_fetch(
        &self,
        req: impl Into<ApiRequest>,
    ) -> Result<HttpResponse, GatewayError> {
        let req = req.into();
        let token = self.inner.tokens.get();
        let headers = self.build_headers(req.headers, token.as_deref());

        tracing::debug!(
            authenticated = token.is_some(),
            "{} {}",
            req.method,
            req.path
        );

        let resp = self
            .inner
            .transport
            .send(HttpRequest {
                method: req.method,
                url: self.url(&req.path),
                headers,
                body: req.body,
            })
            .await?;

        if resp.status == StatusCode::UNAUTHORIZED {
            tracing::warn!("Device rejected session on {}, clearing token", req.path);
            self.inner.tokens.clear();
            self.inner.events.notify();
        }

        Ok(resp)
    }

    /// Log in with the device password.
    ///
    /// Sent without any Authorization header. A token is stored only when the
    /// status is 2xx and the body carries a non-empty `token` string.
    pub async fn login(&self, password: &str) -> Result<LoginOutcome, GatewayError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, json_content_type());

        let resp = self
            .inner
            .transport
            .send(HttpRequest {
                method: Method::POST,
                url: self.url(LOGIN_PATH),
                headers,
                body: Some(serde_json::json!({ "password": password }).to_string()),
            })
            .await?;

        let succeeded = resp.is_success();
        let body: Value = resp.json()?;

        if succeeded {
            match body.get("token").and_then(Value::as_str) {
                Some(token) if !token.is_empty() => {
                    self.inner.tokens.set(token);
                    tracing::info!("Logged in to {}", self.inner.base_url);
                }
                _ => tracing::warn!("Login succeeded without a token in the response"),
            }
        } else {
            tracing::info!("Login rejected with HTTP {}", resp.status.as_u16());
        }

        Ok(LoginOutcome { succeeded, body })
    }

    /// Log out on the device. The local token is cleared on every exit path,
    /// including failures and cancellation of the returned future.
    pub async fn logout(&self) -> Result<(), GatewayError> {
        let _guard = ClearOnDrop(&self.inner.tokens);
        let result = self.request(ApiRequest::post(LOGOUT_PATH)).await;
        tracing::info!("Logged out from {}", self.inner.base_url);
        result.map(|_| ())
    }

    pub async fn change_password(
        &self,
        old_password: &str,
        new_password: &str,
    ) -> Result<Value, GatewayError> {
        self.request(ApiRequest::post(PASSWORD_PATH).json(&serde_json::json!({
            "old_password": old_password,
            "new_password": new_password,
        })))
        .await
    }

    /// Session status as reported by the device.
    ///
    /// Carries the token when present but skips 401 interception, so polling
    /// never triggers the unauthorized notification. The body is returned
    /// whatever the status.
    pub async fn status(&self) -> Result<Value, GatewayError> {
        let mut headers = HeaderMap::new();
        if let Some(value) = self.inner.tokens.get().as_deref().and_then(bearer) {
            headers.insert(header::AUTHORIZATION, value);
        }

        let resp = self
            .inner
            .transport
            .send(HttpRequest {
                method: Method::GET,
                url: self.url(STATUS_PATH),
                headers,
                body: None,
            })
            .await?;

        Ok(resp.json()?)
    }

    // Private helpers

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.inner.base_url, path)
    }

    fn build_headers(&self, overrides: HeaderMap, token: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, json_content_type());
        headers.extend(overrides);

        // Authorization only ever comes from the token slot
        headers.remove(header::AUTHORIZATION);
        if let Some(value) = token.and_then(bearer) {
            headers.insert(header::AUTHORIZATION, value);
        }

        headers
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("base_url", &self.inner.base_url)
            .field("tokens", &self.inner.tokens)
            .finish()
    }
}

struct ClearOnDrop<'a>(&'a TokenStore);

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        self.0.clear();
    }
}

fn json_content_type() -> HeaderValue {
    HeaderValue::from_static("application/json")
}

fn bearer(token: &str) -> Option<HeaderValue> {
    match HeaderValue::from_str(&format!("Bearer {token}")) {
        Ok(mut value) => {
            value.set_sensitive(true);
            Some(value)
        }
        Err(_) => {
            tracing::warn!("Stored token is not a valid header value, sending unauthenticated");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::transport::TransportError;

    /// Replays canned responses and records every request it sees
    #[derive(Default)]
    struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        fn reply(&self, status: u16, body: &str) -> &Self {
            self.replies.lock().unwrap().push_back(Ok(HttpResponse {
                status: StatusCode::from_u16(status).unwrap(),
                headers: HeaderMap::new(),
                body: body.as_bytes().to_vec(),
            }));
            self
        }

        fn fail(&self) -> &Self {
            self.replies
                .lock()
                .unwrap()
                .push_back(Err(TransportError::Connection("network unreachable".into())));
            self
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.seen.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Connection("no scripted reply".into())))
        }
    }

    fn gateway() -> (Gateway, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::default());
        let gw = Gateway::new(
            "http://device.local/",
            transport.clone(),
            TokenStore::in_memory(),
            Arc::new(UnauthorizedChannel::new()),
        );
        (gw, transport)
    }

    fn count_notifications(gw: &Gateway) -> Arc<AtomicUsize> {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        gw.events().subscribe(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        hits
    }

    fn auth_header(req: &HttpRequest) -> Option<&str> {
        req.headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
    }

    #[tokio::test]
    async fn test_success_returns_parsed_body() {
        let (gw, transport) = gateway();
        transport.reply(200, r#"{"value":42}"#);

        let value = gw.request("/api/info").await.unwrap();
        assert_eq!(value, serde_json::json!({ "value": 42 }));

        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, Method::GET);
        assert_eq!(sent[0].url, "http://device.local/api/info");
    }

    #[tokio::test]
    async fn test_headers_with_and_without_token() {
        let (gw, transport) = gateway();
        transport.reply(200, "{}").reply(200, "{}");

        gw.request("/api/info").await.unwrap();
        gw.set_token("abc");
        gw.request("/api/info").await.unwrap();

        let sent = transport.requests();
        assert_eq!(auth_header(&sent[0]), None);
        assert_eq!(auth_header(&sent[1]), Some("Bearer abc"));
        for req in &sent {
            assert_eq!(req.headers[header::CONTENT_TYPE], "application/json");
        }
    }

    #[tokio::test]
    async fn test_overrides_cannot_clobber_authorization() {
        let (gw, transport) = gateway();
        transport.reply(200, "{}");
        gw.set_token("real");

        let req = ApiRequest::put("/api/scripts/x")
            .header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))
            .header(header::AUTHORIZATION, HeaderValue::from_static("Bearer forged"))
            .body("echo hi");
        gw.request(req).await.unwrap();

        let sent = &transport.requests()[0];
        assert_eq!(sent.method, Method::PUT);
        assert_eq!(sent.headers[header::CONTENT_TYPE], "text/plain");
        assert_eq!(auth_header(sent), Some("Bearer real"));
        assert_eq!(sent.headers.get_all(header::AUTHORIZATION).iter().count(), 1);
        assert_eq!(sent.body.as_deref(), Some("echo hi"));
    }

    #[tokio::test]
    async fn test_override_authorization_dropped_without_token() {
        let (gw, transport) = gateway();
        transport.reply(200, "{}").reply(200, "{}");

        let forged = || {
            ApiRequest::get("/api/info")
                .header(header::AUTHORIZATION, HeaderValue::from_static("Bearer forged"))
        };
        gw.request(forged()).await.unwrap();

        // Stored token that cannot become a header value
        gw.set_token("bad\ntoken");
        gw.raw_fetch(forged()).await.unwrap();

        for sent in transport.requests() {
            assert!(sent.headers.get(header::AUTHORIZATION).is_none());
        }
    }

    #[tokio::test]
    async fn test_unauthorized_clears_token_and_notifies_once() {
        let (gw, transport) = gateway();
        transport.reply(401, r#"{"status":"error"}"#);
        gw.set_token("stale");
        let first = count_notifications(&gw);
        let second = count_notifications(&gw);

        let err = gw.request("/api/info").await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(!gw.is_authenticated());
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_error_leaves_token() {
        let (gw, transport) = gateway();
        transport.reply(500, "oops");
        gw.set_token("keep");
        let hits = count_notifications(&gw);

        let err = gw.request("/api/info").await.unwrap_err();
        assert!(matches!(err, GatewayError::Http { status: 500 }));
        assert_eq!(gw.token(), Some("keep".to_string()));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_json_is_malformed() {
        let (gw, transport) = gateway();
        transport.reply(200, "<html>");

        let err = gw.request("/api/info").await.unwrap_err();
        assert!(matches!(err, GatewayError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_network_failure_is_not_retried() {
        let (gw, transport) = gateway();
        transport.fail().reply(200, "{}");

        let err = gw.request("/api/info").await.unwrap_err();
        assert!(matches!(err, GatewayError::Network(_)));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_request_as_typed() {
        #[derive(Deserialize)]
        struct Serial {
            serial: String,
        }

        let (gw, transport) = gateway();
        transport.reply(200, r#"{"serial":"SN123"}"#);

        let serial: Serial = gw.request_as("/api/serial").await.unwrap();
        assert_eq!(serial.serial, "SN123");
    }

    #[tokio::test]
    async fn test_raw_fetch_returns_401_response() {
        let (gw, transport) = gateway();
        transport.reply(401, "denied");
        gw.set_token("stale");
        let hits = count_notifications(&gw);

        let resp = gw.raw_fetch("/api/plugins").await.unwrap();
        assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
        assert_eq!(resp.text(), "denied");
        assert!(!gw.is_authenticated());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(auth_header(&transport.requests()[0]), Some("Bearer stale"));
    }

    #[tokio::test]
    async fn test_raw_fetch_passes_errors_through() {
        let (gw, transport) = gateway();
        transport.reply(404, "not json at all");
        gw.set_token("keep");

        let resp = gw.raw_fetch("/api/missing").await.unwrap();
        assert_eq!(resp.status, StatusCode::NOT_FOUND);
        assert!(gw.is_authenticated());
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let (gw, transport) = gateway();
        transport.reply(401, r#"{"status":"error","message":"wrong password"}"#);
        let hits = count_notifications(&gw);

        let outcome = gw.login("wrong").await.unwrap();
        assert!(!outcome.succeeded);
        assert_eq!(outcome.body["message"], "wrong password");
        assert!(!gw.is_authenticated());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_login_wrong_password_keeps_existing_token() {
        let (gw, transport) = gateway();
        transport.reply(401, r#"{"status":"error"}"#);
        gw.set_token("previous");

        let outcome = gw.login("wrong").await.unwrap();
        assert!(!outcome.succeeded);
        assert_eq!(gw.token(), Some("previous".to_string()));
    }

    #[tokio::test]
    async fn test_login_stores_token() {
        let (gw, transport) = gateway();
        transport.reply(200, r#"{"token":"abc"}"#);

        let outcome = gw.login("right").await.unwrap();
        assert!(outcome.succeeded);
        assert_eq!(gw.token(), Some("abc".to_string()));

        let sent = &transport.requests()[0];
        assert_eq!(sent.url, "http://device.local/api/auth/login");
        assert_eq!(auth_header(sent), None);
        let body: Value = serde_json::from_str(sent.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["password"], "right");
    }

    #[tokio::test]
    async fn test_login_success_without_token_stores_nothing() {
        let (gw, transport) = gateway();
        transport.reply(200, r#"{"token":""}"#);

        let outcome = gw.login("right").await.unwrap();
        assert!(outcome.succeeded);
        assert!(!gw.is_authenticated());
    }

    #[tokio::test]
    async fn test_logout_clears_on_network_failure() {
        let (gw, transport) = gateway();
        transport.fail();
        gw.set_token("abc");

        let err = gw.logout().await.unwrap_err();
        assert!(matches!(err, GatewayError::Network(_)));
        assert!(!gw.is_authenticated());
    }

    #[tokio::test]
    async fn test_logout_clears_on_success() {
        let (gw, transport) = gateway();
        transport.reply(200, r#"{"status":"success"}"#);
        gw.set_token("abc");

        gw.logout().await.unwrap();
        assert!(!gw.is_authenticated());
        assert_eq!(auth_header(&transport.requests()[0]), Some("Bearer abc"));
    }

    #[tokio::test]
    async fn test_logout_clears_when_cancelled() {
        struct Stalled;

        #[async_trait]
        impl Transport for Stalled {
            async fn send(&self, _: HttpRequest) -> Result<HttpResponse, TransportError> {
                std::future::pending().await
            }
        }

        let gw = Gateway::new(
            "http://device.local",
            Arc::new(Stalled),
            TokenStore::in_memory(),
            Arc::new(UnauthorizedChannel::new()),
        );
        gw.set_token("abc");

        let timed_out = tokio::time::timeout(Duration::from_millis(20), gw.logout()).await;
        assert!(timed_out.is_err());
        assert!(!gw.is_authenticated());
    }

    #[tokio::test]
    async fn test_change_password_body() {
        let (gw, transport) = gateway();
        transport.reply(200, r#"{"status":"success"}"#);
        gw.set_token("abc");

        gw.change_password("old", "new").await.unwrap();

        let sent = &transport.requests()[0];
        assert_eq!(sent.method, Method::POST);
        let body: Value = serde_json::from_str(sent.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["old_password"], "old");
        assert_eq!(body["new_password"], "new");
    }

    #[tokio::test]
    async fn test_status_skips_interception() {
        let (gw, transport) = gateway();
        transport.reply(401, r#"{"logged_in":false,"auth_required":true}"#);
        gw.set_token("abc");
        let hits = count_notifications(&gw);

        let body = gw.status().await.unwrap();
        assert_eq!(body["logged_in"], false);
        assert_eq!(gw.token(), Some("abc".to_string()));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        let sent = &transport.requests()[0];
        assert_eq!(auth_header(sent), Some("Bearer abc"));
        assert!(sent.headers.get(header::CONTENT_TYPE).is_none());
    }

    #[tokio::test]
    async fn test_concurrent_unauthorized_each_notify() {
        let (gw, transport) = gateway();
        transport.reply(401, "{}").reply(401, "{}");
        gw.set_token("abc");
        let hits = count_notifications(&gw);

        let (a, b) = tokio::join!(gw.request("/api/a"), gw.request("/api/b"));
        assert!(a.unwrap_err().is_unauthorized());
        assert!(b.unwrap_err().is_unauthorized());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_authorization_after_clear() {
        let (gw, transport) = gateway();
        transport.reply(200, "{}");
        gw.set_token("abc");
        gw.clear_token();

        gw.request("/api/info").await.unwrap();
        assert_eq!(auth_header(&transport.requests()[0]), None);
    }
}
