//! Authenticated Tuya OpenAPI client.
//! Signs every request, keeps the access token usable and recovers once from
//! an invalid-token response. The only component that performs network I/O.

use crate::config::ClientConfig;
use crate::crypto::{self, QueryParams, SIGN_METHOD};
use crate::error::{Result, TuyaError};
use crate::protocol::{
    ApiResponse, Command, HEADER_ACCESS_TOKEN, HEADER_CLIENT_ID, HEADER_SIGN, HEADER_SIGN_METHOD,
    HEADER_TIMESTAMP, StreamType, paths,
};
use crate::token::{self, TokenInfo, TokenListener, TokenStore};
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const CONTENT_TYPE_JSON: &str = "application/json";
const GRANT_TYPE_SIMPLE: &str = "1";

/// Builder for [`ApiClient`].
///
/// ```rust,no_run
/// use rustuya_cloud::ApiClientBuilder;
///
/// let client = ApiClientBuilder::new("CLIENT_ID", "SECRET")
///     .schema("myapp")
///     .build()
///     .unwrap();
/// ```
pub struct ApiClientBuilder {
    config: ClientConfig,
    token: Option<TokenInfo>,
    token_listener: Option<Arc<dyn TokenListener>>,
}

impl ApiClientBuilder {
    pub fn new<I, S>(client_id: I, secret: S) -> Self
    where
        I: Into<String>,
        S: Into<String>,
    {
        Self::from_config(ClientConfig::new(client_id, secret))
    }

    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            token: None,
            token_listener: None,
        }
    }

    pub fn api_url<U: Into<String>>(mut self, api_url: U) -> Self {
        self.config.api_url = api_url.into();
        self
    }

    pub fn schema<S: Into<String>>(mut self, schema: S) -> Self {
        self.config.schema = schema.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Resume a session from a previously persisted token snapshot.
    pub fn token(mut self, token: TokenInfo) -> Self {
        self.token = Some(token);
        self
    }

    pub fn token_listener<L: TokenListener + 'static>(mut self, listener: L) -> Self {
        self.token_listener = Some(Arc::new(listener));
        self
    }

    pub fn build(self) -> Result<ApiClient> {
        let config = self.config.validate()?;
        Ok(ApiClient {
            inner: Arc::new(ClientInner {
                config,
                token: TokenStore::with_token(self.token.unwrap_or_default()),
                token_listener: RwLock::new(self.token_listener),
                http: Mutex::new(None),
                maintenance: tokio::sync::Mutex::new(()),
                epoch: AtomicU64::new(0),
                cancel_token: CancellationToken::new(),
            }),
        })
    }
}

/// Signed, token-managing client for the Tuya OpenAPI.
///
/// Cheap to clone; all clones share the token and the HTTP session.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    token: TokenStore,
    token_listener: RwLock<Option<Arc<dyn TokenListener>>>,
    // Created on first use, dropped on close.
    http: Mutex<Option<Client>>,
    // Serializes acquire/refresh so concurrent callers share one round trip.
    maintenance: tokio::sync::Mutex<()>,
    // Bumped after every maintenance round.
    epoch: AtomicU64,
    cancel_token: CancellationToken,
}

impl ApiClient {
    // -------------------------------------------------------------------------
    // Construction & State
    // -------------------------------------------------------------------------

    pub fn new(config: ClientConfig) -> Result<Self> {
        ApiClientBuilder::from_config(config).build()
    }

    pub fn builder<I, S>(client_id: I, secret: S) -> ApiClientBuilder
    where
        I: Into<String>,
        S: Into<String>,
    {
        ApiClientBuilder::new(client_id, secret)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Serializable snapshot of the current token.
    pub fn token_info(&self) -> TokenInfo {
        self.inner.token.snapshot()
    }

    /// Injects a previously saved token snapshot.
    pub fn restore_token(&self, token: TokenInfo) {
        self.inner.token.restore(token);
    }

    /// User id bound to the current token.
    pub fn uid(&self) -> String {
        self.inner.token.uid()
    }

    pub fn set_token_listener<L: TokenListener + 'static>(&self, listener: L) {
        *self.inner.token_listener.write() = Some(Arc::new(listener));
    }

    pub fn is_closed(&self) -> bool {
        self.inner.cancel_token.is_cancelled()
    }

    /// Closes the HTTP session. Every later call fails with [`TuyaError::Closed`]
    /// and requests still in flight are abandoned.
    pub fn close(&self) {
        if self.is_closed() {
            return;
        }
        info!("Closing API client for {}", self.inner.config.api_url);
        self.inner.cancel_token.cancel();
        self.inner.http.lock().take();
    }

    fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    fn bump_epoch(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
    }

    fn http(&self) -> Result<Client> {
        let mut guard = self.inner.http.lock();
        if self.is_closed() {
            return Err(TuyaError::Closed);
        }
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .timeout(self.inner.config.request_timeout)
            .connect_timeout(self.inner.config.connect_timeout)
            .user_agent(format!("rustuya-cloud/{}", crate::VERSION))
            .build()?;
        debug!("HTTP session created");
        *guard = Some(client.clone());
        Ok(client)
    }
}

// -------------------------------------------------------------------------
// Token Management
// -------------------------------------------------------------------------
impl ApiClient {
    /// Requests a fresh token (`grant_type=1`), signed in token mode.
    pub async fn acquire_token(&self) -> Result<TokenInfo> {
        let _guard = self.inner.maintenance.lock().await;
        let result = self.acquire_locked().await;
        self.bump_epoch();
        result
    }

    /// Refreshes the token with the held refresh token, falling back to a
    /// fresh acquisition when there is none or the refresh fails.
    pub async fn refresh_token(&self) -> Result<TokenInfo> {
        let _guard = self.inner.maintenance.lock().await;
        let result = self.refresh_locked().await;
        self.bump_epoch();
        result
    }

    async fn acquire_locked(&self) -> Result<TokenInfo> {
        let mut query = QueryParams::new();
        query.insert("grant_type".into(), GRANT_TYPE_SIMPLE.into());

        info!("Requesting access token");
        let response = self
            .send(Method::GET, paths::TOKEN, Some(&query), "", None)
            .await?;

        if !response.success {
            let err = response.to_error();
            error!("Failed to get access token: {}", err);
            return Err(TuyaError::Auth(err.to_string()));
        }
        self.install_token(&response)
    }

    async fn refresh_locked(&self) -> Result<TokenInfo> {
        let refresh_token = self.inner.token.refresh_token();
        if refresh_token.is_empty() {
            return self.acquire_locked().await;
        }

        let path = paths::refresh_token(&refresh_token);
        match self.send(Method::GET, &path, None, "", None).await {
            Ok(response) if response.success => match self.install_token(&response) {
                Ok(info) => {
                    info!("Access token refreshed");
                    Ok(info)
                }
                Err(e) => {
                    warn!("Token refresh returned no token ({}), requesting a new one", e);
                    self.acquire_locked().await
                }
            },
            Ok(response) => {
                warn!(
                    "Token refresh failed ({}), requesting a new token",
                    response.to_error()
                );
                self.acquire_locked().await
            }
            Err(TuyaError::Closed) => Err(TuyaError::Closed),
            Err(e) => {
                warn!("Error refreshing token ({}), requesting a new token", e);
                self.acquire_locked().await
            }
        }
    }

    /// Swaps in the token carried by a successful token response and
    /// notifies the listener.
    fn install_token(&self, response: &ApiResponse) -> Result<TokenInfo> {
        let acquired_at = if response.t > 0 {
            response.t
        } else {
            token::now_ms()
        };
        let info = TokenInfo::from_result(&response.result, acquired_at);
        if info.access_token.is_empty() {
            return Err(TuyaError::Auth("token response carried no access token".into()));
        }

        self.inner.token.restore(info.clone());
        debug!("Token installed for uid {}, expires at {}", info.uid, info.expires_at);

        let listener = self.inner.token_listener.read().clone();
        if let Some(listener) = listener {
            listener.update_token(&info);
        }
        Ok(info)
    }

    /// Makes sure a usable token is held before a business call.
    async fn ensure_token(&self) -> Result<()> {
        if !self.inner.token.is_expired() {
            return Ok(());
        }

        let seen = self.epoch();
        let _guard = self.inner.maintenance.lock().await;
        if self.epoch() != seen {
            // Someone else finished a round while we waited; share its outcome.
            return self.check_shared_outcome();
        }
        if !self.inner.token.is_expired() {
            return Ok(());
        }

        let result = self.refresh_locked().await;
        self.bump_epoch();
        result.map(drop)
    }

    /// Forces re-authentication after the server rejected the token, unless
    /// another caller already did so since `seen`.
    async fn reauthenticate(&self, seen: u64) -> Result<()> {
        let _guard = self.inner.maintenance.lock().await;
        if self.epoch() != seen {
            return self.check_shared_outcome();
        }

        let result = self.acquire_locked().await;
        self.bump_epoch();
        result.map(drop)
    }

    fn check_shared_outcome(&self) -> Result<()> {
        if self.inner.token.is_expired() {
            Err(TuyaError::Auth(
                "concurrent token maintenance did not yield a usable token".into(),
            ))
        } else {
            Ok(())
        }
    }
}

// -------------------------------------------------------------------------
// Requests
// -------------------------------------------------------------------------
impl ApiClient {
    /// Issues one signed HTTP call and decodes the response envelope.
    ///
    /// `access_token` selects business-mode signing and adds the
    /// `access_token` header.
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: Option<&QueryParams>,
        body: &str,
        access_token: Option<&str>,
    ) -> Result<ApiResponse> {
        let http = self.http()?;
        let config = &self.inner.config;

        let timestamp = token::now_ms().to_string();
        let canonical = crypto::canonical_request_string(method.as_str(), path, query, body);
        let sign = crypto::sign(
            &config.client_id,
            &config.secret,
            &timestamp,
            "",
            &canonical,
            access_token,
        );

        let mut request = http
            .request(method.clone(), format!("{}{}", config.api_url, path))
            .header(HEADER_CLIENT_ID, config.client_id.as_str())
            .header(HEADER_SIGN, sign)
            .header(HEADER_TIMESTAMP, timestamp.as_str())
            .header(HEADER_SIGN_METHOD, SIGN_METHOD)
            .header(CONTENT_TYPE, CONTENT_TYPE_JSON);
        if let Some(token) = access_token.filter(|t| !t.is_empty()) {
            request = request.header(HEADER_ACCESS_TOKEN, token);
        }
        if let Some(q) = query.filter(|q| !q.is_empty()) {
            request = request.query(q);
        }
        if !body.is_empty() {
            request = request.body(body.to_string());
        }

        debug!("API {} {}", method, crypto::canonical_url(path, query));

        let response = tokio::select! {
            _ = self.inner.cancel_token.cancelled() => return Err(TuyaError::Closed),
            r = request.send() => r?,
        };
        let status = response.status();
        let text = tokio::select! {
            _ = self.inner.cancel_token.cancelled() => return Err(TuyaError::Closed),
            r = response.text() => r?,
        };

        if !status.is_success() {
            error!("HTTP error on {} {}: {}", method, path, status);
            return Err(TuyaError::Transport(format!("HTTP {}: {}", status, text)));
        }

        let decoded: ApiResponse = serde_json::from_str(&text)?;
        debug!(
            "API {} {} -> success={} code={:?}",
            method,
            path,
            decoded.success,
            decoded.error_code()
        );
        Ok(decoded)
    }

    /// Makes an authenticated business request.
    ///
    /// On the invalid-token code the client re-authenticates and retries
    /// exactly once; any other failure is returned immediately.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: Option<&QueryParams>,
        body: Option<&Value>,
    ) -> Result<ApiResponse> {
        if self.is_closed() {
            return Err(TuyaError::Closed);
        }
        self.ensure_token().await?;
        let seen = self.epoch();
        let body_text = encode_body(body)?;

        let access_token = self.inner.token.access_token();
        let response = self
            .send(method.clone(), path, query, &body_text, Some(&access_token))
            .await?;
        if response.success {
            return Ok(response);
        }

        let err = response.to_error();
        if !err.is_token_invalid() {
            warn!("API error on {} {}: {}", method, path, err);
            return Err(err);
        }

        debug!("Token rejected on {} {}, re-authenticating", method, path);
        self.reauthenticate(seen).await?;

        let access_token = self.inner.token.access_token();
        let retry = self
            .send(method.clone(), path, query, &body_text, Some(&access_token))
            .await?;
        if retry.success {
            return Ok(retry);
        }
        let err = retry.to_error();
        error!("API error on {} {} after retry: {}", method, path, err);
        Err(err)
    }

    pub async fn get(&self, path: &str, query: Option<&QueryParams>) -> Result<ApiResponse> {
        self.request(Method::GET, path, query, None).await
    }

    pub async fn post(
        &self,
        path: &str,
        query: Option<&QueryParams>,
        body: Option<&Value>,
    ) -> Result<ApiResponse> {
        self.request(Method::POST, path, query, body).await
    }

    pub async fn put(&self, path: &str, body: Option<&Value>) -> Result<ApiResponse> {
        self.request(Method::PUT, path, None, body).await
    }

    pub async fn delete(&self, path: &str, query: Option<&QueryParams>) -> Result<ApiResponse> {
        self.request(Method::DELETE, path, query, None).await
    }
}

/// An absent, null or empty-object body is sent (and signed) as "".
fn encode_body(body: Option<&Value>) -> Result<String> {
    match body {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::Object(map)) if map.is_empty() => Ok(String::new()),
        Some(value) => Ok(serde_json::to_string(value)?),
    }
}

// -------------------------------------------------------------------------
// Endpoints
// -------------------------------------------------------------------------
impl ApiClient {
    /// Looks up a user of the configured app schema by username.
    pub async fn get_user_by_username(&self, username: &str) -> Result<ApiResponse> {
        let schema = &self.inner.config.schema;
        if schema.is_empty() {
            return Err(TuyaError::InvalidConfig(
                "schema is required for user lookup".into(),
            ));
        }
        let mut query = QueryParams::new();
        query.insert("username".into(), username.into());
        self.get(&paths::app_users(schema), Some(&query)).await
    }

    pub async fn get_user_homes(&self, uid: &str) -> Result<ApiResponse> {
        self.get(&paths::user_homes(uid), None).await
    }

    pub async fn get_user_devices(&self, uid: &str) -> Result<ApiResponse> {
        self.get(&paths::user_devices(uid), None).await
    }

    pub async fn get_device_info(&self, device_id: &str) -> Result<ApiResponse> {
        self.get(&paths::device(device_id), None).await
    }

    pub async fn get_device_status(&self, device_id: &str) -> Result<ApiResponse> {
        self.get(&paths::device_status(device_id), None).await
    }

    pub async fn get_device_specifications(&self, device_id: &str) -> Result<ApiResponse> {
        self.get(&paths::device_specifications(device_id), None)
            .await
    }

    pub async fn get_device_functions(&self, device_id: &str) -> Result<ApiResponse> {
        self.get(&paths::device_functions(device_id), None).await
    }

    /// `POST /v1.0/devices/{id}/commands` with `{"commands": [...]}`.
    pub async fn send_device_commands(
        &self,
        device_id: &str,
        commands: &[Command],
    ) -> Result<ApiResponse> {
        let body = json!({ "commands": commands });
        self.post(&paths::device_commands(device_id), None, Some(&body))
            .await
    }

    /// Allocates a time-limited live stream URL.
    pub async fn allocate_stream(
        &self,
        uid: &str,
        device_id: &str,
        stream_type: StreamType,
    ) -> Result<ApiResponse> {
        let body = json!({ "type": stream_type });
        self.post(&paths::stream_allocate(uid, device_id), None, Some(&body))
            .await
    }
}
