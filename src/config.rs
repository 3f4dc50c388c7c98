//! Client configuration.
//! Loadable from serde sources or the environment; validated before use.

use crate::error::{Result, TuyaError};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://openapi-cube.tdgiotengine.com";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub const ENV_API_URL: &str = "TUYA_API_URL";
pub const ENV_CLIENT_ID: &str = "TUYA_CLIENT_ID";
pub const ENV_SECRET: &str = "TUYA_SECRET";
pub const ENV_SCHEMA: &str = "TUYA_SCHEMA";

/// Credentials and transport settings for [`ApiClient`](crate::ApiClient).
#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    pub client_id: String,
    pub secret: String,
    /// App schema used by the user lookup endpoint
    #[serde(default)]
    pub schema: String,
    #[serde(default = "default_request_timeout", with = "duration_secs")]
    pub request_timeout: Duration,
    #[serde(default = "default_connect_timeout", with = "duration_secs")]
    pub connect_timeout: Duration,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_url", &self.api_url)
            .field("client_id", &self.client_id)
            .field("secret", &"<redacted>")
            .field("schema", &self.schema)
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl ClientConfig {
    pub fn new<I, S>(client_id: I, secret: S) -> Self
    where
        I: Into<String>,
        S: Into<String>,
    {
        Self {
            api_url: default_api_url(),
            client_id: client_id.into(),
            secret: secret.into(),
            schema: String::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Reads `TUYA_API_URL`, `TUYA_CLIENT_ID`, `TUYA_SECRET` and `TUYA_SCHEMA`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| TuyaError::InvalidConfig(format!("{} is not set", key)))
        };

        let mut config = Self::new(required(ENV_CLIENT_ID)?, required(ENV_SECRET)?);
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.is_empty()) {
            config.api_url = url;
        }
        config.schema = lookup(ENV_SCHEMA).unwrap_or_default();
        config.validate()
    }

    /// Checks credentials and URL, normalizing a trailing slash away.
    pub fn validate(mut self) -> Result<Self> {
        if self.client_id.is_empty() {
            return Err(TuyaError::InvalidConfig("client_id cannot be empty".into()));
        }
        if self.secret.is_empty() {
            return Err(TuyaError::InvalidConfig("secret cannot be empty".into()));
        }
        let url = self.api_url.trim_end_matches('/').to_string();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(TuyaError::InvalidConfig(
                "api_url must start with http:// or https://".into(),
            ));
        }
        self.api_url = url;
        Ok(self)
    }
}
