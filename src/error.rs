//! Error types and result definitions for the rustuya-cloud crate.
//! Includes Tuya OpenAPI error codes and conversion from HTTP/JSON errors.

use thiserror::Error;

/// Represents all possible errors that can occur when talking to the Tuya cloud.
#[derive(Error, Debug, Clone)]
pub enum TuyaError {
    /// No usable access token could be obtained or refreshed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The server reported a failure for a business call
    #[error("API error: {message} (code: {code})")]
    Api { code: u32, message: String },

    /// Network or HTTP-layer failure (connect, timeout, non-2xx status)
    #[error("Transport error: {0}")]
    Transport(String),

    /// JSON serialization or deserialization error
    #[error("JSON error: {0}")]
    Json(String),

    /// The response was valid JSON but not shaped as expected
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The client has been closed and refuses further requests
    #[error("Client closed")]
    Closed,

    /// Configuration was rejected during validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Device ID not found in the manager
    #[error("Device ID '{0}' not found")]
    DeviceNotFound(String),
}

/// A specialized Result type for Tuya cloud operations.
pub type Result<T> = std::result::Result<T, TuyaError>;

impl From<reqwest::Error> for TuyaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            TuyaError::Json(err.to_string())
        } else {
            TuyaError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for TuyaError {
    fn from(err: serde_json::Error) -> Self {
        TuyaError::Json(err.to_string())
    }
}

impl TuyaError {
    /// Builds an API error from a server code, filling in the known message
    /// when the server did not send one.
    pub fn api(code: u32, message: Option<&str>) -> Self {
        let message = match message {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => get_error_message(code).to_string(),
        };
        TuyaError::Api { code, message }
    }

    /// Server-side error code, if this error carries one.
    pub fn code(&self) -> Option<u32> {
        match self {
            TuyaError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// True when the server rejected the access token.
    pub fn is_token_invalid(&self) -> bool {
        self.code() == Some(ERR_TOKEN_INVALID)
    }

    /// Errors that affect the whole session rather than a single call.
    pub fn is_session_error(&self) -> bool {
        matches!(self, TuyaError::Auth(_) | TuyaError::Closed)
    }
}

// Tuya OpenAPI Error Response Codes
define_error_codes! {
    ERR_SECRET_INVALID = 1001 => "Secret invalid",
    ERR_TOKEN_NULL = 1002 => "Access token is null",
    ERR_GRANT_TYPE = 1003 => "Grant type invalid",
    ERR_SIGN_INVALID = 1004 => "Sign invalid",
    ERR_CLIENT_ID = 1005 => "Client ID invalid",
    ERR_TOKEN_INVALID = 1010 => "Token invalid",
    ERR_TOKEN_STATUS = 1011 => "Token status invalid",
    ERR_REQUEST_TIME = 1013 => "Request time invalid",
    ERR_PARAM_EMPTY = 1100 => "Param is empty",
    ERR_PARAM_ILLEGAL = 1101 => "Param is illegal",
    ERR_PERMISSION = 1106 => "Permission deny",
    ERR_DEVICE_OFFLINE = 2001 => "Device is offline",
}
