//! Tuya OpenAPI wire protocol.
//! Response envelope, command payloads and endpoint path templates.

use crate::error::TuyaError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const HEADER_CLIENT_ID: &str = "client_id";
pub const HEADER_ACCESS_TOKEN: &str = "access_token";
pub const HEADER_SIGN: &str = "sign";
pub const HEADER_SIGN_METHOD: &str = "sign_method";
pub const HEADER_TIMESTAMP: &str = "t";

define_string_enum! {
    /// Media protocol requested from the stream allocation endpoint.
    pub enum StreamType {
        Rtsp = "RTSP",
        Hls = "HLS",
        Flv = "FLV",
        Rtmp = "RTMP",
    }
}

/// Field deserializer that maps `null` or an unexpected type to the default.
pub(crate) fn lenient<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(d)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Identifiers are sometimes sent as numbers; they are kept as strings.
pub(crate) fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

/// Response envelope shared by every endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub success: bool,
    #[serde(default)]
    pub result: Value,
    /// Error code; sent as a number or a numeric string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Value>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub msg: Option<String>,
    /// Server timestamp (ms)
    #[serde(default, deserialize_with = "lenient")]
    pub t: u64,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub tid: Option<String>,
}

impl ApiResponse {
    /// Numeric error code, accepting both `1010` and `"1010"`.
    pub fn error_code(&self) -> Option<u32> {
        match self.code.as_ref()? {
            Value::Number(n) => n.as_u64().and_then(|c| u32::try_from(c).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Converts a failed response into an API error.
    pub fn to_error(&self) -> TuyaError {
        TuyaError::api(self.error_code().unwrap_or_default(), self.msg.as_deref())
    }

    /// Returns `self` on success, the API error otherwise.
    pub fn into_result(self) -> Result<Self, TuyaError> {
        if self.success {
            Ok(self)
        } else {
            Err(self.to_error())
        }
    }
}

/// A single data-point write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub code: String,
    pub value: Value,
}

impl Command {
    pub fn new<C, V>(code: C, value: V) -> Self
    where
        C: Into<String>,
        V: Into<Value>,
    {
        Self {
            code: code.into(),
            value: value.into(),
        }
    }
}

/// Endpoint path templates.
pub mod paths {
    pub const TOKEN: &str = "/v1.0/token";

    pub fn refresh_token(refresh_token: &str) -> String {
        format!("/v1.0/token/{}", refresh_token)
    }

    pub fn app_users(schema: &str) -> String {
        format!("/v2.0/apps/{}/users", schema)
    }

    pub fn user_homes(uid: &str) -> String {
        format!("/v1.0/users/{}/homes", uid)
    }

    pub fn user_devices(uid: &str) -> String {
        format!("/v1.0/users/{}/devices", uid)
    }

    pub fn device(device_id: &str) -> String {
        format!("/v1.0/devices/{}", device_id)
    }

    pub fn device_status(device_id: &str) -> String {
        format!("/v1.0/devices/{}/status", device_id)
    }

    pub fn device_specifications(device_id: &str) -> String {
        format!("/v1.0/devices/{}/specifications", device_id)
    }

    pub fn device_functions(device_id: &str) -> String {
        format!("/v1.0/devices/{}/functions", device_id)
    }

    pub fn device_commands(device_id: &str) -> String {
        format!("/v1.0/devices/{}/commands", device_id)
    }

    pub fn stream_allocate(uid: &str, device_id: &str) -> String {
        format!(
            "/v1.0/users/{}/devices/{}/stream/actions/allocate",
            uid, device_id
        )
    }
}
