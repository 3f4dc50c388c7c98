//! Home (site) records returned by the user-homes endpoint.

use crate::error::{Result, TuyaError};
use crate::protocol::{ApiResponse, lenient, string_or_number};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Home {
    /// Sent as a number by the server, kept as a string
    #[serde(default, deserialize_with = "string_or_number")]
    pub home_id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient")]
    pub geo_name: String,
    #[serde(default, deserialize_with = "lenient")]
    pub lat: f64,
    #[serde(default, deserialize_with = "lenient")]
    pub lon: f64,
    #[serde(default, deserialize_with = "lenient")]
    pub role: String,
}

impl Home {
    pub fn from_api_response(data: &Value) -> Result<Self> {
        Self::deserialize(data).map_err(|e| TuyaError::InvalidPayload(e.to_string()))
    }

    /// Parses every home in a user-homes response.
    pub fn list_from_response(response: &ApiResponse) -> Result<Vec<Self>> {
        response
            .result
            .as_array()
            .ok_or_else(|| TuyaError::InvalidPayload("homes result is not a list".into()))?
            .iter()
            .map(Self::from_api_response)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_home_id_is_stringified() {
        let home = Home::from_api_response(&json!({
            "home_id": 12345,
            "name": "Flat",
            "geo_name": "Bangkok",
            "lat": 13.75,
            "lon": 100.5,
            "role": "OWNER"
        }))
        .unwrap();
        assert_eq!(home.home_id, "12345");
        assert_eq!(home.role, "OWNER");
        assert_eq!(home.lat, 13.75);
    }

    #[test]
    fn list_requires_array() {
        let ok = ApiResponse {
            success: true,
            result: json!([{"home_id": "1"}, {"home_id": 2, "name": "B"}]),
            ..Default::default()
        };
        let homes = Home::list_from_response(&ok).unwrap();
        assert_eq!(homes.len(), 2);
        assert_eq!(homes[1].home_id, "2");

        let bad = ApiResponse {
            success: true,
            result: json!({"home_id": "1"}),
            ..Default::default()
        };
        assert!(Home::list_from_response(&bad).is_err());
    }
}
