//! Cloud device records and their capability schemas.
//! Status values are loosely typed on the wire and are kept as [`StatusValue`].

use crate::error::{Result, TuyaError};
use crate::protocol::{lenient, string_or_number};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A data-point value as reported by the cloud.
///
/// The wire may carry a bool, a number, a plain string or a JSON-encoded
/// structure depending on the data point.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Json(Value),
}

impl StatusValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StatusValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StatusValue::Integer(i) => Some(*i),
            StatusValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StatusValue::Integer(i) => Some(*i as f64),
            StatusValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StatusValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Structured form of the value. JSON-encoded strings are decoded;
    /// plain strings that are not JSON yield `None`.
    pub fn decoded(&self) -> Option<Value> {
        match self {
            StatusValue::Json(v) => Some(v.clone()),
            StatusValue::Text(s) => serde_json::from_str::<Value>(s)
                .ok()
                .filter(|v| v.is_object() || v.is_array()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, StatusValue::Null)
    }

    /// Back to the wire representation.
    pub fn to_json(&self) -> Value {
        match self {
            StatusValue::Null => Value::Null,
            StatusValue::Bool(b) => Value::Bool(*b),
            StatusValue::Integer(i) => Value::from(*i),
            StatusValue::Float(f) => Value::from(*f),
            StatusValue::Text(s) => Value::String(s.clone()),
            StatusValue::Json(v) => v.clone(),
        }
    }
}

impl From<Value> for StatusValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => StatusValue::Null,
            Value::Bool(b) => StatusValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    StatusValue::Integer(i)
                } else if n.is_u64() {
                    // Beyond i64; an f64 would lose precision.
                    StatusValue::Json(Value::Number(n))
                } else {
                    StatusValue::Float(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => StatusValue::Text(s),
            other => StatusValue::Json(other),
        }
    }
}

impl Serialize for StatusValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StatusValue {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(d).map(StatusValue::from)
    }
}

/// Numeric constraints of an `Integer` data point.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IntegerRange {
    pub min: i64,
    pub max: i64,
    #[serde(default = "default_step")]
    pub step: i64,
    #[serde(default)]
    pub scale: u32,
    #[serde(default)]
    pub unit: String,
}

fn default_step() -> i64 {
    1
}

/// Server-declared schema of one data point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceCapabilitySpec {
    /// Schema kind, e.g. `Boolean`, `Integer`, `Enum`, `Json`
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Decoded constraints object
    #[serde(default)]
    pub values: Value,
}

impl DeviceCapabilitySpec {
    /// Builds a spec from a raw `values` field, which the wire encodes as a
    /// JSON string. Undecodable strings yield an empty constraints object.
    pub fn from_wire(kind: &str, values: Option<&Value>) -> Self {
        let values = match values {
            None => Value::Object(Map::new()),
            Some(Value::String(raw)) => {
                serde_json::from_str(raw).unwrap_or_else(|_| Value::Object(Map::new()))
            }
            Some(other) => other.clone(),
        };
        Self {
            kind: kind.to_string(),
            values,
        }
    }

    /// Numeric range view, if the constraints describe one.
    pub fn integer_range(&self) -> Option<IntegerRange> {
        serde_json::from_value(self.values.clone()).ok()
    }

    /// Enumerated values view, if the constraints describe one.
    pub fn enum_range(&self) -> Option<Vec<String>> {
        let range = self.values.get("range")?.as_array()?;
        Some(
            range
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        )
    }
}

/// `{code, value}` pair as found in status lists.
#[derive(Debug, Clone, Deserialize)]
struct StatusItem {
    #[serde(default)]
    code: String,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct SpecEntry {
    #[serde(default)]
    code: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    values: Option<Value>,
}

/// Decoded `result` of the specification endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Specification {
    #[serde(default, deserialize_with = "lenient")]
    pub category: String,
    #[serde(default, deserialize_with = "spec_entries")]
    pub functions: HashMap<String, DeviceCapabilitySpec>,
    #[serde(default, rename = "status", deserialize_with = "spec_entries")]
    pub status_range: HashMap<String, DeviceCapabilitySpec>,
}

fn spec_entries<'de, D>(d: D) -> std::result::Result<HashMap<String, DeviceCapabilitySpec>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(d)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        // A malformed entry only costs that entry.
        .filter_map(|v| serde_json::from_value::<SpecEntry>(v).ok())
        .filter(|e| !e.code.is_empty())
        .map(|e| {
            let spec = DeviceCapabilitySpec::from_wire(&e.kind, e.values.as_ref());
            (e.code, spec)
        })
        .collect())
}

impl Specification {
    pub fn from_result(result: &Value) -> Result<Self> {
        Self::deserialize(result).map_err(|e| TuyaError::InvalidPayload(e.to_string()))
    }
}

/// Parses a status list (`[{code, value}, ...]`) into ordered pairs.
/// Entries without a code are skipped.
pub fn parse_status_list(list: &Value) -> Vec<(String, StatusValue)> {
    list.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| StatusItem::deserialize(v).ok())
                .filter(|item| !item.code.is_empty())
                .map(|item| (item.code, StatusValue::from(item.value)))
                .collect()
        })
        .unwrap_or_default()
}

/// A cloud device with its live status and capability schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient")]
    pub category: String,
    #[serde(default, deserialize_with = "lenient")]
    pub product_id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub product_name: String,
    #[serde(default, deserialize_with = "lenient")]
    pub online: bool,
    #[serde(default, deserialize_with = "lenient")]
    pub icon: String,
    #[serde(default, deserialize_with = "lenient")]
    pub ip: String,
    #[serde(default, deserialize_with = "lenient")]
    pub time_zone: String,
    #[serde(default, deserialize_with = "lenient", skip_serializing)]
    pub local_key: String,
    #[serde(default, deserialize_with = "lenient")]
    pub sub: bool,
    #[serde(default, deserialize_with = "lenient")]
    pub uuid: String,
    #[serde(default, deserialize_with = "lenient")]
    pub active_time: i64,
    #[serde(default, deserialize_with = "lenient")]
    pub create_time: i64,
    #[serde(default, deserialize_with = "lenient")]
    pub update_time: i64,

    /// Current values keyed by data-point code
    #[serde(skip_deserializing)]
    pub status: HashMap<String, StatusValue>,
    /// Writable data points and their accepted schema
    #[serde(skip_deserializing)]
    pub functions: HashMap<String, DeviceCapabilitySpec>,
    /// Readable data points and their reporting schema
    #[serde(skip_deserializing)]
    pub status_range: HashMap<String, DeviceCapabilitySpec>,
}

impl DeviceRecord {
    /// Builds a record from one device-list entry, seeding `status` from the
    /// embedded status array.
    pub fn from_api_response(data: &Value) -> Result<Self> {
        let mut record =
            Self::deserialize(data).map_err(|e| TuyaError::InvalidPayload(e.to_string()))?;
        if let Some(list) = data.get("status") {
            record.merge_status(parse_status_list(list));
        }
        Ok(record)
    }

    /// Overwrites the given codes, leaving every other code untouched.
    pub fn merge_status<I>(&mut self, items: I) -> usize
    where
        I: IntoIterator<Item = (String, StatusValue)>,
    {
        let mut count = 0;
        for (code, value) in items {
            self.status.insert(code, value);
            count += 1;
        }
        count
    }

    /// Replaces schema entries per code; codes not in `spec` are kept.
    pub fn apply_specification(&mut self, spec: Specification) {
        self.functions.extend(spec.functions);
        self.status_range.extend(spec.status_range);
    }

    /// Carries over schema entries learned by an earlier record of the same
    /// device.
    pub fn inherit_capabilities(&mut self, previous: &DeviceRecord) {
        for (code, spec) in &previous.functions {
            self.functions
                .entry(code.clone())
                .or_insert_with(|| spec.clone());
        }
        for (code, spec) in &previous.status_range {
            self.status_range
                .entry(code.clone())
                .or_insert_with(|| spec.clone());
        }
    }

    pub fn has_specification(&self) -> bool {
        !self.functions.is_empty() || !self.status_range.is_empty()
    }

    pub fn status_value(&self, code: &str) -> Option<&StatusValue> {
        self.status.get(code)
    }

    pub fn function(&self, code: &str) -> Option<&DeviceCapabilitySpec> {
        self.functions.get(code)
    }

    pub fn status_spec(&self, code: &str) -> Option<&DeviceCapabilitySpec> {
        self.status_range.get(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_value_accessors() {
        assert_eq!(StatusValue::from(json!(true)).as_bool(), Some(true));
        assert_eq!(StatusValue::from(json!(500)).as_i64(), Some(500));
        assert_eq!(StatusValue::from(json!(500)).as_f64(), Some(500.0));
        assert_eq!(StatusValue::from(json!(21.5)).as_f64(), Some(21.5));
        assert_eq!(StatusValue::from(json!(21.5)).as_i64(), None);
        assert_eq!(StatusValue::from(json!("white")).as_str(), Some("white"));
        assert_eq!(StatusValue::from(json!("white")).as_bool(), None);
        assert!(StatusValue::from(Value::Null).is_null());
    }

    #[test]
    fn json_encoded_string_is_decoded() {
        let v = StatusValue::from(json!(r#"{"h":120,"s":1000,"v":1000}"#));
        assert_eq!(v.decoded(), Some(json!({"h": 120, "s": 1000, "v": 1000})));
        assert_eq!(StatusValue::from(json!("white")).decoded(), None);
        assert_eq!(StatusValue::from(json!([1, 2])).decoded(), Some(json!([1, 2])));
    }

    #[test]
    fn status_value_serializes_as_wire_value() {
        let v = StatusValue::from(json!({"a": 1}));
        assert_eq!(serde_json::to_value(&v).unwrap(), json!({"a": 1}));
        let back: StatusValue = serde_json::from_value(json!(false)).unwrap();
        assert_eq!(back, StatusValue::Bool(false));
    }

    #[test]
    fn spec_values_decoding() {
        let s = DeviceCapabilitySpec::from_wire(
            "Integer",
            Some(&json!(r#"{"min":10,"max":1000,"scale":0,"step":1,"unit":""}"#)),
        );
        let range = s.integer_range().unwrap();
        assert_eq!((range.min, range.max, range.step), (10, 1000, 1));

        let e = DeviceCapabilitySpec::from_wire("Enum", Some(&json!(r#"{"range":["white","colour"]}"#)));
        assert_eq!(e.enum_range().unwrap(), vec!["white", "colour"]);
        assert!(e.integer_range().is_none());

        let broken = DeviceCapabilitySpec::from_wire("Json", Some(&json!("{not json")));
        assert_eq!(broken.values, json!({}));
        assert_eq!(broken.kind, "Json");

        let missing = DeviceCapabilitySpec::from_wire("Boolean", None);
        assert_eq!(missing.values, json!({}));
    }

    #[test]
    fn specification_skips_malformed_entries() {
        let spec = Specification::from_result(&json!({
            "category": "dj",
            "functions": [
                {"code": "switch_led", "type": "Boolean", "values": "{}"},
                {"code": "bright_value", "type": "Integer", "values": "{\"min\":10,\"max\":1000}"},
                {"code": "scene", "type": "Json", "values": "{{{"},
                {"code": "", "type": "Boolean", "values": "{}"},
                "garbage"
            ],
            "status": [
                {"code": "switch_led", "type": "Boolean", "values": "{}"}
            ]
        }))
        .unwrap();

        assert_eq!(spec.functions.len(), 3);
        assert_eq!(spec.functions["scene"].values, json!({}));
        assert_eq!(spec.functions["bright_value"].integer_range().unwrap().max, 1000);
        assert_eq!(spec.status_range.len(), 1);
    }

    #[test]
    fn record_from_listing() {
        let record = DeviceRecord::from_api_response(&json!({
            "id": "dev1",
            "name": "Lamp",
            "category": "dj",
            "product_id": "p1",
            "product_name": "Bulb",
            "online": true,
            "local_key": "secret",
            "status": [
                {"code": "switch_led", "value": true},
                {"code": "bright_value", "value": 500},
                {"value": 1}
            ]
        }))
        .unwrap();

        assert_eq!(record.id, "dev1");
        assert!(record.online);
        assert_eq!(record.status.len(), 2);
        assert_eq!(record.status["bright_value"].as_i64(), Some(500));
        assert!(!record.has_specification());
        assert!(serde_json::to_value(&record).unwrap().get("local_key").is_none());
    }

    #[test]
    fn record_tolerates_null_and_mistyped_fields() {
        let record = DeviceRecord::from_api_response(&json!({
            "id": "dev1",
            "name": "Plug",
            "ip": null,
            "sub": null,
            "time_zone": null,
            "icon": 7,
            "online": "true",
            "active_time": "1700000000",
            "local_key": null,
            "status": [{"code": "switch_1", "value": true}]
        }))
        .unwrap();

        assert_eq!(record.id, "dev1");
        assert_eq!(record.name, "Plug");
        assert_eq!(record.ip, "");
        assert!(!record.sub);
        assert!(!record.online);
        assert_eq!(record.icon, "");
        assert_eq!(record.active_time, 0);
        assert_eq!(record.status["switch_1"], StatusValue::Bool(true));

        let numeric = DeviceRecord::from_api_response(&json!({"id": 42})).unwrap();
        assert_eq!(numeric.id, "42");
    }

    #[test]
    fn specification_with_null_category_still_merges() {
        let spec = Specification::from_result(&json!({
            "category": null,
            "functions": [{"code": "switch_1", "type": "Boolean", "values": "{}"}],
            "status": null
        }))
        .unwrap();
        assert_eq!(spec.category, "");
        assert_eq!(spec.functions.len(), 1);
        assert!(spec.status_range.is_empty());
    }

    #[test]
    fn large_unsigned_values_keep_precision() {
        let big = u64::MAX;
        let v = StatusValue::from(json!(big));
        assert_eq!(v.to_json(), json!(big));
        assert_eq!(v.as_i64(), None);
        assert_eq!(StatusValue::from(json!(-5)), StatusValue::Integer(-5));
    }

    #[test]
    fn record_without_status_has_empty_map() {
        let record = DeviceRecord::from_api_response(&json!({"id": "dev2"})).unwrap();
        assert!(record.status.is_empty());
        assert!(record.functions.is_empty());
    }

    #[test]
    fn merge_is_additive() {
        let mut record = DeviceRecord::default();
        record.merge_status(vec![
            ("switch_1".to_string(), StatusValue::Bool(false)),
            ("bright_value".to_string(), StatusValue::Integer(500)),
        ]);
        record.merge_status(parse_status_list(&json!([{"code": "switch_1", "value": true}])));

        assert_eq!(record.status["switch_1"], StatusValue::Bool(true));
        assert_eq!(record.status["bright_value"], StatusValue::Integer(500));
    }

    #[test]
    fn capabilities_are_replaced_per_code_and_inherited() {
        let mut old = DeviceRecord::default();
        old.apply_specification(
            Specification::from_result(&json!({
                "functions": [
                    {"code": "a", "type": "Boolean", "values": "{}"},
                    {"code": "b", "type": "Boolean", "values": "{}"}
                ]
            }))
            .unwrap(),
        );
        old.apply_specification(
            Specification::from_result(&json!({
                "functions": [{"code": "a", "type": "Integer", "values": "{}"}]
            }))
            .unwrap(),
        );
        assert_eq!(old.functions["a"].kind, "Integer");
        assert_eq!(old.functions["b"].kind, "Boolean");

        let mut fresh = DeviceRecord::default();
        fresh.inherit_capabilities(&old);
        assert_eq!(fresh.functions.len(), 2);
    }
}
