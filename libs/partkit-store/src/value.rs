//! Stored values and their JSON representation.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value as Json};

use crate::field::{field_type, DataType, FieldMap};
use crate::validate::{ValidationError, ValidationIssue};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Blob(Vec<u8>),
    Date(DateTime<Utc>),
    Json(Json),
}

/// Field name → value of one document.
pub type Values = BTreeMap<String, Value>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Blob(_) => "blob",
            Value::Date(_) => "date",
            Value::Json(_) => "json",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Decode a JSON value for a field of the given type. JSON `null` is
    /// always [`Value::Null`]; nullability is checked by validation.
    pub fn from_json(data_type: DataType, json: &Json) -> Result<Value, String> {
        if json.is_null() {
            return Ok(Value::Null);
        }
        let mismatch = || format!("expected {data_type}, got {}", json_kind(json));
        match data_type {
            DataType::String | DataType::Reference => {
                json.as_str().map(|s| Value::String(s.to_string())).ok_or_else(mismatch)
            }
            DataType::Boolean => json.as_bool().map(Value::Bool).ok_or_else(mismatch),
            DataType::Integer => json.as_i64().map(Value::Integer).ok_or_else(mismatch),
            DataType::Float => json.as_f64().map(Value::Float).ok_or_else(mismatch),
            DataType::Blob => {
                let s = json.as_str().ok_or_else(mismatch)?;
                base64::engine::general_purpose::STANDARD
                    .decode(s)
                    .map(Value::Blob)
                    .map_err(|_| "expected base64-encoded blob".to_string())
            }
            DataType::Date => {
                let s = json.as_str().ok_or_else(mismatch)?;
                parse_date(s).ok_or_else(|| "expected RFC 3339 date".to_string())
            }
            DataType::Json => Ok(Value::Json(json.clone())),
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Integer(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::Blob(bytes) => {
                Json::String(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
            Value::Date(d) => Json::String(d.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Json(j) => j.clone(),
        }
    }

    /// Ordering between comparable values; integers and floats compare
    /// numerically, JSON compares by its serialized text as SQLite does.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Blob(a), Value::Blob(b)) => Some(a.cmp(b)),
            (Value::Json(a), Value::Json(b)) => Some(a.to_string().cmp(&b.to_string())),
            _ => None,
        }
    }

    /// Equality of two non-null values as the store compares them.
    pub fn same_as(&self, other: &Value) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Date(value)
    }
}

pub(crate) fn parse_date(s: &str) -> Option<Value> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| Value::Date(d.with_timezone(&Utc)))
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

/// Decode a JSON object into [`Values`] using the field map for typing.
///
/// Unknown keys and undecodable values are reported together. The `id` key is
/// decoded as a string so read-back documents can be fed back in.
pub fn values_from_json(fields: &FieldMap, json: &Json) -> Result<Values, ValidationError> {
    let Some(object) = json.as_object() else {
        return Err(ValidationError::single("(document)", "expected an object"));
    };
    let mut issues = Vec::new();
    let mut values = Values::new();
    for (key, item) in object {
        let Some(data_type) = field_type(fields, key) else {
            issues.push(ValidationIssue::new(key, "unknown field"));
            continue;
        };
        match Value::from_json(data_type, item) {
            Ok(value) => {
                values.insert(key.clone(), value);
            }
            Err(message) => issues.push(ValidationIssue::new(key, message)),
        }
    }
    if issues.is_empty() {
        Ok(values)
    } else {
        Err(ValidationError::new(issues))
    }
}

pub fn values_to_json(values: &Values) -> Json {
    let object: Map<String, Json> = values
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();
    Json::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use serde_json::json;

    #[test]
    fn decodes_by_field_type() {
        let mut fields = FieldMap::new();
        fields.insert("name".into(), Field::string());
        fields.insert("born".into(), Field::date());
        fields.insert("avatar".into(), Field::blob());
        fields.insert("score".into(), Field::float());

        let values = values_from_json(
            &fields,
            &json!({"name": "Matti", "born": "1990-01-02T03:04:05Z", "avatar": "AQID", "score": 3}),
        )
        .unwrap();
        assert_eq!(values["name"], Value::from("Matti"));
        assert_eq!(values["avatar"], Value::Blob(vec![1, 2, 3]));
        assert_eq!(values["score"], Value::Float(3.0));
        assert!(matches!(values["born"], Value::Date(_)));
        assert_eq!(values_to_json(&values)["born"], json!("1990-01-02T03:04:05Z"));
    }

    #[test]
    fn reports_all_decoding_issues() {
        let mut fields = FieldMap::new();
        fields.insert("age".into(), Field::integer());
        let err = values_from_json(&fields, &json!({"age": "old", "nick": "x"})).unwrap_err();
        assert_eq!(err.issues.len(), 2);
        assert!(err.to_string().contains("age: expected integer, got string"));
        assert!(err.to_string().contains("nick: unknown field"));
    }

    #[test]
    fn numeric_comparison_crosses_integer_and_float() {
        assert!(Value::Integer(2).same_as(&Value::Float(2.0)));
        assert_eq!(Value::Integer(1).compare(&Value::Float(1.5)), Some(Ordering::Less));
        assert_eq!(Value::from("a").compare(&Value::Integer(1)), None);
    }

    #[test]
    fn json_compares_by_serialized_text() {
        let a = Value::Json(json!({"a": 1}));
        let b = Value::Json(json!({"a": 2}));
        assert_eq!(a.compare(&b), Some(Ordering::Less));
        assert!(!a.same_as(&b));
        assert!(a.same_as(&Value::Json(json!({"a": 1}))));
    }
}
