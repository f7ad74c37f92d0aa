//! Plain JSON <-> Firestore typed-value translation.
//!
//! Firestore REST documents carry every value wrapped in a single-key object naming its
//! type (`{"stringValue": "x"}`, `{"mapValue": {"fields": {...}}}`, ...). 64-bit
//! integers travel as decimal strings.

use crate::StoreError;
use serde_json::{Map, Value};

/// Encode a JSON object as a Firestore `fields` map.
pub(crate) fn encode_fields(document: &Value) -> Result<Map<String, Value>, StoreError> {
    let object = document.as_object().ok_or(StoreError::NotAnObject)?;
    Ok(object
        .iter()
        .map(|(key, value)| (key.clone(), encode_value(value)))
        .collect())
}

pub(crate) fn encode_value(value: &Value) -> Value {
    let mut typed = Map::new();
    match value {
        Value::Null => {
            typed.insert("nullValue".into(), Value::Null);
        }
        Value::Bool(b) => {
            typed.insert("booleanValue".into(), Value::Bool(*b));
        }
        Value::Number(n) => match n.as_i64() {
            Some(int) => {
                typed.insert("integerValue".into(), Value::String(int.to_string()));
            }
            None => {
                typed.insert("doubleValue".into(), Value::Number(n.clone()));
            }
        },
        Value::String(s) => {
            typed.insert("stringValue".into(), Value::String(s.clone()));
        }
        Value::Array(items) => {
            let values = items.iter().map(encode_value).collect();
            let mut array = Map::new();
            array.insert("values".into(), Value::Array(values));
            typed.insert("arrayValue".into(), Value::Object(array));
        }
        Value::Object(object) => {
            let fields = object
                .iter()
                .map(|(key, value)| (key.clone(), encode_value(value)))
                .collect();
            let mut map = Map::new();
            map.insert("fields".into(), Value::Object(fields));
            typed.insert("mapValue".into(), Value::Object(map));
        }
    }
    Value::Object(typed)
}

/// Decode a Firestore `fields` map into a plain JSON object.
pub(crate) fn decode_fields(fields: &Map<String, Value>) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(key, value)| (key.clone(), decode_value(value)))
            .collect(),
    )
}

pub(crate) fn decode_value(typed: &Value) -> Value {
    let Some((kind, inner)) = typed.as_object().and_then(|o| o.iter().next()) else {
        return Value::Null;
    };

    match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" | "doubleValue" => inner.clone(),
        "integerValue" => match inner {
            Value::String(s) => s
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| inner.clone()),
            other => other.clone(),
        },
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" | "geoPointValue" => {
            inner.clone()
        }
        "mapValue" => inner
            .get("fields")
            .and_then(Value::as_object)
            .map(decode_fields)
            .unwrap_or_else(|| Value::Object(Map::new())),
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        _ => Value::Null,
    }
}
