//! Conversions between `serde_json::Value` and [`Value`].
//!
//! JSON arrays become lists, JSON objects become string/int keyed arrays in
//! document order. Converting back produces a JSON array when keys are
//! exactly `0..n`, otherwise a JSON object.

use serde_json::{Map, Number};

use crate::elements::Elements;
use crate::error::StreamError;
use crate::value::{Key, Value};

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::Array(Elements::list(items.into_iter().map(Value::from)))
            }
            serde_json::Value::Object(map) => Value::Array(
                map.into_iter()
                    .map(|(k, v)| (Key::parse(&k), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl TryFrom<Value> for serde_json::Value {
    type Error = StreamError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Ok(match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::Number(i.into()),
            Value::Float(f) => Number::from_f64(f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| StreamError::type_mismatch("json", "finite float", f.to_string()))?,
            Value::Str(s) => serde_json::Value::String(s),
            Value::Array(elements) => {
                let is_list = elements
                    .keys()
                    .enumerate()
                    .all(|(i, k)| k.as_int() == i64::try_from(i).ok());
                if is_list {
                    serde_json::Value::Array(
                        elements
                            .into_values()
                            .into_iter()
                            .map(serde_json::Value::try_from)
                            .collect::<Result<_, _>>()?,
                    )
                } else {
                    let mut map = Map::new();
                    for (key, value) in elements {
                        map.insert(key.to_string(), serde_json::Value::try_from(value)?);
                    }
                    serde_json::Value::Object(map)
                }
            }
            other => {
                return Err(StreamError::type_mismatch(
                    "json",
                    "data value",
                    other.type_name(),
                ));
            }
        })
    }
}
