//! Declarative payload casting.
//!
//! Events may declare per-field coercions that are applied whenever the payload
//! is read. Only top-level fields of object payloads are cast; a value that
//! cannot be coerced is passed through untouched.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value as JsonValue};

/// Target type of a field cast.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Cast {
    String,
    Integer,
    Float,
    Boolean,
    /// Wraps scalars into a one-element array; `null` becomes `[]`.
    Array,
    /// Parses JSON-encoded strings into objects.
    Object,
}

/// Field name to cast mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Casts {
    fields: BTreeMap<String, Cast>,
}

impl Casts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, cast: Cast) -> Self {
        self.fields.insert(name.into(), cast);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Cast> {
        self.fields.get(name).copied()
    }

    /// Return a copy of `payload` with all declared casts applied.
    pub fn apply(&self, payload: &JsonValue) -> JsonValue {
        let JsonValue::Object(map) = payload else {
            return payload.clone();
        };
        if self.fields.is_empty() {
            return payload.clone();
        }

        let mut out = Map::with_capacity(map.len());
        for (key, value) in map {
            let value = match self.fields.get(key) {
                Some(cast) => cast_value(*cast, value),
                None => value.clone(),
            };
            out.insert(key.clone(), value);
        }
        JsonValue::Object(out)
    }
}

fn cast_value(cast: Cast, value: &JsonValue) -> JsonValue {
    let cast = match cast {
        Cast::String => to_string(value),
        Cast::Integer => to_integer(value),
        Cast::Float => to_float(value),
        Cast::Boolean => to_boolean(value),
        Cast::Array => to_array(value),
        Cast::Object => to_object(value),
    };
    cast.unwrap_or_else(|| value.clone())
}

fn to_string(value: &JsonValue) -> Option<JsonValue> {
    match value {
        JsonValue::String(_) => Some(value.clone()),
        JsonValue::Number(n) => Some(JsonValue::String(n.to_string())),
        JsonValue::Bool(b) => Some(JsonValue::String(b.to_string())),
        JsonValue::Null => None,
        JsonValue::Array(_) | JsonValue::Object(_) => Some(JsonValue::String(value.to_string())),
    }
}

fn to_integer(value: &JsonValue) -> Option<JsonValue> {
    match value {
        JsonValue::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
        JsonValue::Number(n) => n.as_f64().map(|f| JsonValue::from(f.trunc() as i64)),
        JsonValue::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
                .map(JsonValue::from)
        }
        JsonValue::Bool(b) => Some(JsonValue::from(i64::from(*b))),
        _ => None,
    }
}

fn to_float(value: &JsonValue) -> Option<JsonValue> {
    let f = match value {
        JsonValue::Number(n) => n.as_f64()?,
        JsonValue::String(s) => s.trim().parse::<f64>().ok()?,
        JsonValue::Bool(b) => f64::from(u8::from(*b)),
        _ => return None,
    };
    Number::from_f64(f).map(JsonValue::Number)
}

fn to_boolean(value: &JsonValue) -> Option<JsonValue> {
    match value {
        JsonValue::Bool(_) => Some(value.clone()),
        JsonValue::Number(n) => n.as_f64().map(|f| JsonValue::Bool(f != 0.0)),
        JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(JsonValue::Bool(true)),
            "false" | "0" | "no" | "off" | "" => Some(JsonValue::Bool(false)),
            _ => None,
        },
        JsonValue::Null => Some(JsonValue::Bool(false)),
        _ => None,
    }
}

fn to_array(value: &JsonValue) -> Option<JsonValue> {
    match value {
        JsonValue::Array(_) => Some(value.clone()),
        JsonValue::Null => Some(JsonValue::Array(Vec::new())),
        other => Some(JsonValue::Array(vec![other.clone()])),
    }
}

fn to_object(value: &JsonValue) -> Option<JsonValue> {
    match value {
        JsonValue::Object(_) => Some(value.clone()),
        JsonValue::String(s) => serde_json::from_str::<JsonValue>(s)
            .ok()
            .filter(JsonValue::is_object),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn casts_declared_fields_only() {
        let casts = Casts::new()
            .field("count", Cast::Integer)
            .field("enabled", Cast::Boolean);

        let out = casts.apply(&json!({"count": "42", "enabled": "yes", "name": 7}));
        assert_eq!(out, json!({"count": 42, "enabled": true, "name": 7}));
    }

    #[test]
    fn uncoercible_values_pass_through() {
        let casts = Casts::new().field("count", Cast::Integer);
        let out = casts.apply(&json!({"count": "many"}));
        assert_eq!(out, json!({"count": "many"}));
    }

    #[test]
    fn non_object_payloads_are_untouched() {
        let casts = Casts::new().field("x", Cast::String);
        assert_eq!(casts.apply(&json!([1, 2])), json!([1, 2]));
        assert_eq!(casts.apply(&JsonValue::Null), JsonValue::Null);
    }

    #[test]
    fn string_float_array_and_object_casts() {
        let casts = Casts::new()
            .field("id", Cast::String)
            .field("ratio", Cast::Float)
            .field("tags", Cast::Array)
            .field("meta", Cast::Object);

        let out = casts.apply(&json!({
            "id": 12,
            "ratio": "0.5",
            "tags": "urgent",
            "meta": "{\"a\":1}"
        }));

        assert_eq!(
            out,
            json!({"id": "12", "ratio": 0.5, "tags": ["urgent"], "meta": {"a": 1}})
        );
    }

    #[test]
    fn integer_cast_truncates_floats() {
        let casts = Casts::new().field("n", Cast::Integer);
        assert_eq!(casts.apply(&json!({"n": 3.9})), json!({"n": 3}));
        assert_eq!(casts.apply(&json!({"n": "2.5"})), json!({"n": 2}));
    }
}
