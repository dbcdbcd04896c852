//! Conversions between plain state values and CRDT engine values.
//!
//! The application-facing state tree is [`serde_json::Value`]; the engine
//! speaks [`loro::LoroValue`]. Both are plain data unions, so the mapping is
//! mechanical. Container references have no plain-value equivalent and
//! surface as their container-id string.

use loro::LoroValue;
use serde_json::Value;

/// Convert a plain state value into an engine value.
///
/// Integers that fit `i64` stay integers; all other numbers become doubles.
pub fn json_to_loro(value: &Value) -> LoroValue {
    match value {
        Value::Null => LoroValue::Null,
        Value::Bool(b) => LoroValue::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                LoroValue::I64(i)
            } else {
                LoroValue::Double(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => LoroValue::from(s.as_str()),
        Value::Array(items) => {
            LoroValue::from(items.iter().map(json_to_loro).collect::<Vec<_>>())
        }
        Value::Object(map) => LoroValue::from(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_loro(v)))
                .collect::<std::collections::HashMap<String, LoroValue>>(),
        ),
    }
}

/// Convert an engine value into a plain state value.
///
/// Binary blobs become byte arrays; a container reference becomes its id
/// string (callers that need the live container resolve it through the doc).
pub fn loro_to_json(value: &LoroValue) -> Value {
    match value {
        LoroValue::Null => Value::Null,
        LoroValue::Bool(b) => Value::Bool(*b),
        LoroValue::Double(d) => serde_json::Number::from_f64(*d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        LoroValue::I64(i) => Value::Number((*i).into()),
        LoroValue::Binary(bytes) => {
            Value::Array(bytes.iter().map(|b| Value::Number((*b).into())).collect())
        }
        LoroValue::String(s) => Value::String(s.to_string()),
        LoroValue::List(items) => Value::Array(items.iter().map(loro_to_json).collect()),
        LoroValue::Map(entries) => {
            let mut map = serde_json::Map::with_capacity(entries.len());
            for (k, v) in entries.iter() {
                map.insert(k.clone(), loro_to_json(v));
            }
            Value::Object(map)
        }
        LoroValue::Container(id) => Value::String(id.to_string()),
    }
}

/// Human-readable kind name for error messages.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Shallow-merge `patch` into `target`.
///
/// Top-level object keys from `patch` replace the corresponding keys in
/// `target`; anything else replaces `target` wholesale.
pub fn shallow_merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(dst), Value::Object(src)) => {
            for (k, v) in src {
                dst.insert(k, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn primitives_round_trip() {
        for v in [
            json!(null),
            json!(true),
            json!(false),
            json!(0),
            json!(-42),
            json!(1.5),
            json!(""),
            json!("hello"),
        ] {
            assert_eq!(loro_to_json(&json_to_loro(&v)), v);
        }
    }

    #[test]
    fn nested_structures_round_trip() {
        let v = json!({"a": [1, 2, {"b": null}], "c": {"d": ""}});
        assert_eq!(loro_to_json(&json_to_loro(&v)), v);
    }

    #[test]
    fn shallow_merge_replaces_keys_only() {
        let mut target = json!({"a": 1, "b": 2});
        shallow_merge(&mut target, json!({"b": 3, "c": 4}));
        assert_eq!(target, json!({"a": 1, "b": 3, "c": 4}));
    }

    #[test]
    fn shallow_merge_non_object_replaces() {
        let mut target = json!({"a": 1});
        shallow_merge(&mut target, json!([1, 2]));
        assert_eq!(target, json!([1, 2]));
    }
}
