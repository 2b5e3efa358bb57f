//! Canonical request fingerprints.
//!
//! A `RequestKey` is `tool_name` plus the arguments serialized with object
//! keys sorted at every nesting level, so `{a:1,b:2}` and `{b:2,a:1}` collapse
//! to the same key. The key is used for extractor dedup and as the result
//! cache key.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Hex chars of the SHA-256 digest used in log fields.
const DIGEST_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new(tool_name: &str, args: &Map<String, Value>) -> Self {
        let mut key = String::with_capacity(tool_name.len() + 32);
        key.push_str(tool_name);
        key.push(':');
        write_canonical_object(args, &mut key);
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short, log-safe fingerprint (arguments may carry user text).
    pub fn digest(&self) -> String {
        let hash = Sha256::digest(self.0.as_bytes());
        let mut hex: String = hash.iter().map(|b| format!("{b:02x}")).collect();
        hex.truncate(DIGEST_LEN);
        hex
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialize `value` with object keys sorted recursively.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_canonical_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        // Scalars already have a single JSON spelling.
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_canonical_object(map: &Map<String, Value>, out: &mut String) {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    out.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_canonical(value, out);
    }
    out.push('}');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_key_order_insensitive_at_every_level() {
        let a = obj(json!({"location": "Seattle", "opts": {"units": "metric", "days": 3}}));
        let b = obj(json!({"opts": {"days": 3, "units": "metric"}, "location": "Seattle"}));
        assert_eq!(RequestKey::new("get_weather", &a), RequestKey::new("get_weather", &b));
    }

    #[test]
    fn test_tool_name_is_part_of_key() {
        let args = obj(json!({"query": "rust"}));
        assert_ne!(RequestKey::new("search", &args), RequestKey::new("lookup", &args));
    }

    #[test]
    fn test_value_types_distinguish_keys() {
        let text = obj(json!({"n": "2"}));
        let number = obj(json!({"n": 2}));
        assert_ne!(RequestKey::new("calc", &text), RequestKey::new("calc", &number));
    }

    #[test]
    fn test_canonical_json_shape() {
        let value = json!({"b": [{"y": 1, "x": null}], "a": "q\"uote"});
        assert_eq!(canonical_json(&value), r#"{"a":"q\"uote","b":[{"x":null,"y":1}]}"#);
        assert_eq!(
            RequestKey::new("t", &obj(json!({}))).as_str(),
            "t:{}"
        );
    }

    #[test]
    fn test_digest_is_stable_and_short() {
        let key = RequestKey::new("get_weather", &obj(json!({"location": "Paris"})));
        assert_eq!(key.digest().len(), 12);
        assert_eq!(key.digest(), key.clone().digest());
    }
}
