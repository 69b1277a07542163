//! Config redaction: safe-to-share config snapshots with secrets masked.

use serde_json::Value;

/// Keys whose values are never shown in full.
static SENSITIVE_KEYS: &[&str] = &[
    "relyingPartyUuid",
    "relying_party_uuid",
    "apiSecret",
    "api_secret",
    "apiKey",
    "api_key",
    "token",
    "secret",
    "password",
    "privateKey",
    "private_key",
];

/// Redact a config JSON value, masking every sensitive field.
///
/// The first four characters are kept as a hint.
pub fn redact(value: &Value) -> Value {
    redact_recursive(value, "")
}

fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
}

fn redact_string(s: &str, key: &str) -> Value {
    if !is_sensitive_key(key) || s.is_empty() {
        return Value::String(s.to_string());
    }
    let hint: String = if s.chars().count() > 8 {
        s.chars().take(4).collect()
    } else {
        String::new()
    };
    Value::String(format!("{hint}***"))
}

fn redact_recursive(value: &Value, key: &str) -> Value {
    match value {
        Value::String(s) => redact_string(s, key),
        Value::Array(arr) => Value::Array(arr.iter().map(|v| redact_recursive(v, key)).collect()),
        Value::Object(map) => {
            let mut result = serde_json::Map::new();
            for (k, v) in map {
                result.insert(k.clone(), redact_recursive(v, k));
            }
            Value::Object(result)
        }
        other => other.clone(),
    }
}

/// Collect all field paths that [`redact`] would mask.
pub fn collect_redacted_paths(value: &Value) -> Vec<String> {
    let mut paths = Vec::new();
    collect_paths_recursive(value, "", &mut paths);
    paths
}

fn collect_paths_recursive(value: &Value, path: &str, out: &mut Vec<String>) {
    match value {
        Value::String(s) if !s.is_empty() => {
            let key = path.rsplit('.').next().unwrap_or("");
            if is_sensitive_key(key) {
                out.push(path.to_string());
            }
        }
        Value::Object(map) => {
            for (k, v) in map {
                let child_path = if path.is_empty() {
                    k.clone()
                } else {
                    format!("{path}.{k}")
                };
                collect_paths_recursive(v, &child_path, out);
            }
        }
        _ => {}
    }
}
