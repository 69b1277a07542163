//! Environment variable substitution for config values.
//!
//! Supports `${VAR_NAME}` syntax in string values, resolved at load time.
//! Only uppercase `[A-Z_][A-Z0-9_]*` variable names are matched.
//! `$${VAR}` escapes to a literal `${VAR}`.

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::HashMap;

/// A `${VAR}` reference, optionally preceded by the `$` escape.
static ENV_VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\$?)\$\{([A-Z_][A-Z0-9_]*)\}").unwrap());

/// Error returned for missing env vars.
#[derive(Debug, thiserror::Error)]
#[error("Missing env var \"{var_name}\" referenced at config path: {config_path}")]
pub struct MissingEnvVarError {
    pub var_name: String,
    pub config_path: String,
}

/// Substitute `${VAR}` references in a config JSON value tree.
///
/// Walks the value tree recursively; only string leaves are processed.
/// Returns an error if any referenced env var is not set or is empty.
pub fn resolve_env_vars(value: &Value) -> Result<Value> {
    substitute_value(value, &std::env::vars().collect(), "")
}

/// Substitute env vars using a provided map.
pub fn resolve_env_vars_with(value: &Value, env: &HashMap<String, String>) -> Result<Value> {
    substitute_value(value, env, "")
}

fn substitute_value(value: &Value, env: &HashMap<String, String>, path: &str) -> Result<Value> {
    match value {
        Value::String(s) => Ok(Value::String(substitute_string(s, env, path)?)),
        Value::Array(arr) => {
            let result: Result<Vec<_>> = arr
                .iter()
                .enumerate()
                .map(|(i, v)| substitute_value(v, env, &format!("{path}[{i}]")))
                .collect();
            Ok(Value::Array(result?))
        }
        Value::Object(map) => {
            let mut result = serde_json::Map::new();
            for (k, v) in map {
                let child_path = if path.is_empty() {
                    k.clone()
                } else {
                    format!("{path}.{k}")
                };
                result.insert(k.clone(), substitute_value(v, env, &child_path)?);
            }
            Ok(Value::Object(result))
        }
        other => Ok(other.clone()),
    }
}

fn substitute_string(s: &str, env: &HashMap<String, String>, path: &str) -> Result<String> {
    if !s.contains('$') {
        return Ok(s.to_string());
    }

    let mut missing: Option<MissingEnvVarError> = None;
    let substituted = ENV_VAR_PATTERN.replace_all(s, |caps: &Captures| {
        let var_name = &caps[2];
        if !caps[1].is_empty() {
            return format!("${{{var_name}}}");
        }
        match env.get(var_name) {
            Some(val) if !val.is_empty() => val.clone(),
            _ => {
                missing.get_or_insert_with(|| MissingEnvVarError {
                    var_name: var_name.to_string(),
                    config_path: path.to_string(),
                });
                String::new()
            }
        }
    });

    if let Some(err) = missing {
        bail!(err);
    }
    Ok(substituted.into_owned())
}

/// Collect all env var names referenced in a config value tree.
pub fn collect_referenced_vars(value: &Value) -> Vec<String> {
    let mut vars = Vec::new();
    collect_vars_recursive(value, &mut vars);
    vars.sort();
    vars.dedup();
    vars
}

fn collect_vars_recursive(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            for caps in ENV_VAR_PATTERN.captures_iter(s) {
                if caps[1].is_empty() {
                    out.push(caps[2].to_string());
                }
            }
        }
        Value::Array(arr) => arr.iter().for_each(|v| collect_vars_recursive(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_vars_recursive(v, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_nested_var() {
        let v = json!({"provider": {"apiSecret": "${RP_SECRET}"}});
        let result = resolve_env_vars_with(&v, &env(&[("RP_SECRET", "s3cr3t")])).unwrap();
        assert_eq!(result["provider"]["apiSecret"], "s3cr3t");
    }

    #[test]
    fn error_names_var_and_path() {
        let v = json!({"provider": {"relyingPartyUuid": "${RP_UUID}"}});
        let err = resolve_env_vars_with(&v, &HashMap::new())
            .unwrap_err()
            .to_string();
        assert!(err.contains("RP_UUID"));
        assert!(err.contains("provider.relyingPartyUuid"));
    }

    #[test]
    fn escaped_reference_is_kept_literal() {
        let v = json!({"text": "$${HOME} and ${NAME}"});
        let result = resolve_env_vars_with(&v, &env(&[("NAME", "verilink")])).unwrap();
        assert_eq!(result["text"], "${HOME} and verilink");
    }

    #[test]
    fn passthrough_non_var_strings_and_numbers() {
        let v = json!({"key": "plain-string", "port": 8080, "price": "$5"});
        let result = resolve_env_vars_with(&v, &HashMap::new()).unwrap();
        assert_eq!(result, v);
    }

    #[test]
    fn collects_referenced_vars_but_not_escapes() {
        let v = json!({"a": "${FOO}", "b": {"c": ["${BAR}", "$${BAZ}"]}});
        assert_eq!(collect_referenced_vars(&v), vec!["BAR", "FOO"]);
    }
}
