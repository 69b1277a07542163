//! `verilink-config` — runtime configuration for the verilink server.
//!
//! Provides:
//! - Typed config schema (server, provider, polling, challenge, flows, output)
//! - YAML loading
//! - `${ENV_VAR}` substitution
//! - Config redaction for safe logging/display
//! - Default value application
//! - Schema validation

pub mod defaults;
pub mod env;
pub mod io;
pub mod redact;
pub mod schema;
pub mod validation;

pub use defaults::apply_all_defaults;
pub use env::{collect_referenced_vars, resolve_env_vars, resolve_env_vars_with, MissingEnvVarError};
pub use io::{config_dir, config_file_path, load_config};
pub use redact::{collect_redacted_paths, redact};
pub use schema::{
    CertificateLevelsConfig, ChallengeConfig, InteractionTextsConfig, LoggingConfig,
    PollingConfig, ProviderConfig, RetryConfig, ServerConfig, SigningConfig, SimulatorSettings,
    VerilinkConfig,
};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;

/// Load, apply env substitution, apply defaults and validate a config file.
///
/// Validation warnings are logged; any validation error aborts the load.
pub async fn load_and_prepare(path: &Path) -> Result<VerilinkConfig> {
    let raw_config = load_config(path).await?;

    let value: Value =
        serde_json::to_value(&raw_config).context("Failed to serialize config for processing")?;
    let value = resolve_env_vars(&value).context("Failed to resolve env vars in config")?;

    let config: VerilinkConfig =
        serde_json::from_value(value).context("Failed to deserialize config after processing")?;
    let config = apply_all_defaults(config);

    let report = validate(&config);
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    if !report.is_valid() {
        for error in &report.errors {
            tracing::error!(path = %error.path, message = %error.message, "Config error");
        }
        let summary: Vec<String> = report.errors.iter().map(ToString::to_string).collect();
        bail!("Invalid configuration:\n  {}", summary.join("\n  "));
    }

    Ok(config)
}

/// Redacted JSON snapshot of `config`, safe for logs.
pub fn redacted_snapshot(config: &VerilinkConfig) -> Result<Value> {
    let value = serde_json::to_value(config).context("Failed to serialize config")?;
    Ok(redact(&value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prepares_file_with_env_and_defaults() {
        std::env::set_var("VERILINK_TEST_RP_SECRET", "from-env-secret");
        let dir = tempfile::tempdir().unwrap();
        let path = config_file_path(dir.path());
        tokio::fs::write(
            &path,
            "provider:\n  apiSecret: ${VERILINK_TEST_RP_SECRET}\npolling:\n  intervalMs: 200\n",
        )
        .await
        .unwrap();

        let cfg = load_and_prepare(&path).await.unwrap();
        assert_eq!(
            cfg.provider.as_ref().unwrap().api_secret.as_deref(),
            Some("from-env-secret")
        );
        assert_eq!(cfg.poll_interval().as_millis(), 200);
        assert_eq!(cfg.challenge.as_ref().unwrap().bucket_secs, Some(1));

        let snapshot = redacted_snapshot(&cfg).unwrap();
        assert_eq!(snapshot["provider"]["apiSecret"], "from***");
    }

    #[tokio::test]
    async fn validation_errors_abort_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = config_file_path(dir.path());
        tokio::fs::write(&path, "challenge:\n  bucketSecs: 0\n")
            .await
            .unwrap();

        let err = load_and_prepare(&path).await.unwrap_err().to_string();
        assert!(err.contains("challenge.bucketSecs"));
    }

    #[tokio::test]
    async fn missing_env_var_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = config_file_path(dir.path());
        tokio::fs::write(&path, "provider:\n  apiSecret: ${VERILINK_TEST_UNSET_VAR}\n")
            .await
            .unwrap();

        let err = load_and_prepare(&path).await.unwrap_err();
        assert!(format!("{err:#}").contains("VERILINK_TEST_UNSET_VAR"));
    }
}
