//! Config validation: schema checks with user-friendly error messages.

use thiserror::Error;
use url::Url;

use verilink_core::{validate_interactions, Interaction, InteractionMode};

use crate::schema::VerilinkConfig;

/// A config validation error with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// A collection of validation errors found in one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate the config and return a report of all errors and warnings.
pub fn validate(config: &VerilinkConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_server(config, &mut report);
    validate_provider(config, &mut report);
    validate_polling(config, &mut report);
    validate_challenge(config, &mut report);
    validate_interaction_texts(config, &mut report);
    validate_logging(config, &mut report);
    report
}

fn validate_server(config: &VerilinkConfig, report: &mut ValidationReport) {
    let Some(server) = &config.server else { return };
    if let Some(port) = server.port {
        if port == 0 {
            report.error("server.port", "port must be > 0");
        } else if port < 1024 && port != 80 && port != 443 {
            report.warn(
                "server.port",
                format!("Port {port} requires elevated privileges; consider using a port >= 1024"),
            );
        }
    }
}

fn validate_provider(config: &VerilinkConfig, report: &mut ValidationReport) {
    let Some(provider) = &config.provider else { return };
    if let Some(kind) = &provider.kind {
        if kind != "simulator" {
            report.error(
                "provider.kind",
                format!("Unknown provider '{kind}'. Only 'simulator' is supported"),
            );
        }
    }
    if let Some(host) = &provider.host_url {
        if Url::parse(host).is_err() {
            report.error("provider.hostUrl", format!("'{host}' is not a valid URL"));
        }
    }
}

/// Validate poll cadence and retry policy.
fn validate_polling(config: &VerilinkConfig, report: &mut ValidationReport) {
    let Some(polling) = &config.polling else { return };
    if polling.interval_ms == Some(0) {
        report.error("polling.intervalMs", "intervalMs must be > 0");
    }
    if polling.timeout_secs == Some(0) {
        report.error("polling.timeoutSecs", "timeoutSecs must be > 0");
    }
    if polling.max_concurrent_polls == Some(0) {
        report.error("polling.maxConcurrentPolls", "maxConcurrentPolls must be >= 1");
    }
    if let (Some(interval_ms), Some(timeout_secs)) = (polling.interval_ms, polling.timeout_secs) {
        if interval_ms > 0 && timeout_secs.saturating_mul(1000) < interval_ms {
            report.warn(
                "polling.timeoutSecs",
                "timeout is shorter than the poll interval; sessions will time out after one fetch",
            );
        }
    }
    if let Some(retry) = &polling.retry {
        if let Some(factor) = retry.backoff_factor {
            if !factor.is_finite() || factor < 1.0 {
                report.error("polling.retry.backoffFactor", "backoffFactor must be >= 1.0");
            }
        }
        if let (Some(base), Some(max)) = (retry.base_delay_ms, retry.max_delay_ms) {
            if max < base {
                report.warn(
                    "polling.retry.maxDelayMs",
                    "maxDelayMs is below baseDelayMs; every retry waits maxDelayMs",
                );
            }
        }
    }
}

fn validate_challenge(config: &VerilinkConfig, report: &mut ValidationReport) {
    let Some(challenge) = &config.challenge else { return };
    if challenge.bucket_secs == Some(0) {
        report.error("challenge.bucketSecs", "bucketSecs must be >= 1");
    }
    if challenge.qr_module_px == Some(0) {
        report.error("challenge.qrModulePx", "qrModulePx must be >= 1");
    }
    if let Some(base_url) = &challenge.base_url {
        match Url::parse(base_url) {
            Ok(url) if url.scheme() == "https" => {}
            Ok(url) => report.warn(
                "challenge.baseUrl",
                format!("scheme '{}' is not https; devices may refuse the link", url.scheme()),
            ),
            Err(_) => report.error("challenge.baseUrl", format!("'{base_url}' is not a valid URL")),
        }
    }
    if let Some(lang) = &challenge.lang {
        if lang.len() != 3 || !lang.chars().all(|c| c.is_ascii_lowercase()) {
            report.warn("challenge.lang", format!("'{lang}' is not a 3-letter language code"));
        }
    }
}

/// Device texts must fit the PIN prompt.
fn validate_interaction_texts(config: &VerilinkConfig, report: &mut ValidationReport) {
    let Some(texts) = &config.interactions else { return };
    let fields = [
        ("interactions.authenticationText", &texts.authentication_text),
        ("interactions.signatureText", &texts.signature_text),
    ];
    for (path, text) in fields {
        let Some(text) = text else { continue };
        let prompt = [Interaction::DisplayTextAndPin { text: text.clone() }];
        if let Err(e) = validate_interactions(&prompt, InteractionMode::DeviceLink) {
            report.error(path, e.to_string());
        }
    }
}

fn validate_logging(config: &VerilinkConfig, report: &mut ValidationReport) {
    let Some(logging) = &config.logging else { return };
    if let Some(level) = &logging.level {
        if !matches!(
            level.to_ascii_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            report.error(
                "logging.level",
                format!("Unknown log level '{level}'. Use trace, debug, info, warn or error"),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::apply_all_defaults;
    use crate::schema::{ChallengeConfig, InteractionTextsConfig, PollingConfig, ServerConfig};

    #[test]
    fn defaulted_config_is_valid() {
        let report = validate(&apply_all_defaults(VerilinkConfig::default()));
        assert!(report.is_valid(), "errors: {:?}", report.errors);
        assert!(report.warnings.is_empty(), "warnings: {:?}", report.warnings);
    }

    #[test]
    fn zero_interval_and_bucket_are_errors() {
        let cfg = VerilinkConfig {
            polling: Some(PollingConfig {
                interval_ms: Some(0),
                ..Default::default()
            }),
            challenge: Some(ChallengeConfig {
                bucket_secs: Some(0),
                base_url: Some("not a url".into()),
                ..Default::default()
            }),
            server: Some(ServerConfig {
                port: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let report = validate(&cfg);
        let paths: Vec<_> = report.errors.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"polling.intervalMs"));
        assert!(paths.contains(&"challenge.bucketSecs"));
        assert!(paths.contains(&"challenge.baseUrl"));
        assert!(paths.contains(&"server.port"));
    }

    #[test]
    fn timeout_shorter_than_interval_warns() {
        let cfg = VerilinkConfig {
            polling: Some(PollingConfig {
                interval_ms: Some(5_000),
                timeout_secs: Some(2),
                ..Default::default()
            }),
            ..Default::default()
        };
        let report = validate(&cfg);
        assert!(report.is_valid());
        assert_eq!(report.warnings[0].path, "polling.timeoutSecs");
    }

    #[test]
    fn overlong_device_text_is_error() {
        let cfg = VerilinkConfig {
            interactions: Some(InteractionTextsConfig {
                authentication_text: Some("x".repeat(61)),
                signature_text: None,
            }),
            ..Default::default()
        };
        let report = validate(&cfg);
        assert_eq!(report.errors[0].path, "interactions.authenticationText");
    }
}
