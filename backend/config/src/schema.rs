//! Typed configuration schema.
//!
//! Every field is optional so partial files parse; `apply_all_defaults`
//! fills the gaps and the accessors on [`VerilinkConfig`] fall back to the
//! same defaults when a section was never populated.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use verilink_core::{CertificateLevel, EndResult};

use crate::defaults::*;

/// Root configuration object (`config.yaml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerilinkConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,

    /// Remote identity provider connection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling: Option<PollingConfig>,

    /// Rolling challenge rendering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<ChallengeConfig>,

    /// Minimum certificate level per operation kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_levels: Option<CertificateLevelsConfig>,

    /// Text shown on the user's device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interactions: Option<InteractionTextsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing: Option<SigningConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Only `"simulator"` is wired today.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relying_party_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relying_party_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulator: Option<SimulatorSettings>,
}

/// Scripted behavior for the in-process provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatorSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete_after_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_result: Option<EndResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_level: Option<CertificateLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transient_failures: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub never_complete: Option<bool>,
}

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_polls: Option<usize>,
    /// Sessions older than this are evicted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_ttl_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter: Option<bool>,
}

// ---------------------------------------------------------------------------
// Challenge / flows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_module_px: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateLevelsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<CertificateLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_choice: Option<CertificateLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<CertificateLevel>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionTextsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningConfig {
    /// Where finalized containers are written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved accessors
// ---------------------------------------------------------------------------

impl VerilinkConfig {
    pub fn bind_address(&self) -> String {
        self.server
            .as_ref()
            .and_then(|s| s.bind.clone())
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
    }

    pub fn port(&self) -> u16 {
        self.server.as_ref().and_then(|s| s.port).unwrap_or(DEFAULT_PORT)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.polling
                .as_ref()
                .and_then(|p| p.interval_ms)
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        )
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(
            self.polling
                .as_ref()
                .and_then(|p| p.timeout_secs)
                .unwrap_or(DEFAULT_POLL_TIMEOUT_SECS),
        )
    }

    pub fn max_concurrent_polls(&self) -> usize {
        self.polling
            .as_ref()
            .and_then(|p| p.max_concurrent_polls)
            .unwrap_or(DEFAULT_MAX_CONCURRENT_POLLS)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(
            self.polling
                .as_ref()
                .and_then(|p| p.session_ttl_secs)
                .unwrap_or(DEFAULT_SESSION_TTL_SECS),
        )
    }

    pub fn retry(&self) -> RetryConfig {
        self.polling
            .as_ref()
            .and_then(|p| p.retry.clone())
            .unwrap_or_default()
    }

    pub fn challenge(&self) -> ChallengeConfig {
        self.challenge.clone().unwrap_or_default()
    }

    /// Minimum level for (authentication, certificate choice, signature).
    pub fn certificate_levels(&self) -> (CertificateLevel, CertificateLevel, CertificateLevel) {
        let levels = self.certificate_levels.clone().unwrap_or_default();
        (
            levels.authentication.unwrap_or(DEFAULT_CERTIFICATE_LEVEL),
            levels.certificate_choice.unwrap_or(DEFAULT_CERTIFICATE_LEVEL),
            levels.signature.unwrap_or(DEFAULT_CERTIFICATE_LEVEL),
        )
    }

    pub fn authentication_text(&self) -> String {
        self.interactions
            .as_ref()
            .and_then(|i| i.authentication_text.clone())
            .unwrap_or_else(|| DEFAULT_AUTHENTICATION_TEXT.to_string())
    }

    pub fn signature_text(&self) -> String {
        self.interactions
            .as_ref()
            .and_then(|i| i.signature_text.clone())
            .unwrap_or_else(|| DEFAULT_SIGNATURE_TEXT.to_string())
    }

    pub fn log_level(&self) -> String {
        self.logging
            .as_ref()
            .and_then(|l| l.level.clone())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
    }

    pub fn log_dir(&self) -> String {
        self.logging
            .as_ref()
            .and_then(|l| l.dir.clone())
            .unwrap_or_else(|| DEFAULT_LOG_DIR.to_string())
    }

    pub fn signing_output_dir(&self) -> String {
        self.signing
            .as_ref()
            .and_then(|s| s.output_dir.clone())
            .unwrap_or_else(|| DEFAULT_SIGNING_OUTPUT_DIR.to_string())
    }

    pub fn simulator(&self) -> SimulatorSettings {
        self.provider
            .as_ref()
            .and_then(|p| p.simulator.clone())
            .unwrap_or_default()
    }
}
