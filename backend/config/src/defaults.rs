//! Config defaults: applies default values to parsed config.

use verilink_core::CertificateLevel;

use crate::schema::{
    CertificateLevelsConfig, ChallengeConfig, InteractionTextsConfig, LoggingConfig,
    PollingConfig, RetryConfig, ServerConfig, SigningConfig, VerilinkConfig,
};

pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_CONCURRENT_POLLS: usize = 64;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 600;

pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;
pub const DEFAULT_RETRY_BACKOFF_FACTOR: f64 = 2.0;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 5_000;

pub const DEFAULT_CHALLENGE_BASE_URL: &str = "https://smart-id.com/device-link/";
pub const DEFAULT_CHALLENGE_BUCKET_SECS: u64 = 1;
pub const DEFAULT_CHALLENGE_LANG: &str = "eng";
pub const DEFAULT_QR_MODULE_PX: u32 = 6;

pub const DEFAULT_CERTIFICATE_LEVEL: CertificateLevel = CertificateLevel::Qualified;
pub const DEFAULT_AUTHENTICATION_TEXT: &str = "Log in to verilink?";
pub const DEFAULT_SIGNATURE_TEXT: &str = "Sign the uploaded document?";

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_SIGNING_OUTPUT_DIR: &str = "signed";

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: VerilinkConfig) -> VerilinkConfig {
    let config = apply_server_defaults(config);
    let config = apply_polling_defaults(config);
    let config = apply_challenge_defaults(config);
    let config = apply_flow_defaults(config);
    apply_output_defaults(config)
}

fn apply_server_defaults(mut config: VerilinkConfig) -> VerilinkConfig {
    let server = config.server.get_or_insert_with(ServerConfig::default);
    server.bind.get_or_insert_with(|| DEFAULT_BIND.to_string());
    server.port.get_or_insert(DEFAULT_PORT);
    config
}

/// Poll cadence, concurrency bound and retry policy.
fn apply_polling_defaults(mut config: VerilinkConfig) -> VerilinkConfig {
    let polling = config.polling.get_or_insert_with(PollingConfig::default);
    polling.interval_ms.get_or_insert(DEFAULT_POLL_INTERVAL_MS);
    polling.timeout_secs.get_or_insert(DEFAULT_POLL_TIMEOUT_SECS);
    polling
        .max_concurrent_polls
        .get_or_insert(DEFAULT_MAX_CONCURRENT_POLLS);
    polling.session_ttl_secs.get_or_insert(DEFAULT_SESSION_TTL_SECS);

    let retry = polling.retry.get_or_insert_with(RetryConfig::default);
    retry.max_attempts.get_or_insert(DEFAULT_RETRY_MAX_ATTEMPTS);
    retry.base_delay_ms.get_or_insert(DEFAULT_RETRY_BASE_DELAY_MS);
    retry.backoff_factor.get_or_insert(DEFAULT_RETRY_BACKOFF_FACTOR);
    retry.max_delay_ms.get_or_insert(DEFAULT_RETRY_MAX_DELAY_MS);
    retry.jitter.get_or_insert(true);
    config
}

fn apply_challenge_defaults(mut config: VerilinkConfig) -> VerilinkConfig {
    let challenge = config.challenge.get_or_insert_with(ChallengeConfig::default);
    challenge
        .base_url
        .get_or_insert_with(|| DEFAULT_CHALLENGE_BASE_URL.to_string());
    challenge.bucket_secs.get_or_insert(DEFAULT_CHALLENGE_BUCKET_SECS);
    challenge
        .lang
        .get_or_insert_with(|| DEFAULT_CHALLENGE_LANG.to_string());
    challenge.qr_module_px.get_or_insert(DEFAULT_QR_MODULE_PX);
    config
}

/// Certificate levels and device texts.
fn apply_flow_defaults(mut config: VerilinkConfig) -> VerilinkConfig {
    let levels = config
        .certificate_levels
        .get_or_insert_with(CertificateLevelsConfig::default);
    levels.authentication.get_or_insert(DEFAULT_CERTIFICATE_LEVEL);
    levels.certificate_choice.get_or_insert(DEFAULT_CERTIFICATE_LEVEL);
    levels.signature.get_or_insert(DEFAULT_CERTIFICATE_LEVEL);

    let texts = config
        .interactions
        .get_or_insert_with(InteractionTextsConfig::default);
    texts
        .authentication_text
        .get_or_insert_with(|| DEFAULT_AUTHENTICATION_TEXT.to_string());
    texts
        .signature_text
        .get_or_insert_with(|| DEFAULT_SIGNATURE_TEXT.to_string());
    config
}

fn apply_output_defaults(mut config: VerilinkConfig) -> VerilinkConfig {
    let logging = config.logging.get_or_insert_with(LoggingConfig::default);
    logging.level.get_or_insert_with(|| DEFAULT_LOG_LEVEL.to_string());
    logging.dir.get_or_insert_with(|| DEFAULT_LOG_DIR.to_string());

    let signing = config.signing.get_or_insert_with(SigningConfig::default);
    signing
        .output_dir
        .get_or_insert_with(|| DEFAULT_SIGNING_OUTPUT_DIR.to_string());
    config
}
