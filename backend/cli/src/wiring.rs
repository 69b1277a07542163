//! Builds runtime components from the loaded configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use verilink_challenge::{ChallengeRenderer, RendererConfig};
use verilink_config::VerilinkConfig;
use verilink_flows::{FlowOrchestrator, FlowSettings};
use verilink_sessions::{PollerConfig, RetryPolicy, WorkerPool};
use verilink_simulator::{DigestContainerService, SimulatedProvider, SimulatorConfig};

pub fn poller_config(config: &VerilinkConfig) -> PollerConfig {
    let retry = config.retry();
    let fallback = RetryPolicy::default();
    PollerConfig {
        interval: config.poll_interval(),
        timeout: config.poll_timeout(),
        retry: RetryPolicy {
            max_attempts: retry.max_attempts.unwrap_or(fallback.max_attempts),
            base_delay_ms: retry.base_delay_ms.unwrap_or(fallback.base_delay_ms),
            backoff_factor: retry.backoff_factor.unwrap_or(fallback.backoff_factor),
            max_delay_ms: retry.max_delay_ms.unwrap_or(fallback.max_delay_ms),
            jitter: retry.jitter.unwrap_or(fallback.jitter),
        },
    }
}

pub fn renderer_config(config: &VerilinkConfig) -> RendererConfig {
    let challenge = config.challenge();
    let fallback = RendererConfig::default();
    RendererConfig {
        base_url: challenge.base_url.unwrap_or(fallback.base_url),
        bucket: challenge
            .bucket_secs
            .map(Duration::from_secs)
            .unwrap_or(fallback.bucket),
        lang: challenge.lang.unwrap_or(fallback.lang),
        qr_module_px: challenge.qr_module_px.unwrap_or(fallback.qr_module_px),
    }
}

pub fn flow_settings(config: &VerilinkConfig) -> FlowSettings {
    let (authentication_level, certificate_choice_level, signature_level) =
        config.certificate_levels();
    FlowSettings {
        authentication_level,
        certificate_choice_level,
        signature_level,
        authentication_text: config.authentication_text(),
        signature_text: config.signature_text(),
    }
}

pub fn simulator_config(config: &VerilinkConfig) -> SimulatorConfig {
    let settings = config.simulator();
    let mut simulator = SimulatorConfig::default();
    if let Some(ms) = settings.complete_after_ms {
        simulator = simulator.with_complete_after(Duration::from_millis(ms));
    }
    if let Some(end_result) = settings.end_result {
        simulator = simulator.with_end_result(end_result);
    }
    if let Some(level) = settings.certificate_level {
        simulator = simulator.with_certificate_level(level);
    }
    if let Some(count) = settings.transient_failures {
        simulator = simulator.with_transient_failures(count);
    }
    if settings.never_complete == Some(true) {
        simulator = simulator.with_never_complete();
    }
    simulator
}

/// Wire the simulated provider, container service and orchestrator.
pub fn build_orchestrator(config: &VerilinkConfig) -> Result<FlowOrchestrator> {
    let renderer =
        ChallengeRenderer::new(renderer_config(config)).context("Invalid challenge settings")?;
    let provider = Arc::new(SimulatedProvider::new(simulator_config(config)));
    let container = Arc::new(DigestContainerService::new(config.signing_output_dir()));
    let pool = WorkerPool::new(config.max_concurrent_polls());

    info!(
        provider = "simulator",
        max_concurrent_polls = pool.capacity(),
        output_dir = %config.signing_output_dir(),
        "Wiring flow orchestrator"
    );

    Ok(FlowOrchestrator::new(
        provider,
        container,
        pool,
        poller_config(config),
        renderer,
        flow_settings(config),
    ))
}
