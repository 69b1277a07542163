//! `verilink status`: query a running server's health endpoint.

use anyhow::{Context, Result};

use verilink_gateway::HealthReport;

use crate::terminal_output::{note_error, note_success, render_pairs};

pub async fn run(port: u16) -> Result<()> {
    let url = format!("http://localhost:{port}/api/health");
    let response = match reqwest::Client::new().get(&url).send().await {
        Ok(response) => response,
        Err(_) => {
            note_error(&format!("verilink is not running on port {port}"));
            return Ok(());
        }
    };

    let report: HealthReport = response
        .error_for_status()
        .context("Health endpoint returned an error")?
        .json()
        .await
        .context("Failed to decode health report")?;

    note_success(&format!("verilink {} is {}", report.version, report.status));
    print!(
        "{}",
        render_pairs(&[
            ("Provider", report.provider),
            ("Sessions", report.active_sessions.to_string()),
            ("Active polls", report.active_polls.to_string()),
            ("Uptime", format!("{}s", report.uptime_seconds)),
        ])
    );
    Ok(())
}
