//! Gateway Health API

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::server::GatewayState;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: String,
    pub version: String,
    pub provider: String,
    /// Local sessions held, complete or not.
    pub active_sessions: usize,
    pub active_polls: usize,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

/// Handler for `GET /api/health`
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        provider: state.orchestrator.provider_name().to_string(),
        active_sessions: state.orchestrator.session_count(),
        active_polls: state.orchestrator.active_polls(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        timestamp: Utc::now(),
    })
}
