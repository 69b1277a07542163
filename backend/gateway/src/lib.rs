//! `verilink-gateway` — HTTP surface over the flow orchestrator.

pub mod api;
pub mod error;
pub mod health;
pub mod server;

pub use error::{status_for, ApiError};
pub use health::HealthReport;
pub use server::{router, start_server, GatewayState};
