//! Flow orchestration: starting operations, driving them to completion, and
//! releasing validated results.

pub mod nonce;
pub mod orchestrator;
pub mod store;
pub mod validator;

pub use nonce::generate_nonce;
pub use orchestrator::{ChallengeView, FlowOrchestrator, FlowSettings, StartRequest, StartedFlow};
pub use store::{LocalSessionStore, SessionCell};
pub use validator::{check_end_result, ResultValidator};
