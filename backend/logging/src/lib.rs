//! Logging for verilink.
//!
//! Subscriber setup with console and rolling JSON file output, redaction of
//! identity numbers and session secrets, and structured flow lifecycle events.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{FlowEvent, FlowEventEntry, FlowEventLogger};
pub use logger::init_logger;
pub use redact::redact_sensitive_data;
