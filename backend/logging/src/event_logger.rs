//! Flow lifecycle events, written under the `flow_events` target.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::redact::redact_sensitive_data;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum FlowEvent {
    Started {
        kind: String,
        mode: String,
        remote_session_id: String,
    },
    CertificateChosen {
        document_number: String,
    },
    Completed {
        kind: String,
    },
    Failed {
        kind: String,
        error_kind: String,
        message: String,
    },
    Cancelled,
}

impl FlowEvent {
    fn redacted(self) -> Self {
        match self {
            Self::CertificateChosen { document_number } => Self::CertificateChosen {
                document_number: redact_sensitive_data(&document_number),
            },
            Self::Failed {
                kind,
                error_kind,
                message,
            } => Self::Failed {
                kind,
                error_kind,
                message: redact_sensitive_data(&message),
            },
            other => other,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FlowEventEntry {
    pub session_key: String,
    pub timestamp: DateTime<Utc>,
    pub event: FlowEvent,
}

pub struct FlowEventLogger;

impl FlowEventLogger {
    /// Log a lifecycle event for `session_key` with sensitive fields redacted.
    pub fn log(session_key: &str, event: FlowEvent) -> FlowEventEntry {
        let entry = FlowEventEntry {
            session_key: session_key.into(),
            timestamp: Utc::now(),
            event: event.redacted(),
        };
        info!(target: "flow_events", event = ?entry, "Flow event");
        entry
    }
}
