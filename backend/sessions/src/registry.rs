//! Session registry: at most one live poller per session key.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use verilink_core::SessionKey;

use crate::poller::{PollHandle, PollOutcome};

/// Result of a non-blocking registry lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollQuery {
    /// No poller is registered under the key (never started, or cancelled).
    Absent,
    /// A poller is registered and still working.
    NotReady,
    /// The poller finished with this outcome.
    Ready(PollOutcome),
}

/// Concurrent map from session key to its background poller.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    handles: Arc<DashMap<SessionKey, PollHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` under `key`, cancelling any poller it replaces.
    pub fn register(&self, key: impl Into<SessionKey>, handle: PollHandle) {
        let key = key.into();
        debug!(session_key = %key, remote_session_id = handle.remote_session_id(), "Registering poller");
        if let Some(previous) = self.handles.insert(key.clone(), handle) {
            if !previous.is_finished() {
                warn!(
                    session_key = %key,
                    remote_session_id = previous.remote_session_id(),
                    "Replacing a live poller"
                );
            }
            previous.cancel();
        }
    }

    /// Non-blocking status lookup. Reading a ready outcome does not consume it.
    pub fn query(&self, key: &str) -> PollQuery {
        match self.handles.get(key) {
            None => PollQuery::Absent,
            Some(handle) => match handle.outcome() {
                Some(outcome) => PollQuery::Ready(outcome),
                None => PollQuery::NotReady,
            },
        }
    }

    /// Cancel and forget the poller under `key`. Returns whether one existed.
    pub fn cancel(&self, key: &str) -> bool {
        match self.handles.remove(key) {
            Some((_, handle)) => {
                handle.cancel();
                debug!(session_key = %key, remote_session_id = handle.remote_session_id(), "Poller cancelled");
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.handles.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Number of registered pollers that have not finished yet.
    pub fn active_count(&self) -> usize {
        self.handles.iter().filter(|entry| !entry.value().is_finished()).count()
    }

    /// Cancel every registered poller. Used on shutdown.
    pub fn cancel_all(&self) {
        let keys: Vec<SessionKey> = self.handles.iter().map(|entry| entry.key().clone()).collect();
        for key in keys {
            self.cancel(&key);
        }
    }
}
