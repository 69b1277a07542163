//! Background status polling for one remote session.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use verilink_core::{IdentityProvider, ProviderError, SessionResult, TerminalStatus};

use crate::pool::WorkerPool;
use crate::retry::{RetryPolicy, RetryState};

/// Poll cadence and limits.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Pause between two `RUNNING` responses.
    pub interval: Duration,
    /// Overall budget for one remote session.
    pub timeout: Duration,
    /// Backoff for transient transport failures.
    pub retry: RetryPolicy,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1_000),
            timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
        }
    }
}

/// How a background poll ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The provider reported a complete session.
    Completed(SessionResult),
    /// The overall budget ran out before completion.
    TimedOut,
    /// A permanent provider error, or transient errors beyond the retry budget.
    Failed(ProviderError),
}

/// Owner-side handle on a running poll task.
///
/// Dropping the handle cancels the task.
pub struct PollHandle {
    remote_session_id: String,
    cancel: CancellationToken,
    outcome: Arc<OnceLock<PollOutcome>>,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn remote_session_id(&self) -> &str {
        &self.remote_session_id
    }

    /// The terminal outcome, once the task has produced one.
    pub fn outcome(&self) -> Option<PollOutcome> {
        self.outcome.get().cloned()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.get().is_some() || self.task.is_finished()
    }

    /// Request cooperative cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for PollHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollHandle")
            .field("remote_session_id", &self.remote_session_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Spawns poll tasks against an identity provider.
#[derive(Clone)]
pub struct Poller {
    provider: Arc<dyn IdentityProvider>,
    pool: WorkerPool,
    config: PollerConfig,
}

impl Poller {
    pub fn new(provider: Arc<dyn IdentityProvider>, pool: WorkerPool, config: PollerConfig) -> Self {
        Self {
            provider,
            pool,
            config,
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Start polling `remote_session_id` in the background.
    ///
    /// The timeout budget starts now, so time spent queued for a pool
    /// permit counts against it.
    pub fn spawn(&self, remote_session_id: impl Into<String>) -> PollHandle {
        let remote_session_id = remote_session_id.into();
        let cancel = CancellationToken::new();
        let outcome = Arc::new(OnceLock::new());
        let deadline = Instant::now() + self.config.timeout;

        let expired = {
            let slot = Arc::clone(&outcome);
            let id = remote_session_id.clone();
            move || {
                warn!(remote_session_id = %id, "Remote session timed out waiting for a poll worker");
                let _ = slot.set(PollOutcome::TimedOut);
            }
        };

        let task = {
            let provider = Arc::clone(&self.provider);
            let config = self.config.clone();
            let run_cancel = cancel.clone();
            let slot = Arc::clone(&outcome);
            let id = remote_session_id.clone();
            let run = async move {
                let Some(result) =
                    poll_until_terminal(provider.as_ref(), &id, &config, deadline, &run_cancel).await
                else {
                    debug!(remote_session_id = %id, "Poll task cancelled");
                    return;
                };
                if run_cancel.is_cancelled() {
                    debug!(remote_session_id = %id, "Discarding outcome of cancelled poll");
                    return;
                }
                match &result {
                    PollOutcome::Completed(r) => {
                        info!(remote_session_id = %id, end_result = ?r.end_result, "Remote session complete")
                    }
                    PollOutcome::TimedOut => warn!(remote_session_id = %id, "Remote session timed out"),
                    PollOutcome::Failed(e) => warn!(remote_session_id = %id, error = %e, "Polling failed"),
                }
                let _ = slot.set(result);
            };
            self.pool.spawn_until(cancel.clone(), deadline, run, expired)
        };

        debug!(remote_session_id = %remote_session_id, provider = self.provider.name(), "Poll task spawned");
        PollHandle {
            remote_session_id,
            cancel,
            outcome,
            task,
        }
    }
}

/// Returns `None` when cancelled.
async fn poll_until_terminal(
    provider: &dyn IdentityProvider,
    remote_session_id: &str,
    config: &PollerConfig,
    deadline: Instant,
    cancel: &CancellationToken,
) -> Option<PollOutcome> {
    let mut retry = RetryState::default();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Some(PollOutcome::TimedOut);
        }

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            fetched = tokio::time::timeout(remaining, provider.fetch_status(remote_session_id)) => fetched,
        };

        let wait = match fetched {
            Err(_) => return Some(PollOutcome::TimedOut),
            Ok(Ok(TerminalStatus::Complete(result))) => return Some(PollOutcome::Completed(result)),
            Ok(Ok(TerminalStatus::Running)) => {
                retry.reset();
                config.interval
            }
            Ok(Err(err)) if err.is_transient() => {
                match retry.record_failure(&config.retry, &err.to_string()) {
                    Some(delay) => delay,
                    None => return Some(PollOutcome::Failed(err)),
                }
            }
            Ok(Err(err)) => return Some(PollOutcome::Failed(err)),
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(wait.min(remaining)) => {}
        }
    }
}
