//! Bounded worker pool for background polls.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Runs poll tasks on the shared tokio runtime, at most `capacity` at a time.
///
/// Tasks beyond capacity wait for a permit; a task cancelled while waiting
/// never starts.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of tasks currently holding a permit.
    pub fn busy(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    /// Spawn `task` once a permit is free. Must be called inside a tokio runtime.
    pub fn spawn<F>(&self, cancel: CancellationToken, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            let _permit = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Poll task cancelled before it was scheduled");
                    return;
                }
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };
            task.await;
        })
    }

    /// Like [`spawn`](Self::spawn), but gives up waiting for a permit at
    /// `deadline` and runs `expired` instead of `task`.
    pub fn spawn_until<F, E>(
        &self,
        cancel: CancellationToken,
        deadline: Instant,
        task: F,
        expired: E,
    ) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
        E: FnOnce() + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            let _permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Poll task cancelled before it was scheduled");
                    return;
                }
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
                _ = tokio::time::sleep_until(deadline) => {
                    debug!("Poll task expired while queued");
                    expired();
                    return;
                }
            };
            task.await;
        })
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(64)
    }
}
