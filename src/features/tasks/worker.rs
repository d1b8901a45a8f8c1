//! The background worker draining the task queue.
//!
//! Exactly one worker thread consumes the queue, one action per tick.
//! Because no action ever runs concurrently with another, state mutations
//! inside `perform` need no locking beyond the state table's own mutex.
//! Shutdown is cooperative: the poll interval is shortened so the queue
//! drains quickly, and the outstanding count is reported so the host can
//! decide how long to wait.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::settings::QueueConfig;
use crate::engine::EngineContext;
use crate::error::CrmLinkError;
use crate::features::tasks::queue::TaskQueue;

/// Timing configuration for the worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Tick period during normal operation.
    pub poll_interval: Duration,
    /// Tick period once shutdown has been requested.
    pub drain_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2000),
            drain_interval: Duration::from_millis(200),
        }
    }
}

impl From<&QueueConfig> for WorkerConfig {
    fn from(config: &QueueConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            drain_interval: Duration::from_millis(config.drain_interval_ms),
        }
    }
}

/// What one tick did with the head of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    /// The action succeeded and was discarded.
    Completed,
    /// The action failed and went back to the tail.
    Requeued,
    /// The action was dropped permanently.
    Dropped,
}

/// Dequeue and perform at most one action.
///
/// Returns `None` when the queue was empty.
pub(crate) fn process_next(queue: &TaskQueue, ctx: &EngineContext) -> Option<TickOutcome> {
    let mut action = queue.dequeue()?;

    match action.perform(ctx) {
        Ok(()) => {
            log::info!("completed: {}", action.description());
            Some(TickOutcome::Completed)
        }
        Err(e) if e.is_invariant_violation() => {
            // A bug in the reconciliation logic, not a transient fault.
            // Retrying cannot help and the user cannot act on it.
            log::error!(
                "invariant violation while performing '{}': {e}",
                action.description()
            );
            Some(TickOutcome::Dropped)
        }
        Err(e) => {
            action.record_failure();
            if action.has_attempts_left() {
                log::warn!(
                    "attempt {}/{} failed for '{}': {e}",
                    action.attempts(),
                    action.max_attempts(),
                    action.description()
                );
                queue.requeue(action);
                Some(TickOutcome::Requeued)
            } else {
                log::error!(
                    "giving up on '{}' after {} attempt(s): {e}",
                    action.description(),
                    action.attempts()
                );
                action.abandon(ctx);
                Some(TickOutcome::Dropped)
            }
        }
    }
}

/// Handle to the single background worker thread.
pub struct BackgroundWorker {
    queue: TaskQueue,
    poll_ms: Arc<AtomicU64>,
    drain_ms: u64,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundWorker {
    /// Spawn the worker thread over the given queue and collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to spawn the thread.
    pub fn spawn(
        queue: TaskQueue,
        ctx: Arc<EngineContext>,
        config: WorkerConfig,
    ) -> Result<Self, CrmLinkError> {
        let poll_ms = Arc::new(AtomicU64::new(ms(config.poll_interval)));
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let queue = queue.clone();
            let poll_ms = poll_ms.clone();
            let stop = stop.clone();
            std::thread::Builder::new()
                .name("crmlink-worker".to_string())
                .spawn(move || run_loop(&queue, &ctx, &poll_ms, &stop))?
        };

        Ok(Self {
            queue,
            poll_ms,
            drain_ms: ms(config.drain_interval),
            stop,
            handle: Some(handle),
        })
    }

    /// The queue this worker drains.
    #[must_use]
    pub const fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Shorten the poll interval to drain the queue quickly, returning
    /// the number of actions still outstanding so the host can decide
    /// whether to wait.
    pub fn prepare_shutdown(&self) -> usize {
        self.poll_ms.store(self.drain_ms, Ordering::Relaxed);
        let outstanding = self.queue.len();
        log::info!("shutdown requested, {outstanding} action(s) outstanding");
        outstanding
    }

    /// Stop the worker and wait for its thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("background worker thread panicked");
            }
        }
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn run_loop(
    queue: &TaskQueue,
    ctx: &Arc<EngineContext>,
    poll_ms: &Arc<AtomicU64>,
    stop: &Arc<AtomicBool>,
) {
    log::debug!("background worker started");
    while !stop.load(Ordering::Relaxed) {
        process_next(queue, ctx);
        std::thread::sleep(Duration::from_millis(poll_ms.load(Ordering::Relaxed)));
    }
    log::debug!("background worker stopped");
}
