//! The action queue shared between producers and the worker.
//!
//! An unbounded, thread-safe FIFO. Producers only ever append, so an
//! enqueue never blocks on network I/O happening inside the worker; the
//! worker owns dequeued actions outright and pushes failed ones back at
//! the tail, so one slow or failing action cannot starve the rest of a
//! pass.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use crate::features::tasks::action::SyncAction;

/// Cloneable handle to the shared action queue.
#[derive(Clone, Default)]
pub struct TaskQueue {
    inner: Arc<Mutex<VecDeque<SyncAction>>>,
}

impl TaskQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<SyncAction>> {
        // A poisoned queue still holds valid actions; recover the data.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an action at the tail. Callable from any thread; never
    /// blocks on the worker.
    pub fn enqueue(&self, action: SyncAction) {
        log::debug!("queued: {}", action.description());
        self.lock().push_back(action);
    }

    /// Append several actions at once.
    pub fn enqueue_all(&self, actions: impl IntoIterator<Item = SyncAction>) {
        let mut queue = self.lock();
        for action in actions {
            log::debug!("queued: {}", action.description());
            queue.push_back(action);
        }
    }

    /// Take the action at the head, transferring ownership to the caller.
    /// Worker side only.
    #[must_use]
    pub fn dequeue(&self) -> Option<SyncAction> {
        self.lock().pop_front()
    }

    /// Push a failed action back at the tail for a later attempt.
    pub fn requeue(&self, action: SyncAction) {
        self.lock().push_back(action);
    }

    /// Number of actions currently waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
