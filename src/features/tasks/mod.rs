//! The background task engine.
//!
//! Producers enqueue retryable actions from any thread; a single
//! dedicated worker dequeues one action per tick, performs it, and
//! re-queues it on failure until its attempt budget runs out.

pub mod action;
pub mod queue;
pub mod worker;

pub use action::{ActionKind, SyncAction};
pub use queue::TaskQueue;
pub use worker::{BackgroundWorker, WorkerConfig};
