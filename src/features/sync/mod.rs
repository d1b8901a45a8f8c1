//! Per-item synchronization state and the reconciliation algorithm.
//!
//! This module provides:
//! - The transmission state machine tracking the relationship between one
//!   local item and at most one remote CRM record
//! - The state table enforcing the one-state-per-item and
//!   one-item-per-CRM-record invariants
//! - The synchroniser, which decides what must be pushed, pulled, or is
//!   already consistent for a batch of local items and remote entries

pub mod state;
pub mod synchroniser;
pub mod table;

pub use state::{SyncState, TransmissionState};
pub use synchroniser::Synchroniser;
pub use table::{lock_table, SyncStateTable};
