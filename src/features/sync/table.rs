//! The in-memory table of sync states.
//!
//! Holds at most one [`SyncState`] per local item and enforces that a
//! given `(module, crm id)` pair is claimed by at most one local item.
//! The table is a derived cache: the durable fields live as named
//! properties on the items themselves, and [`SyncStateTable::restore`]
//! rebuilds the table by re-scanning the store at startup.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::core::entity::CrmId;
use crate::core::item::{ItemId, ItemSnapshot, ItemStore};
use crate::error::CrmLinkError;
use crate::features::sync::state::{SyncState, TransmissionState};

/// Lock a shared table, translating a poisoned lock into an error.
///
/// # Errors
///
/// Returns [`CrmLinkError::Item`] if a thread panicked while holding the
/// lock.
pub fn lock_table(
    states: &Mutex<SyncStateTable>,
) -> Result<MutexGuard<'_, SyncStateTable>, CrmLinkError> {
    states
        .lock()
        .map_err(|_| CrmLinkError::Item("sync state table lock poisoned".to_string()))
}

/// Table of sync states, indexed by local item id and by CRM record.
#[derive(Debug, Default)]
pub struct SyncStateTable {
    by_local: HashMap<ItemId, SyncState>,
    by_crm: HashMap<(String, String), ItemId>,
}

impl SyncStateTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the table from the persisted links on local items.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be scanned or if two items
    /// claim the same CRM record.
    pub fn restore(store: &dyn ItemStore) -> Result<Self, CrmLinkError> {
        let mut table = Self::new();
        for id in store.list_ids()? {
            let snapshot = store.snapshot(&id)?;
            table.observe(&snapshot)?;
        }
        log::debug!("restored {} sync state(s) from item properties", table.len());
        Ok(table)
    }

    /// Number of tracked states.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_local.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_local.is_empty()
    }

    /// Look up the state for a local item.
    #[must_use]
    pub fn get(&self, local_id: &str) -> Option<&SyncState> {
        self.by_local.get(local_id)
    }

    /// Mutable lookup for a local item's state.
    pub fn get_mut(&mut self, local_id: &str) -> Option<&mut SyncState> {
        self.by_local.get_mut(local_id)
    }

    /// The local item holding a given CRM record, if any.
    #[must_use]
    pub fn find_by_crm(&self, module: &str, crm_id: &CrmId) -> Option<&ItemId> {
        self.by_crm
            .get(&(module.to_string(), crm_id.as_str().to_string()))
    }

    /// Iterate over all tracked states.
    pub fn iter(&self) -> impl Iterator<Item = &SyncState> {
        self.by_local.values()
    }

    /// Ensure a state exists for an observed item, creating one from the
    /// snapshot if this is the first observation.
    ///
    /// A snapshot with a persisted link produces a `Synced` state; one
    /// without produces a `New` state. Observing an already tracked item
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`CrmLinkError::DuplicateCrmId`] if the snapshot's link
    /// claims a CRM record already held by a different local item.
    pub fn observe(&mut self, snapshot: &ItemSnapshot) -> Result<(), CrmLinkError> {
        if self.by_local.contains_key(&snapshot.id) {
            return Ok(());
        }
        self.track(SyncState::from_snapshot(snapshot))
    }

    /// Insert a prepared state into the table.
    ///
    /// # Errors
    ///
    /// Returns [`CrmLinkError::Item`] if the local item is already
    /// tracked, or [`CrmLinkError::DuplicateCrmId`] if the state claims a
    /// CRM record already held by another item.
    pub fn track(&mut self, state: SyncState) -> Result<(), CrmLinkError> {
        if self.by_local.contains_key(state.local_id()) {
            return Err(CrmLinkError::Item(format!(
                "sync state for item {} already tracked",
                state.local_id()
            )));
        }

        if let (Some(module), Some(crm_id)) = (state.module(), state.crm_id()) {
            self.claim(module, crm_id, state.local_id())?;
        }
        self.by_local.insert(state.local_id().to_string(), state);
        Ok(())
    }

    /// Record a completed transmission for a local item, updating both
    /// the state record and the CRM index.
    ///
    /// # Errors
    ///
    /// Returns [`CrmLinkError::Item`] if the item is untracked,
    /// [`CrmLinkError::DuplicateCrmId`] if the record id is held by
    /// another item, or [`CrmLinkError::BadStateTransition`] if the state
    /// is not `Queued`.
    pub fn complete_transmission(
        &mut self,
        local_id: &str,
        crm_id: CrmId,
        module: &str,
        modified_at: DateTime<Utc>,
    ) -> Result<(), CrmLinkError> {
        // Validate both preconditions before touching either index, so a
        // rejected call leaves the table fully unchanged.
        let state = self.by_local.get(local_id).ok_or_else(|| {
            CrmLinkError::Item(format!("no sync state tracked for item {local_id}"))
        })?;
        if state.state() != TransmissionState::Queued {
            return Err(CrmLinkError::BadStateTransition {
                from: state.state(),
                to: TransmissionState::Synced,
            });
        }

        self.claim(module, &crm_id, local_id)?;
        if let Some(state) = self.by_local.get_mut(local_id) {
            state.complete_transmission(crm_id, module, modified_at)?;
        }
        Ok(())
    }

    /// Give up on a queued first push, returning the item to `New`.
    ///
    /// # Errors
    ///
    /// Returns [`CrmLinkError::Item`] if the item is untracked, or
    /// [`CrmLinkError::BadStateTransition`] if the state machine forbids
    /// the revert.
    pub fn revert_to_new(&mut self, local_id: &str) -> Result<(), CrmLinkError> {
        let state = self.by_local.get_mut(local_id).ok_or_else(|| {
            CrmLinkError::Item(format!("no sync state tracked for item {local_id}"))
        })?;
        state.revert_to_new()
    }

    /// Remove a local item's state, releasing its CRM record claim.
    pub fn remove(&mut self, local_id: &str) -> Option<SyncState> {
        let state = self.by_local.remove(local_id)?;
        if let (Some(module), Some(crm_id)) = (state.module(), state.crm_id()) {
            self.by_crm
                .remove(&(module.to_string(), crm_id.as_str().to_string()));
        }
        Some(state)
    }

    /// Claim a CRM record for a local item, rejecting a second claimant.
    fn claim(&mut self, module: &str, crm_id: &CrmId, local_id: &str) -> Result<(), CrmLinkError> {
        let key = (module.to_string(), crm_id.as_str().to_string());
        if let Some(holder) = self.by_crm.get(&key) {
            if holder != local_id {
                return Err(CrmLinkError::DuplicateCrmId {
                    module: module.to_string(),
                    id: crm_id.as_str().to_string(),
                });
            }
        }
        self.by_crm.insert(key, local_id.to_string());
        Ok(())
    }
}
