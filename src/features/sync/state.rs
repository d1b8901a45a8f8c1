//! The per-item transmission state machine.
//!
//! Each synchronized local item owns exactly one [`SyncState`] describing
//! its relationship to the remote CRM. All mutation goes through guarded
//! transition operations backed by a single legality check; an operation
//! invoked in the wrong state fails with
//! [`CrmLinkError::BadStateTransition`] and leaves the record untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::CrmId;
use crate::core::item::{ItemId, ItemLink, ItemSnapshot};
use crate::error::CrmLinkError;

/// Where an item stands in the transmission lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransmissionState {
    /// Local-only, never sent to the CRM.
    New,
    /// An outbound or inbound action for this item is pending on the queue.
    Queued,
    /// Local item and remote record agree as of the recorded
    /// modification time.
    Synced,
    /// The local item was deleted; the state is about to be removed.
    PendingDelete,
    /// Sentinel for diagnostics only. No legal transition enters or
    /// leaves this state.
    Invalid,
}

impl TransmissionState {
    /// Lowercase display name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Queued => "queued",
            Self::Synced => "synced",
            Self::PendingDelete => "pending_delete",
            Self::Invalid => "invalid",
        }
    }
}

impl std::fmt::Display for TransmissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Whether the state machine permits moving from `from` to `to`.
///
/// This is the single source of truth for legality; every guarded
/// operation goes through it.
const fn allowed(from: TransmissionState, to: TransmissionState) -> bool {
    use TransmissionState::{New, PendingDelete, Queued, Synced};

    matches!(
        (from, to),
        (New, Queued)
            | (Queued, Synced)
            | (Synced, Queued)
            | (Queued, New)
            | (New | Queued | Synced, PendingDelete)
    )
}

/// The relationship between one local item and at most one remote record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncState {
    local_id: ItemId,
    crm_id: Option<CrmId>,
    module: Option<String>,
    modified_at: DateTime<Utc>,
    state: TransmissionState,
}

impl SyncState {
    /// State for a freshly observed item that has never been transmitted.
    #[must_use]
    pub const fn fresh(local_id: ItemId, modified_at: DateTime<Utc>) -> Self {
        Self {
            local_id,
            crm_id: None,
            module: None,
            modified_at,
            state: TransmissionState::New,
        }
    }

    /// State for a freshly observed item carrying a persisted CRM link.
    #[must_use]
    pub fn linked(local_id: ItemId, link: &ItemLink) -> Self {
        Self {
            local_id,
            crm_id: Some(link.crm_id.clone()),
            module: Some(link.module.clone()),
            modified_at: link.modified_at,
            state: TransmissionState::Synced,
        }
    }

    /// State derived from a producer's snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: &ItemSnapshot) -> Self {
        snapshot.link.as_ref().map_or_else(
            || Self::fresh(snapshot.id.clone(), snapshot.modified_at),
            |link| Self::linked(snapshot.id.clone(), link),
        )
    }

    /// The local item id this state belongs to.
    #[must_use]
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// The linked remote record id, if one was ever assigned.
    #[must_use]
    pub const fn crm_id(&self) -> Option<&CrmId> {
        self.crm_id.as_ref()
    }

    /// The CRM module of the linked record, if one was ever assigned.
    #[must_use]
    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    /// The modification time both sides last agreed on.
    #[must_use]
    pub const fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    /// The current transmission state.
    #[must_use]
    pub const fn state(&self) -> TransmissionState {
        self.state
    }

    /// Human-readable description for diagnostics.
    #[must_use]
    pub fn description(&self) -> String {
        match (&self.module, &self.crm_id) {
            (Some(module), Some(id)) => {
                format!("item {} -> {module}/{id} [{}]", self.local_id, self.state)
            }
            _ => format!("item {} [{}]", self.local_id, self.state),
        }
    }

    /// Central transition: move to `to` if the machine allows it.
    fn transition(&mut self, to: TransmissionState) -> Result<(), CrmLinkError> {
        if allowed(self.state, to) {
            self.state = to;
            Ok(())
        } else {
            Err(CrmLinkError::BadStateTransition {
                from: self.state,
                to,
            })
        }
    }

    /// Reject the operation outright, reporting the state it required.
    const fn refuse(&self, to: TransmissionState) -> CrmLinkError {
        CrmLinkError::BadStateTransition {
            from: self.state,
            to,
        }
    }

    /// Mark a never-transmitted item as queued for its first push.
    ///
    /// # Errors
    ///
    /// Returns `BadStateTransition` unless the item is in `New`.
    pub fn begin_transmit_new(&mut self) -> Result<(), CrmLinkError> {
        if self.state != TransmissionState::New {
            return Err(self.refuse(TransmissionState::Queued));
        }
        self.transition(TransmissionState::Queued)
    }

    /// Mark a previously synchronized item as queued for an update push.
    ///
    /// # Errors
    ///
    /// Returns `BadStateTransition` unless the item is in `Synced`.
    pub fn begin_transmit_update(&mut self) -> Result<(), CrmLinkError> {
        if self.state != TransmissionState::Synced {
            return Err(self.refuse(TransmissionState::Queued));
        }
        self.transition(TransmissionState::Queued)
    }

    /// Mark a previously synchronized item as queued for a pull from the
    /// remote side.
    ///
    /// # Errors
    ///
    /// Returns `BadStateTransition` unless the item is in `Synced`.
    pub fn begin_pull(&mut self) -> Result<(), CrmLinkError> {
        if self.state != TransmissionState::Synced {
            return Err(self.refuse(TransmissionState::Queued));
        }
        self.transition(TransmissionState::Queued)
    }

    /// Record a successful transmission: the item and the remote record
    /// now agree as of `modified_at`, under the given id and module.
    ///
    /// # Errors
    ///
    /// Returns `BadStateTransition` unless the item is in `Queued`.
    pub fn complete_transmission(
        &mut self,
        crm_id: CrmId,
        module: impl Into<String>,
        modified_at: DateTime<Utc>,
    ) -> Result<(), CrmLinkError> {
        if self.state != TransmissionState::Queued {
            return Err(self.refuse(TransmissionState::Synced));
        }
        self.transition(TransmissionState::Synced)?;
        self.crm_id = Some(crm_id);
        self.module = Some(module.into());
        self.modified_at = modified_at;
        Ok(())
    }

    /// Give up on a queued first push: the item returns to `New`.
    ///
    /// Only legal for items that were never assigned a remote id; an item
    /// with a remote record cannot pretend it was never transmitted.
    ///
    /// # Errors
    ///
    /// Returns `BadStateTransition` if the item is not in `Queued` or
    /// already carries a remote id.
    pub fn revert_to_new(&mut self) -> Result<(), CrmLinkError> {
        if self.state != TransmissionState::Queued || self.crm_id.is_some() {
            return Err(self.refuse(TransmissionState::New));
        }
        self.transition(TransmissionState::New)
    }

    /// The local item was deleted; the state is on its way out.
    ///
    /// # Errors
    ///
    /// Returns `BadStateTransition` if the item is already pending
    /// deletion or in the `Invalid` sentinel.
    pub fn mark_pending_delete(&mut self) -> Result<(), CrmLinkError> {
        self.transition(TransmissionState::PendingDelete)
    }
}
