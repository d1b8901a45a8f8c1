//! Local-side contracts: groupware items and their property storage.
//!
//! The engine never owns item representations. It sees a snapshot of what a
//! producer observed (id, kind, modification time, any persisted CRM link)
//! and talks to the client through the [`ItemStore`] trait. The durable
//! fields of a sync record are persisted as named properties on the item
//! itself, so reconciliation state survives process restarts without a
//! separate database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::{CrmId, RemoteEntry};
use crate::error::CrmLinkError;

/// Locally-stable item identifier assigned by the groupware client.
pub type ItemId = String;

/// Named property under which the linked CRM record id is stored.
pub const PROP_CRM_ID: &str = "crmlink.entry_id";
/// Named property under which the linked CRM module is stored.
pub const PROP_CRM_MODULE: &str = "crmlink.module";
/// Named property under which the last agreed modification time is stored.
pub const PROP_CRM_MODIFIED: &str = "crmlink.modified";

/// The kinds of groupware items the engine reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// An email message.
    Mail,
    /// An address-book contact.
    Contact,
    /// A calendar appointment or meeting.
    Appointment,
    /// A to-do task.
    Task,
}

impl ItemKind {
    /// Display name for logs and action descriptions.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Mail => "mail",
            Self::Contact => "contact",
            Self::Appointment => "appointment",
            Self::Task => "task",
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// The persisted link between a local item and its CRM record.
///
/// Stored as named properties on the item itself ([`PROP_CRM_ID`],
/// [`PROP_CRM_MODULE`], [`PROP_CRM_MODIFIED`]); the in-memory state table
/// is only a derived cache of these fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemLink {
    /// Linked CRM record id.
    pub crm_id: CrmId,
    /// CRM module of the linked record.
    pub module: String,
    /// Modification time both sides agreed on at the last transmission.
    pub modified_at: DateTime<Utc>,
}

/// What a producer observed about a local item when asking for
/// reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSnapshot {
    /// Locally-stable item id.
    pub id: ItemId,
    /// Item kind.
    pub kind: ItemKind,
    /// Local modification timestamp.
    pub modified_at: DateTime<Utc>,
    /// Persisted CRM link, if the item was synchronized before.
    #[serde(default)]
    pub link: Option<ItemLink>,
}

/// Read/write access to the groupware client's local item store.
///
/// Implementations wrap whatever the host client provides; the engine only
/// requires this narrow contract. All methods may be called from the
/// background worker thread.
#[cfg_attr(test, mockall::automock)]
pub trait ItemStore: Send + Sync {
    /// Enumerate the ids of all items under synchronization.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be scanned.
    fn list_ids(&self) -> Result<Vec<ItemId>, CrmLinkError>;

    /// Observe an item's current state.
    ///
    /// # Errors
    ///
    /// Returns an error if the item does not exist or cannot be read.
    fn snapshot(&self, id: &str) -> Result<ItemSnapshot, CrmLinkError>;

    /// The field name/value map to send when pushing this item to the CRM.
    ///
    /// # Errors
    ///
    /// Returns an error if the item does not exist or cannot be read.
    fn outbound_fields(&self, id: &str) -> Result<serde_json::Value, CrmLinkError>;

    /// Create or update a local item from a remote record, returning the
    /// id of the affected item.
    ///
    /// # Errors
    ///
    /// Returns an error if the item cannot be written.
    fn apply_remote(&self, entry: &RemoteEntry) -> Result<ItemId, CrmLinkError>;

    /// Read the persisted CRM link properties from an item.
    ///
    /// # Errors
    ///
    /// Returns an error if the item cannot be read.
    fn read_link(&self, id: &str) -> Result<Option<ItemLink>, CrmLinkError>;

    /// Persist the CRM link properties on an item.
    ///
    /// # Errors
    ///
    /// Returns an error if the properties cannot be written.
    fn write_link(&self, id: &str, link: &ItemLink) -> Result<(), CrmLinkError>;

    /// Delete the CRM link properties from an item, unlinking it from
    /// synchronization.
    ///
    /// # Errors
    ///
    /// Returns an error if the properties cannot be deleted.
    fn remove_link(&self, id: &str) -> Result<(), CrmLinkError>;

    /// Write an arbitrary named property on an item.
    ///
    /// Used by auxiliary actions (e.g. recording meeting acceptance
    /// status) that annotate items without changing the sync link.
    ///
    /// # Errors
    ///
    /// Returns an error if the property cannot be written.
    fn set_property(&self, id: &str, name: &str, value: &str) -> Result<(), CrmLinkError>;
}
