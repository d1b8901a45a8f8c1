//! Remote-side value types.
//!
//! A CRM record is identified by its module name plus an opaque id. These
//! types are immutable values passed between the synchroniser, the email
//! reconciler, and the typed CRM client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An opaque, non-empty CRM record identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CrmId(String);

impl CrmId {
    /// Create an id from a raw server-supplied string.
    ///
    /// Returns `None` for empty or whitespace-only input, so an unset
    /// remote id is always represented as `Option::None` rather than as an
    /// empty string that compares equal to another empty string.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CrmId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A reference to a remote record, used for relationship linking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrmEntity {
    /// CRM module the record lives in (e.g. `Contacts`).
    pub module: String,
    /// The record id.
    pub id: CrmId,
}

impl CrmEntity {
    /// Create a new entity reference.
    #[must_use]
    pub fn new(module: impl Into<String>, id: CrmId) -> Self {
        Self {
            module: module.into(),
            id,
        }
    }
}

impl std::fmt::Display for CrmEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.module, self.id)
    }
}

/// A summary of a remote record as observed during reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// The record id.
    pub id: CrmId,
    /// CRM module the record lives in.
    pub module: String,
    /// Server-side modification timestamp.
    pub modified_at: DateTime<Utc>,
    /// Field name/value pairs carried by the record.
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl RemoteEntry {
    /// The entity reference for this entry.
    #[must_use]
    pub fn entity(&self) -> CrmEntity {
        CrmEntity::new(self.module.clone(), self.id.clone())
    }

    /// A string field value, if present.
    #[must_use]
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(serde_json::Value::as_str)
    }
}
