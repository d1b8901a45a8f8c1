//! Typed results for the CRM calls the engine makes.

use serde::Deserialize;

/// Result of `set_entry` and `set_note_attachment`: the id of the record
/// the server created or updated.
#[derive(Debug, Clone, Deserialize)]
pub struct SaveEntryResult {
    /// Server-assigned record id.
    pub id: String,
}

/// One record reference inside an entry list.
#[derive(Debug, Clone, Deserialize)]
pub struct EntryRef {
    /// Record id.
    pub id: String,
}

/// Result of `get_entry_list`.
#[derive(Debug, Clone, Deserialize)]
pub struct EntryList {
    /// Matching records.
    #[serde(default)]
    pub entry_list: Vec<EntryRef>,
}

/// Result of `set_relationship`.
#[derive(Debug, Clone, Deserialize)]
pub struct RelationshipResult {
    /// Number of relationships created.
    #[serde(default)]
    pub created: u32,
    /// Number of relationships the server refused.
    #[serde(default)]
    pub failed: u32,
}

/// Acceptance status of one meeting invitee.
#[derive(Debug, Clone, Deserialize)]
pub struct InviteeStatus {
    /// CRM id of the invitee record.
    pub id: String,
    /// Acceptance status string (`accept`, `decline`, `tentative`, `none`).
    pub status: String,
}

/// Result of `get_invitee_status`.
#[derive(Debug, Clone, Deserialize)]
pub struct InviteeStatusList {
    /// Invitees with their current status.
    #[serde(default)]
    pub invitees: Vec<InviteeStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_list_defaults_empty() {
        let list: EntryList = serde_json::from_str("{}").unwrap();
        assert!(list.entry_list.is_empty());
    }

    #[test]
    fn test_relationship_result_parses() {
        let result: RelationshipResult =
            serde_json::from_str(r#"{"created": 1, "failed": 0}"#).unwrap();
        assert_eq!(result.created, 1);
        assert_eq!(result.failed, 0);
    }
}
