//! Typed client over the CRM transport.
//!
//! The transport collaborator turns `(method, payload)` into a JSON result
//! or a classified error; [`CrmClient`] wraps it with the handful of typed
//! calls the engine needs and absorbs the server responses that are
//! success-equivalent (e.g. creating a relationship that already exists).

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::json;

use crate::core::entity::{CrmEntity, CrmId};
use crate::crm::types::{EntryList, InviteeStatus, InviteeStatusList, RelationshipResult, SaveEntryResult};
use crate::error::CrmLinkError;

/// The HTTP/JSON transport to the CRM, supplied by the host.
///
/// Implementations fail with [`CrmLinkError::Transport`] for
/// connection-level problems (generally retryable) and
/// [`CrmLinkError::Server`] for faults the server itself reported.
#[cfg_attr(test, mockall::automock)]
pub trait CrmTransport: Send + Sync {
    /// Invoke a named CRM method with a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns `Transport` or `Server` errors as classified above.
    fn invoke(
        &self,
        method: &str,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, CrmLinkError>;
}

/// Server fault code treated as success when creating a relationship.
const CODE_ALREADY_EXISTS: &str = "already_exists";

/// Typed CRM operations used by the synchroniser and email reconciler.
#[derive(Clone)]
pub struct CrmClient {
    transport: Arc<dyn CrmTransport>,
}

impl CrmClient {
    /// Create a client over the given transport.
    #[must_use]
    pub fn new(transport: Arc<dyn CrmTransport>) -> Self {
        Self { transport }
    }

    /// Invoke a method and deserialize its typed result.
    fn invoke<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &serde_json::Value,
    ) -> Result<T, CrmLinkError> {
        let value = self.transport.invoke(method, payload)?;
        serde_json::from_value(value).map_err(CrmLinkError::Parse)
    }

    /// Create or update a record, returning the server-assigned id.
    ///
    /// Passing an existing `id` makes this an update of that record.
    ///
    /// # Errors
    ///
    /// Returns transport/server errors, or a server error if the response
    /// carries no usable record id.
    pub fn save_entry(
        &self,
        module: &str,
        id: Option<&CrmId>,
        fields: &serde_json::Value,
    ) -> Result<CrmId, CrmLinkError> {
        let mut payload = json!({
            "module_name": module,
            "name_value_list": fields,
        });
        if let (Some(existing), Some(map)) = (id, payload.as_object_mut()) {
            map.insert("id".to_string(), json!(existing.as_str()));
        }

        let result: SaveEntryResult = self.invoke("set_entry", &payload)?;
        CrmId::from_raw(result.id).ok_or_else(|| CrmLinkError::Server {
            code: "invalid_response".to_string(),
            name: "EmptyRecordId".to_string(),
            description: format!("set_entry on {module} returned no record id"),
        })
    }

    /// Find records in a module whose email address matches `address`.
    ///
    /// # Errors
    ///
    /// Returns transport/server errors from the underlying call.
    pub fn search_by_email(
        &self,
        module: &str,
        address: &str,
    ) -> Result<Vec<CrmEntity>, CrmLinkError> {
        let payload = json!({
            "module_name": module,
            "email_address": address,
        });

        let list: EntryList = self.invoke("get_entry_list", &payload)?;
        Ok(list
            .entry_list
            .into_iter()
            .filter_map(|entry| CrmId::from_raw(entry.id))
            .map(|id| CrmEntity::new(module, id))
            .collect())
    }

    /// Link a related record to `entity` through `link_field`.
    ///
    /// A server fault reporting the relationship already exists is treated
    /// as success.
    ///
    /// # Errors
    ///
    /// Returns transport/server errors, or a server error if the server
    /// reported the relationship as failed.
    pub fn set_relationship(
        &self,
        entity: &CrmEntity,
        link_field: &str,
        related_id: &CrmId,
    ) -> Result<(), CrmLinkError> {
        let payload = json!({
            "module_name": entity.module,
            "module_id": entity.id.as_str(),
            "link_field_name": link_field,
            "related_ids": [related_id.as_str()],
        });

        let result: Result<RelationshipResult, CrmLinkError> =
            self.invoke("set_relationship", &payload);

        match result {
            Ok(outcome) if outcome.failed > 0 => Err(CrmLinkError::Server {
                code: "relationship_failed".to_string(),
                name: "RelationshipFailed".to_string(),
                description: format!(
                    "server refused {} relationship(s) on {entity}",
                    outcome.failed
                ),
            }),
            Ok(_) => Ok(()),
            Err(CrmLinkError::Server { ref code, .. }) if code == CODE_ALREADY_EXISTS => {
                log::debug!("relationship on {entity} already exists, treating as success");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Attach a file to an archived email record.
    ///
    /// # Errors
    ///
    /// Returns transport/server errors, or a server error if the response
    /// carries no usable attachment id.
    pub fn attach_note(
        &self,
        email_id: &CrmId,
        filename: &str,
        content: &[u8],
    ) -> Result<CrmId, CrmLinkError> {
        use base64::Engine;

        let encoded = base64::engine::general_purpose::STANDARD.encode(content);
        let payload = json!({
            "id": email_id.as_str(),
            "filename": filename,
            "file": encoded,
        });

        let result: SaveEntryResult = self.invoke("set_note_attachment", &payload)?;
        CrmId::from_raw(result.id).ok_or_else(|| CrmLinkError::Server {
            code: "invalid_response".to_string(),
            name: "EmptyRecordId".to_string(),
            description: format!("set_note_attachment for {filename} returned no record id"),
        })
    }

    /// Fetch the invitee acceptance statuses of a transmitted meeting.
    ///
    /// # Errors
    ///
    /// Returns transport/server errors from the underlying call.
    pub fn meeting_acceptance(
        &self,
        meeting_id: &CrmId,
    ) -> Result<Vec<InviteeStatus>, CrmLinkError> {
        let payload = json!({ "meeting_id": meeting_id.as_str() });
        let list: InviteeStatusList = self.invoke("get_invitee_status", &payload)?;
        Ok(list.invitees)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> CrmId {
        CrmId::from_raw(raw).unwrap()
    }

    #[test]
    fn test_save_entry_returns_server_id() {
        let mut transport = MockCrmTransport::new();
        transport
            .expect_invoke()
            .withf(|method, _| method == "set_entry")
            .times(1)
            .returning(|_, _| Ok(json!({"id": "new-id"})));

        let client = CrmClient::new(Arc::new(transport));
        let fields = json!({"last_name": "Young"});
        let created = client.save_entry("Contacts", None, &fields).unwrap();
        assert_eq!(created.as_str(), "new-id");
    }

    #[test]
    fn test_save_entry_update_includes_id() {
        let mut transport = MockCrmTransport::new();
        transport
            .expect_invoke()
            .withf(|method, payload| {
                method == "set_entry" && payload.get("id").and_then(|v| v.as_str()) == Some("abc")
            })
            .times(1)
            .returning(|_, _| Ok(json!({"id": "abc"})));

        let client = CrmClient::new(Arc::new(transport));
        let existing = id("abc");
        let fields = json!({"last_name": "Young"});
        client
            .save_entry("Contacts", Some(&existing), &fields)
            .unwrap();
    }

    #[test]
    fn test_save_entry_rejects_empty_id() {
        let mut transport = MockCrmTransport::new();
        transport
            .expect_invoke()
            .returning(|_, _| Ok(json!({"id": ""})));

        let client = CrmClient::new(Arc::new(transport));
        let result = client.save_entry("Contacts", None, &json!({}));
        assert!(matches!(result, Err(CrmLinkError::Server { .. })));
    }

    #[test]
    fn test_relationship_already_exists_is_success() {
        let mut transport = MockCrmTransport::new();
        transport.expect_invoke().returning(|_, _| {
            Err(CrmLinkError::Server {
                code: "already_exists".to_string(),
                name: "DuplicateRelationship".to_string(),
                description: "relationship exists".to_string(),
            })
        });

        let client = CrmClient::new(Arc::new(transport));
        let entity = CrmEntity::new("Contacts", id("c-1"));
        client
            .set_relationship(&entity, "emails", &id("e-1"))
            .unwrap();
    }

    #[test]
    fn test_relationship_failure_count_is_error() {
        let mut transport = MockCrmTransport::new();
        transport
            .expect_invoke()
            .returning(|_, _| Ok(json!({"created": 0, "failed": 1})));

        let client = CrmClient::new(Arc::new(transport));
        let entity = CrmEntity::new("Contacts", id("c-1"));
        let result = client.set_relationship(&entity, "emails", &id("e-1"));
        assert!(matches!(result, Err(CrmLinkError::Server { .. })));
    }

    #[test]
    fn test_search_by_email_skips_empty_ids() {
        let mut transport = MockCrmTransport::new();
        transport.expect_invoke().returning(|_, _| {
            Ok(json!({"entry_list": [{"id": "a"}, {"id": ""}, {"id": "b"}]}))
        });

        let client = CrmClient::new(Arc::new(transport));
        let found = client.search_by_email("Contacts", "b@y.com").unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id.as_str(), "a");
    }
}
