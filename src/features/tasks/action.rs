//! Retryable units of work.
//!
//! Every deferred operation the engine performs is one of the closed set
//! of [`ActionKind`] variants, wrapped in a [`SyncAction`] carrying the
//! attempt budget and a human-readable description. Dispatch happens in
//! one place, so adding a variant forces every arm to be handled.

use crate::core::entity::{CrmEntity, CrmId, RemoteEntry};
use crate::core::item::{ItemId, ItemKind, ItemLink, ItemSnapshot};
use crate::engine::EngineContext;
use crate::error::CrmLinkError;
use crate::features::archive::email::EmailDocument;
use crate::features::archive::reconciler::{EmailReconciler, EMAIL_MODULE};
use crate::features::sync::state::SyncState;

/// The kinds of work the background queue carries.
#[derive(Debug, Clone)]
pub enum ActionKind {
    /// Push a never-transmitted local item to the CRM.
    TransmitNew {
        /// Local item to push.
        item_id: ItemId,
        /// Item kind, for diagnostics.
        kind: ItemKind,
        /// Target CRM module.
        module: String,
    },
    /// Push a changed, previously synchronized item to the CRM.
    TransmitUpdate {
        /// Local item to push.
        item_id: ItemId,
        /// Item kind, for diagnostics.
        kind: ItemKind,
        /// Target CRM module.
        module: String,
    },
    /// Create a local item for a remote record with no local counterpart.
    MaterializeLocal {
        /// The remote record to materialize.
        entry: RemoteEntry,
    },
    /// Overwrite a local item with the newer remote record.
    PullUpdate {
        /// Local item to overwrite.
        item_id: ItemId,
        /// The newer remote record.
        entry: RemoteEntry,
    },
    /// Archive an email and link its related records.
    ArchiveEmail {
        /// The email snapshot.
        email: EmailDocument,
        /// Records the caller already knows the email relates to.
        explicit: Vec<CrmEntity>,
        /// Addresses excluded from relationship matching.
        excluded: Vec<String>,
    },
    /// Poll invitee acceptance status for a transmitted meeting.
    CheckMeetingAcceptance {
        /// Local appointment item.
        item_id: ItemId,
        /// CRM id of the meeting record.
        meeting_id: CrmId,
    },
}

/// A unit of deferred work with a bounded retry budget.
#[derive(Debug, Clone)]
pub struct SyncAction {
    kind: ActionKind,
    attempts: u32,
    max_attempts: u32,
    description: String,
}

impl SyncAction {
    fn new(kind: ActionKind, max_attempts: u32, description: String) -> Self {
        Self {
            kind,
            attempts: 0,
            max_attempts,
            description,
        }
    }

    /// Action pushing a never-transmitted item.
    #[must_use]
    pub fn transmit_new(snapshot: &ItemSnapshot, module: &str, max_attempts: u32) -> Self {
        let description = format!(
            "transmit new {} item {} to {module}",
            snapshot.kind, snapshot.id
        );
        Self::new(
            ActionKind::TransmitNew {
                item_id: snapshot.id.clone(),
                kind: snapshot.kind,
                module: module.to_string(),
            },
            max_attempts,
            description,
        )
    }

    /// Action pushing an update of a synchronized item.
    #[must_use]
    pub fn transmit_update(snapshot: &ItemSnapshot, module: &str, max_attempts: u32) -> Self {
        let description = format!(
            "transmit update of {} item {} to {module}",
            snapshot.kind, snapshot.id
        );
        Self::new(
            ActionKind::TransmitUpdate {
                item_id: snapshot.id.clone(),
                kind: snapshot.kind,
                module: module.to_string(),
            },
            max_attempts,
            description,
        )
    }

    /// Action creating a local item from a remote record.
    #[must_use]
    pub fn materialize(entry: RemoteEntry, max_attempts: u32) -> Self {
        let description = format!("materialize {}/{} locally", entry.module, entry.id);
        Self::new(
            ActionKind::MaterializeLocal { entry },
            max_attempts,
            description,
        )
    }

    /// Action overwriting a local item from the remote side.
    #[must_use]
    pub fn pull_update(item_id: ItemId, entry: RemoteEntry, max_attempts: u32) -> Self {
        let description = format!(
            "pull update of item {item_id} from {}/{}",
            entry.module, entry.id
        );
        Self::new(
            ActionKind::PullUpdate { item_id, entry },
            max_attempts,
            description,
        )
    }

    /// Action archiving an email.
    #[must_use]
    pub fn archive_email(
        email: EmailDocument,
        explicit: Vec<CrmEntity>,
        excluded: Vec<String>,
        max_attempts: u32,
    ) -> Self {
        let description = format!("archive email '{}'", email.subject);
        Self::new(
            ActionKind::ArchiveEmail {
                email,
                explicit,
                excluded,
            },
            max_attempts,
            description,
        )
    }

    /// Action polling meeting acceptance status.
    #[must_use]
    pub fn check_acceptance(item_id: ItemId, meeting_id: CrmId, max_attempts: u32) -> Self {
        let description = format!("check acceptance of meeting {meeting_id} for item {item_id}");
        Self::new(
            ActionKind::CheckMeetingAcceptance {
                item_id,
                meeting_id,
            },
            max_attempts,
            description,
        )
    }

    /// The wrapped work item.
    #[must_use]
    pub const fn kind(&self) -> &ActionKind {
        &self.kind
    }

    /// Stable name of the action kind, for logs and machine output.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self.kind {
            ActionKind::TransmitNew { .. } => "transmit_new",
            ActionKind::TransmitUpdate { .. } => "transmit_update",
            ActionKind::MaterializeLocal { .. } => "materialize_local",
            ActionKind::PullUpdate { .. } => "pull_update",
            ActionKind::ArchiveEmail { .. } => "archive_email",
            ActionKind::CheckMeetingAcceptance { .. } => "check_acceptance",
        }
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Failed attempts so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The immutable attempt budget.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Record a failed attempt. Called by the worker, which owns the
    /// action while it runs; the counter is never shared.
    pub(crate) fn record_failure(&mut self) {
        self.attempts += 1;
    }

    /// Whether the attempt budget allows another try.
    #[must_use]
    pub const fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Execute the action against the engine's collaborators.
    ///
    /// # Errors
    ///
    /// Returns the classified failure; the worker decides between
    /// re-queueing and dropping.
    pub fn perform(&self, ctx: &EngineContext) -> Result<(), CrmLinkError> {
        match &self.kind {
            ActionKind::TransmitNew { item_id, module, .. } => {
                Self::push_item(ctx, item_id, module, false)
            }
            ActionKind::TransmitUpdate { item_id, module, .. } => {
                Self::push_item(ctx, item_id, module, true)
            }
            ActionKind::MaterializeLocal { entry } => Self::materialize_local(ctx, entry),
            ActionKind::PullUpdate { item_id, entry } => Self::apply_pull(ctx, item_id, entry),
            ActionKind::ArchiveEmail {
                email,
                explicit,
                excluded,
            } => Self::archive(ctx, email, explicit, excluded),
            ActionKind::CheckMeetingAcceptance {
                item_id,
                meeting_id,
            } => Self::check_meeting(ctx, item_id, meeting_id),
        }
    }

    /// Clean up after the attempt budget is exhausted.
    ///
    /// A failed first push returns the item to `New` so a later
    /// reconciliation can try again from scratch; items that already have
    /// a remote record keep their state for the restart-time rebuild.
    pub(crate) fn abandon(&self, ctx: &EngineContext) {
        if let ActionKind::TransmitNew { item_id, .. } = &self.kind {
            let reverted = ctx
                .lock_states()
                .and_then(|mut table| table.revert_to_new(item_id));
            match reverted {
                Ok(()) => log::debug!("item {item_id} returned to new after abandoned push"),
                Err(e) => log::debug!("could not revert item {item_id} to new: {e}"),
            }
        }
    }

    /// Push a local item to the CRM, as a creation or an update.
    fn push_item(
        ctx: &EngineContext,
        item_id: &str,
        module: &str,
        update: bool,
    ) -> Result<(), CrmLinkError> {
        let existing = if update {
            let table = ctx.lock_states()?;
            let id = table.get(item_id).and_then(|s| s.crm_id().cloned());
            Some(id.ok_or_else(|| {
                CrmLinkError::Item(format!("item {item_id} has no linked CRM record to update"))
            })?)
        } else {
            None
        };

        let fields = ctx.store.outbound_fields(item_id)?;
        let crm_id = ctx.crm.save_entry(module, existing.as_ref(), &fields)?;
        let modified_at = ctx.store.snapshot(item_id)?.modified_at;

        {
            let mut table = ctx.lock_states()?;
            table.complete_transmission(item_id, crm_id.clone(), module, modified_at)?;
        }
        ctx.store.write_link(
            item_id,
            &ItemLink {
                crm_id,
                module: module.to_string(),
                modified_at,
            },
        )
    }

    /// Create a local item for a remote record and track it as synced.
    fn materialize_local(ctx: &EngineContext, entry: &RemoteEntry) -> Result<(), CrmLinkError> {
        let item_id = ctx.store.apply_remote(entry)?;
        let link = ItemLink {
            crm_id: entry.id.clone(),
            module: entry.module.clone(),
            modified_at: entry.modified_at,
        };

        {
            let mut table = ctx.lock_states()?;
            // A concurrent pass may have materialized the record already;
            // that is the tolerated double-enqueue case.
            if table.find_by_crm(&entry.module, &entry.id).is_none() {
                table.track(SyncState::linked(item_id.clone(), &link))?;
            }
        }
        ctx.store.write_link(&item_id, &link)
    }

    /// Overwrite a local item with the newer remote record.
    fn apply_pull(
        ctx: &EngineContext,
        item_id: &str,
        entry: &RemoteEntry,
    ) -> Result<(), CrmLinkError> {
        ctx.store.apply_remote(entry)?;

        {
            let mut table = ctx.lock_states()?;
            table.complete_transmission(
                item_id,
                entry.id.clone(),
                &entry.module,
                entry.modified_at,
            )?;
        }
        ctx.store.write_link(
            item_id,
            &ItemLink {
                crm_id: entry.id.clone(),
                module: entry.module.clone(),
                modified_at: entry.modified_at,
            },
        )
    }

    /// Run the archival protocol for an email.
    fn archive(
        ctx: &EngineContext,
        email: &EmailDocument,
        explicit: &[CrmEntity],
        excluded: &[String],
    ) -> Result<(), CrmLinkError> {
        let mut email = email.clone();

        // Re-read the persisted link so a duplicate of an already
        // performed archive action becomes a no-op.
        if email.crm_id.is_none() {
            if let Some(item_id) = &email.item_id {
                if let Some(link) = ctx.store.read_link(item_id)? {
                    if link.module == EMAIL_MODULE {
                        email.crm_id = Some(link.crm_id);
                    }
                }
            }
        }

        let reconciler = EmailReconciler::new(&ctx.crm, &ctx.archive);
        let result = reconciler.archive(&email, explicit, excluded);

        if result.is_success() {
            if let (Some(item_id), Some(email_id)) = (&email.item_id, result.email_id()) {
                ctx.store.write_link(
                    item_id,
                    &ItemLink {
                        crm_id: email_id.clone(),
                        module: EMAIL_MODULE.to_string(),
                        modified_at: email.sent_at,
                    },
                )?;
            }
            Ok(())
        } else if result.is_unrelated() {
            // Expected outcome: an email unrelated to any known record is
            // simply not archived.
            Ok(())
        } else {
            Err(CrmLinkError::Archive(result.problem_summary()))
        }
    }

    /// Poll invitee acceptance and annotate the local appointment.
    fn check_meeting(
        ctx: &EngineContext,
        item_id: &str,
        meeting_id: &CrmId,
    ) -> Result<(), CrmLinkError> {
        let invitees = ctx.crm.meeting_acceptance(meeting_id)?;
        for invitee in &invitees {
            ctx.store.set_property(
                item_id,
                &format!("crmlink.acceptance.{}", invitee.id),
                &invitee.status,
            )?;
        }
        log::info!(
            "recorded acceptance of {} invitee(s) for meeting {meeting_id}",
            invitees.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot(id: &str) -> ItemSnapshot {
        ItemSnapshot {
            id: id.to_string(),
            kind: ItemKind::Contact,
            modified_at: Utc::now(),
            link: None,
        }
    }

    #[test]
    fn test_new_action_starts_unattempted() {
        let action = SyncAction::transmit_new(&snapshot("item-1"), "Contacts", 3);
        assert_eq!(action.attempts(), 0);
        assert_eq!(action.max_attempts(), 3);
        assert!(action.has_attempts_left());
        assert_eq!(action.kind_name(), "transmit_new");
    }

    #[test]
    fn test_budget_exhaustion() {
        let mut action = SyncAction::transmit_new(&snapshot("item-1"), "Contacts", 2);
        action.record_failure();
        assert!(action.has_attempts_left());
        action.record_failure();
        assert!(!action.has_attempts_left());
    }

    #[test]
    fn test_descriptions_name_the_work() {
        let push = SyncAction::transmit_new(&snapshot("item-1"), "Contacts", 3);
        assert!(push.description().contains("item-1"));
        assert!(push.description().contains("Contacts"));

        let entry = RemoteEntry {
            id: CrmId::from_raw("abc").unwrap(),
            module: "Contacts".to_string(),
            modified_at: Utc::now(),
            fields: serde_json::Map::new(),
        };
        let pull = SyncAction::pull_update("item-2".to_string(), entry, 3);
        assert!(pull.description().contains("Contacts/abc"));
    }
}
