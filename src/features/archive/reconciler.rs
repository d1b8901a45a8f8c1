//! The email archival protocol.
//!
//! Resolving the set of related CRM records, persisting the email record
//! exactly once (with a plain-text fallback when rich content is
//! rejected), and best-effort fan-out of relationship and attachment
//! links. Partial and total failure are reported through
//! [`ArchiveResult`]; nothing here panics or propagates raw network
//! errors to the caller.

use std::collections::HashSet;

use serde_json::json;

use crate::config::settings::ArchiveConfig;
use crate::core::entity::{CrmEntity, CrmId};
use crate::crm::client::CrmClient;
use crate::error::CrmLinkError;
use crate::features::archive::address::collect_addresses;
use crate::features::archive::email::EmailDocument;

/// CRM module archived emails are stored in.
pub const EMAIL_MODULE: &str = "Emails";

/// Link field used to relate a record to an archived email.
pub const EMAIL_LINK_FIELD: &str = "emails";

/// A recorded note or non-fatal problem from an archive attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveProblem {
    /// The email was archived by an earlier call; nothing was sent.
    AlreadyArchived {
        /// The existing CRM record id.
        email_id: CrmId,
    },
    /// No related record was found and none was supplied; the email was
    /// not archived. This is an expected outcome, not an error.
    NoRelatedEntities,
    /// Resolving related records against the CRM failed.
    ResolveFailed {
        /// What went wrong.
        message: String,
    },
    /// The server rejected the rich (HTML) representation; the plain-text
    /// retry may still have succeeded.
    RichContentRejected {
        /// The original failure text, preserved for the user.
        message: String,
    },
    /// Persisting the email record failed outright.
    SaveFailed {
        /// What went wrong.
        message: String,
    },
    /// Linking one related record to the email failed.
    LinkFailed {
        /// The record that could not be linked.
        entity: CrmEntity,
        /// What went wrong.
        message: String,
    },
    /// Uploading one attachment failed.
    AttachmentFailed {
        /// Attachment file name.
        name: String,
        /// What went wrong.
        message: String,
    },
}

impl std::fmt::Display for ArchiveProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyArchived { email_id } => {
                write!(f, "already archived as {email_id}")
            }
            Self::NoRelatedEntities => {
                write!(f, "no related CRM records found")
            }
            Self::ResolveFailed { message } => {
                write!(f, "resolving related records failed: {message}")
            }
            Self::RichContentRejected { message } => {
                write!(f, "rich content rejected by server: {message}")
            }
            Self::SaveFailed { message } => {
                write!(f, "saving email record failed: {message}")
            }
            Self::LinkFailed { entity, message } => {
                write!(f, "linking {entity} failed: {message}")
            }
            Self::AttachmentFailed { name, message } => {
                write!(f, "attaching '{name}' failed: {message}")
            }
        }
    }
}

/// Outcome of an archive attempt.
///
/// Success reflects only whether the email record itself exists;
/// relationship and attachment problems are reported alongside without
/// flipping success to failure.
#[derive(Debug, Clone)]
pub struct ArchiveResult {
    email_id: Option<CrmId>,
    problems: Vec<ArchiveProblem>,
}

impl ArchiveResult {
    /// A failed result carrying the given problems.
    #[must_use]
    pub const fn failure(problems: Vec<ArchiveProblem>) -> Self {
        Self {
            email_id: None,
            problems,
        }
    }

    /// Whether the email record exists in the CRM.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.email_id.is_some()
    }

    /// The archived email record id, if the record exists.
    #[must_use]
    pub const fn email_id(&self) -> Option<&CrmId> {
        self.email_id.as_ref()
    }

    /// Recorded notes and problems, in the order they occurred.
    #[must_use]
    pub fn problems(&self) -> &[ArchiveProblem] {
        &self.problems
    }

    /// Whether the attempt failed because the email relates to no known
    /// record. Callers treat this as a quiet no-op, not an error.
    #[must_use]
    pub fn is_unrelated(&self) -> bool {
        !self.is_success()
            && self
                .problems
                .iter()
                .any(|p| matches!(p, ArchiveProblem::NoRelatedEntities))
    }

    /// One-line summary of all recorded problems.
    #[must_use]
    pub fn problem_summary(&self) -> String {
        self.problems
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Archives emails into the CRM.
pub struct EmailReconciler<'a> {
    crm: &'a CrmClient,
    config: &'a ArchiveConfig,
}

impl<'a> EmailReconciler<'a> {
    /// Create a reconciler over the given client and settings.
    #[must_use]
    pub const fn new(crm: &'a CrmClient, config: &'a ArchiveConfig) -> Self {
        Self { crm, config }
    }

    /// Resolve the set of CRM records this email should be linked to.
    ///
    /// The union of explicitly supplied entities and records discovered
    /// by matching every From/To/CC address against each configured
    /// module, skipping excluded addresses. Duplicates are suppressed;
    /// explicit entities come first.
    ///
    /// # Errors
    ///
    /// Returns transport/server errors if a CRM search fails.
    pub fn resolve_related(
        &self,
        email: &EmailDocument,
        explicit: &[CrmEntity],
        excluded: &[String],
    ) -> Result<Vec<CrmEntity>, CrmLinkError> {
        let mut seen = HashSet::new();
        let mut related = Vec::new();

        for entity in explicit {
            if seen.insert(entity.clone()) {
                related.push(entity.clone());
            }
        }

        let mut all_excluded = excluded.to_vec();
        all_excluded.extend(self.config.excluded_addresses.iter().cloned());

        for address in collect_addresses(email, &all_excluded) {
            for module in &self.config.search_modules {
                for entity in self.crm.search_by_email(module, &address)? {
                    if seen.insert(entity.clone()) {
                        related.push(entity);
                    }
                }
            }
        }

        Ok(related)
    }

    /// Archive an email: persist it exactly once and link every related
    /// record and attachment to it.
    ///
    /// Never fails with an `Err`; all outcomes, including expected
    /// non-errors (already archived, nothing related), are reported
    /// through the returned [`ArchiveResult`].
    #[must_use]
    pub fn archive(
        &self,
        email: &EmailDocument,
        explicit: &[CrmEntity],
        excluded: &[String],
    ) -> ArchiveResult {
        if let Some(existing) = &email.crm_id {
            log::debug!(
                "email '{}' already archived as {existing}, skipping",
                email.subject
            );
            return ArchiveResult {
                email_id: Some(existing.clone()),
                problems: vec![ArchiveProblem::AlreadyArchived {
                    email_id: existing.clone(),
                }],
            };
        }

        let related = match self.resolve_related(email, explicit, excluded) {
            Ok(related) => related,
            Err(e) => {
                log::warn!(
                    "could not resolve related records for '{}': {e}",
                    email.subject
                );
                return ArchiveResult::failure(vec![ArchiveProblem::ResolveFailed {
                    message: e.to_string(),
                }]);
            }
        };

        if related.is_empty() {
            log::debug!(
                "email '{}' relates to no known CRM record, not archiving",
                email.subject
            );
            return ArchiveResult::failure(vec![ArchiveProblem::NoRelatedEntities]);
        }

        let mut problems = Vec::new();
        let email_id = match self.save_email(email, &mut problems) {
            Some(id) => id,
            None => return ArchiveResult::failure(problems),
        };

        // Best-effort fan-out: one failed link never aborts the rest.
        for entity in &related {
            if let Err(e) = self
                .crm
                .set_relationship(entity, EMAIL_LINK_FIELD, &email_id)
            {
                log::warn!("failed to link {entity} to email {email_id}: {e}");
                problems.push(ArchiveProblem::LinkFailed {
                    entity: entity.clone(),
                    message: e.to_string(),
                });
            }
        }

        for attachment in &email.attachments {
            if let Err(e) = self
                .crm
                .attach_note(&email_id, &attachment.name, &attachment.content)
            {
                log::warn!(
                    "failed to attach '{}' to email {email_id}: {e}",
                    attachment.name
                );
                problems.push(ArchiveProblem::AttachmentFailed {
                    name: attachment.name.clone(),
                    message: e.to_string(),
                });
            }
        }

        log::info!(
            "archived email '{}' as {email_id} with {} related record(s)",
            email.subject,
            related.len()
        );
        ArchiveResult {
            email_id: Some(email_id),
            problems,
        }
    }

    /// Persist the email record, falling back to plain text if the rich
    /// representation is rejected. The first failure is carried forward
    /// as a recorded problem even when the retry succeeds.
    fn save_email(
        &self,
        email: &EmailDocument,
        problems: &mut Vec<ArchiveProblem>,
    ) -> Option<CrmId> {
        let with_html = self.config.keep_html && email.html_body.is_some();

        match self.try_save(email, with_html) {
            Ok(id) => Some(id),
            Err(first) if with_html => {
                log::warn!(
                    "rich content save failed for '{}' ({first}), retrying as plain text",
                    email.subject
                );
                problems.push(ArchiveProblem::RichContentRejected {
                    message: first.to_string(),
                });
                match self.try_save(email, false) {
                    Ok(id) => Some(id),
                    Err(second) => {
                        log::error!(
                            "plain text save also failed for '{}': {second}",
                            email.subject
                        );
                        problems.push(ArchiveProblem::SaveFailed {
                            message: second.to_string(),
                        });
                        None
                    }
                }
            }
            Err(e) => {
                log::error!("saving email '{}' failed: {e}", email.subject);
                problems.push(ArchiveProblem::SaveFailed {
                    message: e.to_string(),
                });
                None
            }
        }
    }

    fn try_save(&self, email: &EmailDocument, with_html: bool) -> Result<CrmId, CrmLinkError> {
        let mut fields = json!({
            "name": email.subject,
            "date_sent": email.sent_at.to_rfc3339(),
            "from_addr_name": email.from.join(", "),
            "to_addrs_names": email.to.join(", "),
            "cc_addrs_names": email.cc.join(", "),
            "description": email.text_body,
        });
        if with_html {
            if let (Some(html), Some(map)) = (&email.html_body, fields.as_object_mut()) {
                map.insert("description_html".to_string(), json!(html));
            }
        }
        self.crm.save_entry(EMAIL_MODULE, None, &fields)
    }
}
