//! The archive-plan command: show which records an email would link to.

use std::sync::Arc;

use colored::Colorize;

use crate::cli::args::{ArchivePlanArgs, OutputFormat};
use crate::config::Config;
use crate::core::entity::{CrmEntity, RemoteEntry};
use crate::crm::client::{CrmClient, CrmTransport};
use crate::error::CrmLinkError;
use crate::features::archive::email::EmailDocument;
use crate::features::archive::reconciler::EmailReconciler;
use crate::output::to_json;

use super::read_json;

/// Field names checked for an address on a snapshot record.
const ADDRESS_FIELDS: [&str; 2] = ["email1", "email"];

/// A read-only transport answering `get_entry_list` from a snapshot file.
struct SnapshotTransport {
    entries: Vec<RemoteEntry>,
}

impl CrmTransport for SnapshotTransport {
    fn invoke(
        &self,
        method: &str,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, CrmLinkError> {
        if method != "get_entry_list" {
            return Err(CrmLinkError::Transport(format!(
                "snapshot transport is read-only, refusing {method}"
            )));
        }

        let module = payload
            .get("module_name")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let address = payload
            .get("email_address")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        let matches: Vec<serde_json::Value> = self
            .entries
            .iter()
            .filter(|entry| entry.module == module)
            .filter(|entry| {
                ADDRESS_FIELDS.iter().any(|field| {
                    entry
                        .field_str(field)
                        .is_some_and(|a| a.eq_ignore_ascii_case(address))
                })
            })
            .map(|entry| serde_json::json!({"id": entry.id.as_str()}))
            .collect();

        Ok(serde_json::json!({ "entry_list": matches }))
    }
}

/// Resolve the related-record set for an email against a snapshot and
/// print the relationships an archive call would create. No writes.
///
/// # Errors
///
/// Returns an error if the snapshot files cannot be read.
pub fn archive_plan(args: &ArchivePlanArgs, format: OutputFormat) -> Result<String, CrmLinkError> {
    let email: EmailDocument = read_json(&args.email)?;
    let entries: Vec<RemoteEntry> = read_json(&args.remote)?;
    let config = Config::load()?;

    let client = CrmClient::new(Arc::new(SnapshotTransport { entries }));
    let reconciler = EmailReconciler::new(&client, &config.archive);
    let related = reconciler.resolve_related(&email, &[], &args.exclude)?;

    match format {
        OutputFormat::Json => {
            let already = email.crm_id.is_some();
            to_json(&serde_json::json!({
                "subject": email.subject,
                "already_archived": already,
                "would_archive": !already && !related.is_empty(),
                "related": related,
            }))
        }
        OutputFormat::Pretty => Ok(format_pretty(&email, &related)),
    }
}

fn format_pretty(email: &EmailDocument, related: &[CrmEntity]) -> String {
    let mut lines = Vec::new();

    lines.push("Archive Plan".bold().to_string());
    lines.push("─".repeat(40));
    lines.push(format!("  Subject: {}", email.subject));

    if let Some(existing) = &email.crm_id {
        lines.push(format!(
            "  {}",
            format!("Already archived as {existing}; nothing to do").yellow()
        ));
        return lines.join("\n");
    }

    if related.is_empty() {
        lines.push(
            "  No related CRM records found; the email would not be archived"
                .dimmed()
                .to_string(),
        );
    } else {
        lines.push(format!(
            "  Would archive and link {} record(s):",
            related.len()
        ));
        for entity in related {
            lines.push(format!("    {} {entity}", "→".green()));
        }
    }

    lines.join("\n")
}
