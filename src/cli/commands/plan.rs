//! The plan command: dry-run a reconciliation pass.

use std::sync::{Arc, Mutex};

use colored::Colorize;

use crate::cli::args::{OutputFormat, PlanArgs};
use crate::config::Config;
use crate::core::entity::RemoteEntry;
use crate::core::item::ItemSnapshot;
use crate::error::CrmLinkError;
use crate::features::sync::synchroniser::Synchroniser;
use crate::features::sync::table::SyncStateTable;
use crate::features::tasks::action::SyncAction;
use crate::output::to_json;

use super::read_json;

/// Run a reconciliation pass over snapshot files and print the planned
/// actions without performing any of them.
///
/// # Errors
///
/// Returns an error if the snapshot files cannot be read or the
/// reconciliation detects an invariant violation (e.g. two items claiming
/// the same CRM record).
pub fn plan(args: &PlanArgs, format: OutputFormat) -> Result<String, CrmLinkError> {
    let local: Vec<ItemSnapshot> = read_json(&args.local)?;
    let remote: Vec<RemoteEntry> = read_json(&args.remote)?;
    let config = Config::load()?;

    let states = Arc::new(Mutex::new(SyncStateTable::new()));
    let synchroniser = Synchroniser::new(states, config.queue.max_attempts);
    let actions = synchroniser.reconcile(&local, &remote, &args.module)?;

    match format {
        OutputFormat::Json => {
            let rows: Vec<serde_json::Value> = actions
                .iter()
                .map(|action| {
                    serde_json::json!({
                        "kind": action.kind_name(),
                        "description": action.description(),
                        "max_attempts": action.max_attempts(),
                    })
                })
                .collect();
            to_json(&serde_json::json!({
                "module": args.module,
                "local_items": local.len(),
                "remote_entries": remote.len(),
                "actions": rows,
            }))
        }
        OutputFormat::Pretty => Ok(format_pretty(&actions, local.len(), remote.len())),
    }
}

fn format_pretty(actions: &[SyncAction], local: usize, remote: usize) -> String {
    let mut lines = Vec::new();

    lines.push("Planned Sync Actions".bold().to_string());
    lines.push("─".repeat(40));
    lines.push(format!(
        "  Examined {local} local item(s) and {remote} remote record(s)"
    ));
    lines.push(String::new());

    if actions.is_empty() {
        lines.push("  Both sides are already consistent".green().to_string());
    } else {
        for action in actions {
            let marker = match action.kind_name() {
                "transmit_new" | "transmit_update" => "↑".green(),
                "pull_update" | "materialize_local" => "↓".yellow(),
                _ => "•".normal(),
            };
            lines.push(format!("  {marker} {}", action.description()));
        }
        lines.push(String::new());
        lines.push(
            format!("{} action(s) planned; nothing was sent", actions.len())
                .dimmed()
                .to_string(),
        );
    }

    lines.join("\n")
}
