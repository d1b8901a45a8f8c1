//! Command-line argument definitions for crmlink.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "crmlink")]
#[command(about = "Inspect and dry-run groupware-to-CRM synchronization")]
#[command(long_about = "crmlink - diagnostics for the CRM synchronization engine

Loads snapshots of local groupware items and remote CRM records and shows
what the synchronization engine would do with them, without performing any
network writes.

QUICK START:
  crmlink plan --local items.json --remote entries.json --module Contacts
  crmlink archive-plan --email email.json --remote entries.json
  crmlink config show

OUTPUT FORMATS:
  --output pretty    Human-readable colored output (default)
  --output json      Machine-readable JSON for scripting")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Output format for command results
    #[arg(short, long, value_enum, default_value = "pretty", global = true)]
    pub output: OutputFormat,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable colored output.
    #[default]
    Pretty,
    /// Machine-readable JSON output.
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show what a reconciliation pass would push or pull
    ///
    /// Loads local item snapshots and remote record summaries from JSON
    /// files, runs the reconciliation algorithm against a fresh state
    /// table, and prints the planned actions. Nothing is sent anywhere.
    ///
    /// # Examples
    ///
    ///   crmlink plan --local items.json --remote entries.json
    ///   crmlink plan --local items.json --remote entries.json --module Tasks
    Plan(PlanArgs),

    /// Show which CRM records an email would be linked to
    ///
    /// Resolves the email's From/To/CC addresses against a snapshot of
    /// remote records, applying the configured exclusion list, and prints
    /// the relationships an archive call would create.
    ///
    /// # Examples
    ///
    ///   crmlink archive-plan --email email.json --remote entries.json
    ///   crmlink archive-plan --email email.json --remote entries.json --exclude me@corp.example
    #[command(name = "archive-plan")]
    ArchivePlan(ArchivePlanArgs),

    /// Show or initialize the configuration file
    Config(ConfigArgs),
}

/// Arguments for the plan command.
#[derive(Args)]
pub struct PlanArgs {
    /// JSON file with an array of local item snapshots
    #[arg(long)]
    pub local: PathBuf,

    /// JSON file with an array of remote record summaries
    #[arg(long)]
    pub remote: PathBuf,

    /// CRM module the local items belong to
    #[arg(long, default_value = "Contacts")]
    pub module: String,
}

/// Arguments for the archive-plan command.
#[derive(Args)]
pub struct ArchivePlanArgs {
    /// JSON file with the email snapshot
    #[arg(long)]
    pub email: PathBuf,

    /// JSON file with an array of remote record summaries to match
    /// addresses against
    #[arg(long)]
    pub remote: PathBuf,

    /// Additional address to exclude from matching (repeatable)
    #[arg(long = "exclude")]
    pub exclude: Vec<String>,
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show {
        /// Read this file instead of ~/.crmlink/config.yaml
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Write a configuration file with default settings
    Init {
        /// Write to this file instead of ~/.crmlink/config.yaml
        #[arg(long)]
        path: Option<PathBuf>,
    },
}
