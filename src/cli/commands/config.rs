//! The config command: show or initialize settings.

use colored::Colorize;

use crate::cli::args::{ConfigCommands, OutputFormat};
use crate::config::{Config, Paths};
use crate::error::CrmLinkError;
use crate::output::to_json;

/// Execute config subcommands.
///
/// # Errors
///
/// Returns an error if the configuration cannot be read or written.
pub fn config(cmd: ConfigCommands, format: OutputFormat) -> Result<String, CrmLinkError> {
    match cmd {
        ConfigCommands::Show { path } => {
            let config = match path {
                Some(path) => Config::load_from_path(&path)?,
                None => Config::load()?,
            };
            match format {
                OutputFormat::Json => to_json(&config),
                OutputFormat::Pretty => serde_yaml::to_string(&config).map_err(|e| {
                    CrmLinkError::Config(format!("Failed to serialize config: {e}"))
                }),
            }
        }
        ConfigCommands::Init { path } => {
            let config = Config::default();
            let target = match path {
                Some(path) => {
                    config.save_to_path(&path)?;
                    path
                }
                None => {
                    config.save()?;
                    Paths::new()?.config_file
                }
            };
            Ok(format!(
                "{} {}",
                "Wrote default configuration to".green(),
                target.display()
            ))
        }
    }
}
