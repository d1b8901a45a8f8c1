//! Configuration settings for crmlink.
//!
//! Settings are loaded from `~/.crmlink/config.yaml`.

use serde::{Deserialize, Serialize};

use crate::config::Paths;
use crate::error::CrmLinkError;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Background queue settings.
    pub queue: QueueConfig,
    /// Email archival settings.
    pub archive: ArchiveConfig,
}

/// Background queue and worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Worker tick period in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Shortened tick period while draining for shutdown, in milliseconds.
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,
    /// Attempt budget for each queued action.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// Email archival settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// CRM modules searched when matching email addresses.
    #[serde(default = "default_search_modules")]
    pub search_modules: Vec<String>,
    /// Addresses never used for relationship matching (e.g. the user's
    /// own address, mailing lists).
    #[serde(default)]
    pub excluded_addresses: Vec<String>,
    /// Whether to include the HTML body when archiving.
    #[serde(default = "default_true")]
    pub keep_html: bool,
}

// Default value functions for serde
const fn default_poll_interval_ms() -> u64 {
    2000
}

const fn default_drain_interval_ms() -> u64 {
    200
}

const fn default_max_attempts() -> u32 {
    5
}

const fn default_true() -> bool {
    true
}

fn default_search_modules() -> Vec<String> {
    vec![
        "Contacts".to_string(),
        "Leads".to_string(),
        "Accounts".to_string(),
    ]
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            drain_interval_ms: default_drain_interval_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            search_modules: default_search_modules(),
            excluded_addresses: Vec::new(),
            keep_html: default_true(),
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self, CrmLinkError> {
        let paths = Paths::new()?;
        Self::load_from_path(&paths.config_file)
    }

    /// Load configuration from a specific path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load_from_path(path: &std::path::Path) -> Result<Self, CrmLinkError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            CrmLinkError::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        serde_yaml::from_str(&contents).map_err(|e| {
            CrmLinkError::Config(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })
    }

    /// Save configuration to the default path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save(&self) -> Result<(), CrmLinkError> {
        let paths = Paths::new()?;
        paths.ensure_dirs()?;
        self.save_to_path(&paths.config_file)
    }

    /// Save configuration to a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save_to_path(&self, path: &std::path::Path) -> Result<(), CrmLinkError> {
        let contents = serde_yaml::to_string(self)
            .map_err(|e| CrmLinkError::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, contents).map_err(|e| {
            CrmLinkError::Config(format!(
                "Failed to write config file {}: {e}",
                path.display()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.queue.poll_interval_ms, 2000);
        assert_eq!(config.queue.drain_interval_ms, 200);
        assert_eq!(config.queue.max_attempts, 5);
        assert_eq!(config.archive.search_modules.len(), 3);
        assert!(config.archive.keep_html);
    }

    #[test]
    fn test_load_missing_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let config = Config::load_from_path(&config_path).unwrap();

        // Should return defaults when file doesn't exist
        assert_eq!(config.queue.max_attempts, 5);
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut config = Config::default();
        config.queue.poll_interval_ms = 500;
        config.archive.excluded_addresses = vec!["me@corp.example".to_string()];

        config.save_to_path(&config_path).unwrap();

        let loaded = Config::load_from_path(&config_path).unwrap();

        assert_eq!(loaded.queue.poll_interval_ms, 500);
        assert_eq!(
            loaded.archive.excluded_addresses,
            vec!["me@corp.example".to_string()]
        );
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        // Write a partial config (only some fields)
        let partial_yaml = r"
queue:
  max_attempts: 8
";
        std::fs::write(&config_path, partial_yaml).unwrap();

        let config = Config::load_from_path(&config_path).unwrap();

        // Custom value should be loaded
        assert_eq!(config.queue.max_attempts, 8);
        // Defaults should be used for missing fields
        assert_eq!(config.queue.poll_interval_ms, 2000);
        assert!(config.archive.keep_html);
    }
}
