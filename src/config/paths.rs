//! Path resolution for crmlink configuration files.
//!
//! All crmlink data is stored in `~/.crmlink/`:
//! - `config.yaml` - Main configuration file

use std::path::PathBuf;

use crate::error::CrmLinkError;

/// Paths to crmlink configuration files.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Root directory: `~/.crmlink/`
    pub root: PathBuf,
    /// Config file: `~/.crmlink/config.yaml`
    pub config_file: PathBuf,
}

impl Paths {
    /// Create paths based on the user's home directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self, CrmLinkError> {
        let home = std::env::var("HOME")
            .map_err(|_| CrmLinkError::Config("Could not determine home directory".to_string()))?;

        let root = PathBuf::from(home).join(".crmlink");

        Ok(Self {
            config_file: root.join("config.yaml"),
            root,
        })
    }

    /// Create paths with a custom root directory (useful for testing).
    #[must_use]
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            config_file: root.join("config.yaml"),
            root,
        }
    }

    /// Ensure the root directory exists, creating it if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn ensure_dirs(&self) -> Result<(), CrmLinkError> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root).map_err(|e| {
                CrmLinkError::Config(format!("Failed to create directory {:?}: {}", self.root, e))
            })?;
        }
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| {
            // Fallback to current directory if home cannot be determined
            Self::with_root(PathBuf::from(".crmlink"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_with_root() {
        let root = PathBuf::from("/tmp/test-crmlink");
        let paths = Paths::with_root(root.clone());

        assert_eq!(paths.root, root);
        assert_eq!(paths.config_file, root.join("config.yaml"));
    }

    #[test]
    fn test_ensure_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let paths = Paths::with_root(temp_dir.path().join("nested"));

        paths.ensure_dirs().unwrap();
        assert!(paths.root.exists());
    }
}
