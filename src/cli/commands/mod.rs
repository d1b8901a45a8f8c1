//! Command implementations for the crmlink CLI.

mod archive;
mod config;
mod plan;

pub use archive::archive_plan;
pub use config::config;
pub use plan::plan;

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::CrmLinkError;

/// Load and parse a JSON snapshot file.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CrmLinkError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        CrmLinkError::Config(format!("Failed to read {}: {e}", path.display()))
    })?;
    serde_json::from_str(&contents).map_err(CrmLinkError::Parse)
}
