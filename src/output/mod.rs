//! Output formatting helpers for the crmlink CLI.

use serde::Serialize;

use crate::error::CrmLinkError;

/// Serialize a value as pretty-printed JSON.
///
/// # Errors
///
/// Returns `CrmLinkError::Parse` if serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, CrmLinkError> {
    serde_json::to_string_pretty(value).map_err(CrmLinkError::Parse)
}
