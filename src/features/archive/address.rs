//! Email address normalization and exclusion matching.
//!
//! Addresses arrive in whatever shape the groupware client stores them:
//! bare (`user@host`), display form (`Jane Young <user@host>`), mixed
//! case, padded with whitespace. Matching against the CRM and against
//! exclusion lists is done on a normalized form.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::features::archive::email::EmailDocument;

static ANGLE_ADDR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<\s*([^<>\s]+@[^<>\s]+)\s*>")
        .unwrap_or_else(|e| panic!("Invalid address regex: {e}"))
});

/// Normalize a raw address: extract the addr-spec from a display form,
/// trim whitespace, and lowercase. Returns `None` for anything that does
/// not look like an address.
#[must_use]
pub fn normalize(raw: &str) -> Option<String> {
    let candidate = ANGLE_ADDR
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map_or_else(|| raw.trim(), |m| m.as_str());

    let candidate = candidate.trim().to_lowercase();
    if candidate.is_empty() || !candidate.contains('@') {
        return None;
    }
    Some(candidate)
}

/// Collect the distinct, normalized addresses of an email, skipping those
/// on the exclusion list. Order of first appearance is preserved.
#[must_use]
pub fn collect_addresses(email: &EmailDocument, excluded: &[String]) -> Vec<String> {
    let excluded: HashSet<String> = excluded.iter().filter_map(|a| normalize(a)).collect();

    let mut seen = HashSet::new();
    let mut addresses = Vec::new();
    for raw in email.all_addresses() {
        let Some(address) = normalize(raw) else {
            continue;
        };
        if excluded.contains(&address) {
            log::debug!("address {address} is excluded from archival matching");
            continue;
        }
        if seen.insert(address.clone()) {
            addresses.push(address);
        }
    }
    addresses
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn email(from: &[&str], to: &[&str], cc: &[&str]) -> EmailDocument {
        EmailDocument {
            item_id: None,
            from: from.iter().map(ToString::to_string).collect(),
            to: to.iter().map(ToString::to_string).collect(),
            cc: cc.iter().map(ToString::to_string).collect(),
            subject: "test".to_string(),
            text_body: String::new(),
            html_body: None,
            sent_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
            attachments: Vec::new(),
            crm_id: None,
        }
    }

    #[test]
    fn test_normalize_display_form() {
        assert_eq!(
            normalize("Jane Young <Jane.Young@Example.COM>"),
            Some("jane.young@example.com".to_string())
        );
        assert_eq!(normalize("  a@x.com  "), Some("a@x.com".to_string()));
        assert_eq!(normalize("not an address"), None);
        assert_eq!(normalize(""), None);
    }

    #[test]
    fn test_collect_deduplicates() {
        let email = email(&["a@x.com"], &["b@y.com", "A@X.com"], &["b@y.com"]);
        let addresses = collect_addresses(&email, &[]);
        assert_eq!(addresses, vec!["a@x.com", "b@y.com"]);
    }

    #[test]
    fn test_collect_respects_exclusions() {
        let email = email(&["a@x.com"], &["b@y.com"], &[]);
        let addresses = collect_addresses(&email, &[" A@x.COM ".to_string()]);
        assert_eq!(addresses, vec!["b@y.com"]);
    }
}
