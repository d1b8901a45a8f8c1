//! The email representation handed to the archiver.
//!
//! A value snapshot of what the groupware client knows about a message;
//! the engine never reaches back into the client's message object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::CrmId;
use crate::core::item::ItemId;

/// An attachment carried by an email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailAttachment {
    /// File name as shown to the user.
    pub name: String,
    /// Raw attachment bytes.
    #[serde(default)]
    pub content: Vec<u8>,
}

/// A snapshot of an email to archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailDocument {
    /// The groupware item this email came from, if any.
    #[serde(default)]
    pub item_id: Option<ItemId>,
    /// Sender addresses.
    #[serde(default)]
    pub from: Vec<String>,
    /// Recipient addresses.
    #[serde(default)]
    pub to: Vec<String>,
    /// Carbon-copy addresses.
    #[serde(default)]
    pub cc: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    #[serde(default)]
    pub text_body: String,
    /// Rich HTML body, if the message has one.
    #[serde(default)]
    pub html_body: Option<String>,
    /// When the message was sent.
    pub sent_at: DateTime<Utc>,
    /// Attachments to upload alongside the record.
    #[serde(default)]
    pub attachments: Vec<EmailAttachment>,
    /// The CRM record id from a previous archival, if any.
    #[serde(default)]
    pub crm_id: Option<CrmId>,
}

impl EmailDocument {
    /// All addresses the message touches, in From/To/CC order.
    pub fn all_addresses(&self) -> impl Iterator<Item = &str> {
        self.from
            .iter()
            .chain(self.to.iter())
            .chain(self.cc.iter())
            .map(String::as_str)
    }
}
