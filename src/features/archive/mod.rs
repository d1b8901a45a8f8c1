//! Email archival: resolving related CRM records and persisting emails
//! exactly once.
//!
//! Archival is a user-visible operation with partial-failure semantics:
//! the email record itself must be created exactly once (with a plain-text
//! fallback when rich content is rejected), while relationship and
//! attachment linking is best-effort and reported rather than fatal.

pub mod address;
pub mod email;
pub mod reconciler;

pub use email::{EmailAttachment, EmailDocument};
pub use reconciler::{ArchiveProblem, ArchiveResult, EmailReconciler, EMAIL_MODULE};
