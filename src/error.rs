//! Error types for crmlink.
//!
//! A single crate-wide error enum, classified along the boundaries the
//! background worker cares about: transient failures worth re-queueing,
//! per-action failures that exhaust a retry budget, and invariant
//! violations that indicate a bug in the reconciliation logic itself and
//! are never retried or shown to the user.

use thiserror::Error;

use crate::features::sync::state::TransmissionState;

/// Errors that can occur in crmlink.
#[derive(Error, Debug)]
pub enum CrmLinkError {
    /// Connection-level failure talking to the CRM (timeout, refused, DNS).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The CRM accepted the request but rejected it with a fault.
    #[error("Server error [{code}] {name}: {description}")]
    Server {
        /// Server-supplied fault code.
        code: String,
        /// Server-supplied fault name.
        name: String,
        /// Server-supplied human-readable description.
        description: String,
    },

    /// Configuration file or settings problem.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The groupware item store refused or failed an operation.
    #[error("Item store error: {0}")]
    Item(String),

    /// Email archival failed after the save/retry/fallback protocol.
    #[error("Email archive failed: {0}")]
    Archive(String),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Parse(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A transmission state transition not permitted by the state machine.
    ///
    /// This is a programming-error-class failure: it means the
    /// reconciliation logic attempted something the machine forbids, not
    /// that the user's data or network is at fault.
    #[error("Illegal transmission state transition: {from} -> {to}")]
    BadStateTransition {
        /// State the record was in.
        from: TransmissionState,
        /// State the caller tried to move to.
        to: TransmissionState,
    },

    /// Two distinct local items claim the same CRM record.
    #[error("Duplicate CRM id {id} in module {module}")]
    DuplicateCrmId {
        /// CRM module the id belongs to.
        module: String,
        /// The contested record id.
        id: String,
    },
}

impl CrmLinkError {
    /// Whether this error indicates a broken invariant in the
    /// reconciliation logic rather than a data or network problem.
    ///
    /// Invariant violations are logged at error level, never retried, and
    /// never surfaced to the end user.
    #[must_use]
    pub const fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::BadStateTransition { .. } | Self::DuplicateCrmId { .. }
        )
    }

    /// Whether this error class is generally worth retrying.
    ///
    /// Transport failures are transient by nature; server faults are
    /// action-specific but still consume the action's attempt budget
    /// rather than being dropped immediately.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Server { .. } | Self::Io(_) | Self::Item(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invariant_classification() {
        let bad = CrmLinkError::BadStateTransition {
            from: TransmissionState::Synced,
            to: TransmissionState::New,
        };
        assert!(bad.is_invariant_violation());
        assert!(!bad.is_retryable());

        let dup = CrmLinkError::DuplicateCrmId {
            module: "Contacts".to_string(),
            id: "abc".to_string(),
        };
        assert!(dup.is_invariant_violation());
    }

    #[test]
    fn test_retryable_classification() {
        let transport = CrmLinkError::Transport("connection refused".to_string());
        assert!(transport.is_retryable());
        assert!(!transport.is_invariant_violation());

        let config = CrmLinkError::Config("missing file".to_string());
        assert!(!config.is_retryable());
    }

    #[test]
    fn test_display_carries_transition_pair() {
        let err = CrmLinkError::BadStateTransition {
            from: TransmissionState::New,
            to: TransmissionState::Synced,
        };
        let msg = err.to_string();
        assert!(msg.contains("new"));
        assert!(msg.contains("synced"));
    }
}
