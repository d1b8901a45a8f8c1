//! The reconciliation algorithm.
//!
//! Given a batch of local item snapshots and a batch of remote entries,
//! the synchroniser decides what must be pushed, pulled, or is already
//! consistent, marks the affected states `Queued`, and emits the
//! corresponding retryable actions. Conflicts are resolved last-writer-
//! wins by modification timestamp; equal timestamps are treated as
//! already consistent and produce no traffic.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::core::entity::RemoteEntry;
use crate::core::item::ItemSnapshot;
use crate::error::CrmLinkError;
use crate::features::sync::state::TransmissionState;
use crate::features::sync::table::{lock_table, SyncStateTable};
use crate::features::tasks::action::SyncAction;

/// Which direction a changed item must travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Push,
    Pull,
}

/// Decides push/pull/consistent for batches of local and remote records.
pub struct Synchroniser {
    states: Arc<Mutex<SyncStateTable>>,
    max_attempts: u32,
}

impl Synchroniser {
    /// Create a synchroniser over a shared state table.
    #[must_use]
    pub const fn new(states: Arc<Mutex<SyncStateTable>>, max_attempts: u32) -> Self {
        Self {
            states,
            max_attempts,
        }
    }

    /// Compute the actions needed to bring both sides into agreement.
    ///
    /// Local items are observed first (creating `New` or `Synced` states
    /// as appropriate), then each side's changes are weighed against the
    /// last agreed modification time. Items already `Queued` are skipped:
    /// an action for them is in flight.
    ///
    /// # Errors
    ///
    /// Returns [`CrmLinkError::DuplicateCrmId`] if two local items claim
    /// the same remote record, or [`CrmLinkError::BadStateTransition`] if
    /// the state machine rejects a queueing operation. Both indicate a
    /// logic error, not bad user data.
    pub fn reconcile(
        &self,
        local: &[ItemSnapshot],
        remote: &[RemoteEntry],
        module: &str,
    ) -> Result<Vec<SyncAction>, CrmLinkError> {
        let mut table = lock_table(&self.states)?;
        let remote_by_id: HashMap<&str, &RemoteEntry> = remote
            .iter()
            .map(|entry| (entry.id.as_str(), entry))
            .collect();

        for snapshot in local {
            table.observe(snapshot)?;
        }

        let mut actions = Vec::new();
        let mut matched: HashSet<&str> = HashSet::new();

        for snapshot in local {
            let Some(state) = table.get(&snapshot.id) else {
                continue;
            };
            let current = state.state();
            let baseline = state.modified_at();
            let crm_id = state.crm_id().cloned();

            let entry = crm_id
                .as_ref()
                .and_then(|id| remote_by_id.get(id.as_str()).copied());
            if let Some(entry) = entry {
                matched.insert(entry.id.as_str());
            }

            match current {
                TransmissionState::New => {
                    if let Some(state) = table.get_mut(&snapshot.id) {
                        state.begin_transmit_new()?;
                    }
                    actions.push(SyncAction::transmit_new(snapshot, module, self.max_attempts));
                }
                TransmissionState::Synced => {
                    let local_changed = snapshot.modified_at > baseline;
                    let remote_changed = entry.is_some_and(|e| e.modified_at > baseline);

                    let direction = match (local_changed, remote_changed, entry) {
                        (true, false, _) => Some(Direction::Push),
                        (false, true, Some(_)) => Some(Direction::Pull),
                        (true, true, Some(entry)) => {
                            Self::resolve_conflict(snapshot, entry)
                        }
                        _ => None,
                    };

                    match direction {
                        Some(Direction::Push) => {
                            if let Some(state) = table.get_mut(&snapshot.id) {
                                state.begin_transmit_update()?;
                            }
                            actions.push(SyncAction::transmit_update(
                                snapshot,
                                module,
                                self.max_attempts,
                            ));
                        }
                        Some(Direction::Pull) => {
                            if let Some(entry) = entry {
                                if let Some(state) = table.get_mut(&snapshot.id) {
                                    state.begin_pull()?;
                                }
                                actions.push(SyncAction::pull_update(
                                    snapshot.id.clone(),
                                    entry.clone(),
                                    self.max_attempts,
                                ));
                            }
                        }
                        None => {}
                    }
                }
                TransmissionState::Queued => {
                    log::debug!("item {} already queued, skipping", snapshot.id);
                }
                TransmissionState::PendingDelete | TransmissionState::Invalid => {}
            }
        }

        // Remote entries not covered by the local pass: unknown records
        // are materialized locally; known records whose item was absent
        // from this batch may still need a pull.
        for entry in remote {
            if matched.contains(entry.id.as_str()) {
                continue;
            }
            match table.find_by_crm(&entry.module, &entry.id).cloned() {
                None => {
                    actions.push(SyncAction::materialize(entry.clone(), self.max_attempts));
                }
                Some(local_id) => {
                    let needs_pull = table.get(&local_id).is_some_and(|state| {
                        state.state() == TransmissionState::Synced
                            && entry.modified_at > state.modified_at()
                    });
                    if needs_pull {
                        if let Some(state) = table.get_mut(&local_id) {
                            state.begin_pull()?;
                        }
                        actions.push(SyncAction::pull_update(
                            local_id,
                            entry.clone(),
                            self.max_attempts,
                        ));
                    }
                }
            }
        }

        Ok(actions)
    }

    /// Both sides changed since the last agreement: the later timestamp
    /// wins and becomes the transfer direction. A tie means consistent.
    ///
    /// The losing side's edit is discarded; without vector clocks there
    /// is no merge to offer.
    fn resolve_conflict(snapshot: &ItemSnapshot, entry: &RemoteEntry) -> Option<Direction> {
        if snapshot.modified_at > entry.modified_at {
            log::debug!(
                "conflict on item {}: local edit wins, remote edit from {} discarded",
                snapshot.id,
                entry.modified_at
            );
            Some(Direction::Push)
        } else if entry.modified_at > snapshot.modified_at {
            log::debug!(
                "conflict on item {}: remote edit wins, local edit from {} discarded",
                snapshot.id,
                snapshot.modified_at
            );
            Some(Direction::Pull)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::CrmId;
    use crate::core::item::{ItemKind, ItemLink};
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, hour, 0, 0).unwrap()
    }

    fn crm(raw: &str) -> CrmId {
        CrmId::from_raw(raw).unwrap()
    }

    fn synchroniser() -> (Synchroniser, Arc<Mutex<SyncStateTable>>) {
        let states = Arc::new(Mutex::new(SyncStateTable::new()));
        (Synchroniser::new(states.clone(), 3), states)
    }

    fn fresh(id: &str, modified: DateTime<Utc>) -> ItemSnapshot {
        ItemSnapshot {
            id: id.to_string(),
            kind: ItemKind::Contact,
            modified_at: modified,
            link: None,
        }
    }

    fn linked(id: &str, crm_id: &str, agreed: DateTime<Utc>, modified: DateTime<Utc>) -> ItemSnapshot {
        ItemSnapshot {
            id: id.to_string(),
            kind: ItemKind::Contact,
            modified_at: modified,
            link: Some(ItemLink {
                crm_id: crm(crm_id),
                module: "Contacts".to_string(),
                modified_at: agreed,
            }),
        }
    }

    fn entry(id: &str, modified: DateTime<Utc>) -> RemoteEntry {
        RemoteEntry {
            id: crm(id),
            module: "Contacts".to_string(),
            modified_at: modified,
            fields: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_fresh_items_produce_exactly_one_transmit_new() {
        let (sync, states) = synchroniser();
        let local = vec![fresh("item-1", ts(10)), fresh("item-2", ts(10))];

        let actions = sync.reconcile(&local, &[], "Contacts").unwrap();
        assert_eq!(actions.len(), 2);
        assert!(actions.iter().all(|a| a.kind_name() == "transmit_new"));

        let table = states.lock().unwrap();
        assert_eq!(
            table.get("item-1").unwrap().state(),
            TransmissionState::Queued
        );

        // A second observation sees the items queued and emits nothing.
        drop(table);
        let again = sync.reconcile(&local, &[], "Contacts").unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn test_local_edit_produces_update() {
        let (sync, _) = synchroniser();
        let local = vec![linked("item-1", "abc", ts(9), ts(10))];
        let remote = vec![entry("abc", ts(9))];

        let actions = sync.reconcile(&local, &remote, "Contacts").unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind_name(), "transmit_update");
    }

    #[test]
    fn test_remote_edit_produces_pull() {
        let (sync, _) = synchroniser();
        let local = vec![linked("item-1", "abc", ts(9), ts(9))];
        let remote = vec![entry("abc", ts(11))];

        let actions = sync.reconcile(&local, &remote, "Contacts").unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind_name(), "pull_update");
    }

    #[test]
    fn test_conflict_later_timestamp_wins() {
        // Both sides changed; local is later, so it pushes.
        let (sync, _) = synchroniser();
        let local = vec![linked("item-1", "abc", ts(9), ts(12))];
        let remote = vec![entry("abc", ts(11))];

        let actions = sync.reconcile(&local, &remote, "Contacts").unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind_name(), "transmit_update");

        // Remote later: pull.
        let (sync, _) = synchroniser();
        let local = vec![linked("item-1", "abc", ts(9), ts(11))];
        let remote = vec![entry("abc", ts(12))];

        let actions = sync.reconcile(&local, &remote, "Contacts").unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind_name(), "pull_update");
    }

    #[test]
    fn test_equal_timestamps_are_consistent() {
        let (sync, _) = synchroniser();
        let local = vec![linked("item-1", "abc", ts(9), ts(11))];
        let remote = vec![entry("abc", ts(11))];

        let actions = sync.reconcile(&local, &remote, "Contacts").unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn test_unknown_remote_entry_is_materialized() {
        let (sync, _) = synchroniser();
        let remote = vec![entry("abc", ts(11))];

        let actions = sync.reconcile(&[], &remote, "Contacts").unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind_name(), "materialize_local");
    }

    #[test]
    fn test_remote_change_pulls_even_without_local_snapshot() {
        let (sync, states) = synchroniser();
        // First pass registers the linked item.
        let local = vec![linked("item-1", "abc", ts(9), ts(9))];
        sync.reconcile(&local, &[], "Contacts").unwrap();

        // Later pass sees only the changed remote side.
        let remote = vec![entry("abc", ts(11))];
        let actions = sync.reconcile(&[], &remote, "Contacts").unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind_name(), "pull_update");

        let table = states.lock().unwrap();
        assert_eq!(
            table.get("item-1").unwrap().state(),
            TransmissionState::Queued
        );
    }

    #[test]
    fn test_duplicate_crm_claim_aborts_reconcile() {
        let (sync, _) = synchroniser();
        let local = vec![
            linked("item-1", "abc", ts(9), ts(9)),
            linked("item-2", "abc", ts(9), ts(9)),
        ];

        let err = sync.reconcile(&local, &[], "Contacts").unwrap_err();
        assert!(matches!(err, CrmLinkError::DuplicateCrmId { .. }));
    }
}
