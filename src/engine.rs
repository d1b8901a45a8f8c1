//! The synchronization engine facade.
//!
//! An explicitly constructed service instance owning the task queue, the
//! background worker, and the state table. The host builds exactly one
//! engine, injects it wherever work needs to be enqueued, and keeps the
//! "one worker" rule by construction instead of through a hidden global.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::settings::{ArchiveConfig, Config};
use crate::core::entity::{CrmEntity, CrmId, RemoteEntry};
use crate::core::item::{ItemId, ItemSnapshot, ItemStore};
use crate::crm::client::{CrmClient, CrmTransport};
use crate::error::CrmLinkError;
use crate::features::archive::email::EmailDocument;
use crate::features::archive::reconciler::{ArchiveResult, EmailReconciler};
use crate::features::sync::state::TransmissionState;
use crate::features::sync::synchroniser::Synchroniser;
use crate::features::sync::table::{lock_table, SyncStateTable};
use crate::features::tasks::action::SyncAction;
use crate::features::tasks::queue::TaskQueue;
use crate::features::tasks::worker::{BackgroundWorker, WorkerConfig};

/// The collaborators an action needs while performing.
pub struct EngineContext {
    /// Typed CRM client.
    pub crm: CrmClient,
    /// The groupware item store.
    pub store: Arc<dyn ItemStore>,
    /// Shared sync state table.
    pub states: Arc<Mutex<SyncStateTable>>,
    /// Archival settings.
    pub archive: ArchiveConfig,
}

impl EngineContext {
    /// Lock the shared state table.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub(crate) fn lock_states(&self) -> Result<MutexGuard<'_, SyncStateTable>, CrmLinkError> {
        lock_table(&self.states)
    }
}

/// The background synchronization engine.
///
/// Dropping the engine stops the worker; call [`SyncEngine::prepare_shutdown`]
/// first to drain the queue quickly.
pub struct SyncEngine {
    ctx: Arc<EngineContext>,
    queue: TaskQueue,
    worker: BackgroundWorker,
    synchroniser: Synchroniser,
    max_attempts: u32,
}

impl SyncEngine {
    /// Construct the engine and start its background worker.
    ///
    /// The state table is rebuilt from the persisted links on local items
    /// before the worker starts, so state survives process restarts.
    ///
    /// # Errors
    ///
    /// Returns an error if the item store cannot be scanned or the worker
    /// thread cannot be spawned.
    pub fn start(
        transport: Arc<dyn CrmTransport>,
        store: Arc<dyn ItemStore>,
        config: &Config,
    ) -> Result<Self, CrmLinkError> {
        let states = Arc::new(Mutex::new(SyncStateTable::restore(store.as_ref())?));
        let ctx = Arc::new(EngineContext {
            crm: CrmClient::new(transport),
            store,
            states: states.clone(),
            archive: config.archive.clone(),
        });

        let queue = TaskQueue::new();
        let worker = BackgroundWorker::spawn(
            queue.clone(),
            ctx.clone(),
            WorkerConfig::from(&config.queue),
        )?;

        Ok(Self {
            synchroniser: Synchroniser::new(states, config.queue.max_attempts),
            ctx,
            queue,
            worker,
            max_attempts: config.queue.max_attempts,
        })
    }

    /// Enqueue a prepared action. Never blocks.
    pub fn enqueue(&self, action: SyncAction) {
        self.queue.enqueue(action);
    }

    /// Number of actions currently waiting on the queue.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Reconcile batches of local items and remote entries, enqueueing
    /// whatever push/pull actions come out. Returns the number of actions
    /// enqueued.
    ///
    /// # Errors
    ///
    /// Returns an error if the reconciliation itself detects an invariant
    /// violation; nothing is enqueued in that case.
    pub fn reconcile(
        &self,
        local: &[ItemSnapshot],
        remote: &[RemoteEntry],
        module: &str,
    ) -> Result<usize, CrmLinkError> {
        let actions = self.synchroniser.reconcile(local, remote, module)?;
        let count = actions.len();
        self.queue.enqueue_all(actions);
        Ok(count)
    }

    /// Archive an email synchronously on the caller's thread.
    ///
    /// For user-initiated archiving where the result is shown directly.
    /// Use [`SyncEngine::enqueue_archive`] for fire-and-forget archiving
    /// with retries.
    #[must_use]
    pub fn archive(
        &self,
        email: &EmailDocument,
        explicit: &[CrmEntity],
        excluded: &[String],
    ) -> ArchiveResult {
        EmailReconciler::new(&self.ctx.crm, &self.ctx.archive).archive(email, explicit, excluded)
    }

    /// Queue an email for background archiving with the retry budget.
    pub fn enqueue_archive(
        &self,
        email: EmailDocument,
        explicit: Vec<CrmEntity>,
        excluded: Vec<String>,
    ) {
        self.queue.enqueue(SyncAction::archive_email(
            email,
            explicit,
            excluded,
            self.max_attempts,
        ));
    }

    /// Queue a poll of invitee acceptance status for a transmitted
    /// meeting.
    pub fn enqueue_acceptance_check(&self, item_id: ItemId, meeting_id: CrmId) {
        self.queue.enqueue(SyncAction::check_acceptance(
            item_id,
            meeting_id,
            self.max_attempts,
        ));
    }

    /// The transmission state of a local item, if it is tracked.
    ///
    /// # Errors
    ///
    /// Returns an error if the state table lock is poisoned.
    pub fn transmission_state(
        &self,
        item_id: &str,
    ) -> Result<Option<TransmissionState>, CrmLinkError> {
        Ok(self.ctx.lock_states()?.get(item_id).map(|s| s.state()))
    }

    /// Handle a local deletion: the item's state passes through
    /// `PendingDelete`, is removed from the table, and its persisted link
    /// properties are cleared.
    ///
    /// # Errors
    ///
    /// Returns an error if the state machine rejects the deletion or the
    /// link properties cannot be removed.
    pub fn forget(&self, item_id: &str) -> Result<(), CrmLinkError> {
        {
            let mut table = self.ctx.lock_states()?;
            if let Some(state) = table.get_mut(item_id) {
                state.mark_pending_delete()?;
                table.remove(item_id);
            }
        }
        self.ctx.store.remove_link(item_id)
    }

    /// Shorten the worker's poll interval to drain the queue quickly,
    /// returning the number of actions still outstanding.
    pub fn prepare_shutdown(&self) -> usize {
        self.worker.prepare_shutdown()
    }

    /// Stop the worker and wait for its thread to exit.
    pub fn stop(self) {
        self.worker.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::item::{ItemKind, ItemLink};
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, hour, 0, 0).unwrap()
    }

    /// Minimal in-memory item store for end-to-end tests.
    #[derive(Default)]
    struct MemoryStore {
        items: Mutex<HashMap<ItemId, StoredItem>>,
    }

    struct StoredItem {
        kind: ItemKind,
        modified_at: DateTime<Utc>,
        link: Option<ItemLink>,
        properties: HashMap<String, String>,
    }

    impl MemoryStore {
        fn with_item(self, id: &str, kind: ItemKind, modified_at: DateTime<Utc>) -> Self {
            self.items.lock().unwrap().insert(
                id.to_string(),
                StoredItem {
                    kind,
                    modified_at,
                    link: None,
                    properties: HashMap::new(),
                },
            );
            self
        }

        fn with_linked_item(self, id: &str, link: ItemLink) -> Self {
            self.items.lock().unwrap().insert(
                id.to_string(),
                StoredItem {
                    kind: ItemKind::Contact,
                    modified_at: link.modified_at,
                    link: Some(link),
                    properties: HashMap::new(),
                },
            );
            self
        }

        fn link_of(&self, id: &str) -> Option<ItemLink> {
            self.items.lock().unwrap().get(id).and_then(|i| i.link.clone())
        }

        fn property(&self, id: &str, name: &str) -> Option<String> {
            self.items
                .lock()
                .unwrap()
                .get(id)
                .and_then(|i| i.properties.get(name).cloned())
        }
    }

    impl ItemStore for MemoryStore {
        fn list_ids(&self) -> Result<Vec<ItemId>, CrmLinkError> {
            Ok(self.items.lock().unwrap().keys().cloned().collect())
        }

        fn snapshot(&self, id: &str) -> Result<ItemSnapshot, CrmLinkError> {
            let items = self.items.lock().unwrap();
            let item = items
                .get(id)
                .ok_or_else(|| CrmLinkError::Item(format!("no item {id}")))?;
            Ok(ItemSnapshot {
                id: id.to_string(),
                kind: item.kind,
                modified_at: item.modified_at,
                link: item.link.clone(),
            })
        }

        fn outbound_fields(&self, _id: &str) -> Result<serde_json::Value, CrmLinkError> {
            Ok(json!({"last_name": "Young"}))
        }

        fn apply_remote(&self, entry: &RemoteEntry) -> Result<ItemId, CrmLinkError> {
            let id = format!("local-{}", entry.id);
            self.items.lock().unwrap().insert(
                id.clone(),
                StoredItem {
                    kind: ItemKind::Contact,
                    modified_at: entry.modified_at,
                    link: None,
                    properties: HashMap::new(),
                },
            );
            Ok(id)
        }

        fn read_link(&self, id: &str) -> Result<Option<ItemLink>, CrmLinkError> {
            Ok(self.link_of(id))
        }

        fn write_link(&self, id: &str, link: &ItemLink) -> Result<(), CrmLinkError> {
            let mut items = self.items.lock().unwrap();
            let item = items
                .get_mut(id)
                .ok_or_else(|| CrmLinkError::Item(format!("no item {id}")))?;
            item.link = Some(link.clone());
            Ok(())
        }

        fn remove_link(&self, id: &str) -> Result<(), CrmLinkError> {
            if let Some(item) = self.items.lock().unwrap().get_mut(id) {
                item.link = None;
            }
            Ok(())
        }

        fn set_property(&self, id: &str, name: &str, value: &str) -> Result<(), CrmLinkError> {
            let mut items = self.items.lock().unwrap();
            let item = items
                .get_mut(id)
                .ok_or_else(|| CrmLinkError::Item(format!("no item {id}")))?;
            item.properties.insert(name.to_string(), value.to_string());
            Ok(())
        }
    }

    /// Transport that hands out sequential record ids.
    #[derive(Default)]
    struct StubTransport {
        saves: AtomicUsize,
    }

    impl CrmTransport for StubTransport {
        fn invoke(
            &self,
            method: &str,
            _payload: &serde_json::Value,
        ) -> Result<serde_json::Value, CrmLinkError> {
            match method {
                "set_entry" => {
                    let n = self.saves.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({"id": format!("crm-{n}")}))
                }
                "get_entry_list" => Ok(json!({"entry_list": []})),
                "get_invitee_status" => Ok(json!({
                    "invitees": [{"id": "u-1", "status": "accept"}]
                })),
                _ => Ok(json!({})),
            }
        }
    }

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.queue.poll_interval_ms = 1;
        config.queue.drain_interval_ms = 1;
        config
    }

    fn wait_until(deadline_ms: u64, mut check: impl FnMut() -> bool) -> bool {
        let deadline = std::time::Instant::now() + Duration::from_millis(deadline_ms);
        while std::time::Instant::now() < deadline {
            if check() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        check()
    }

    #[test]
    fn test_reconcile_pushes_new_item_end_to_end() {
        let store = Arc::new(MemoryStore::default().with_item(
            "item-1",
            ItemKind::Contact,
            ts(10),
        ));
        let engine = SyncEngine::start(
            Arc::new(StubTransport::default()),
            store.clone(),
            &fast_config(),
        )
        .unwrap();

        let snapshot = store.snapshot("item-1").unwrap();
        let enqueued = engine.reconcile(&[snapshot], &[], "Contacts").unwrap();
        assert_eq!(enqueued, 1);

        assert!(wait_until(2000, || {
            engine.transmission_state("item-1").unwrap() == Some(TransmissionState::Synced)
        }));
        let link = store.link_of("item-1").unwrap();
        assert_eq!(link.module, "Contacts");

        assert_eq!(engine.prepare_shutdown(), 0);
        engine.stop();
    }

    #[test]
    fn test_state_survives_restart_via_item_properties() {
        let link = ItemLink {
            crm_id: CrmId::from_raw("abc").unwrap(),
            module: "Contacts".to_string(),
            modified_at: ts(9),
        };
        let store = Arc::new(MemoryStore::default().with_linked_item("item-1", link));
        let engine = SyncEngine::start(
            Arc::new(StubTransport::default()),
            store,
            &fast_config(),
        )
        .unwrap();

        // The table was rebuilt from the persisted properties.
        assert_eq!(
            engine.transmission_state("item-1").unwrap(),
            Some(TransmissionState::Synced)
        );
        engine.stop();
    }

    #[test]
    fn test_forget_unlinks_item() {
        let link = ItemLink {
            crm_id: CrmId::from_raw("abc").unwrap(),
            module: "Contacts".to_string(),
            modified_at: ts(9),
        };
        let store = Arc::new(MemoryStore::default().with_linked_item("item-1", link));
        let engine = SyncEngine::start(
            Arc::new(StubTransport::default()),
            store.clone(),
            &fast_config(),
        )
        .unwrap();

        engine.forget("item-1").unwrap();
        assert_eq!(engine.transmission_state("item-1").unwrap(), None);
        assert!(store.link_of("item-1").is_none());
        engine.stop();
    }

    #[test]
    fn test_acceptance_check_annotates_item() {
        let store = Arc::new(MemoryStore::default().with_item(
            "meeting-1",
            ItemKind::Appointment,
            ts(10),
        ));
        let engine = SyncEngine::start(
            Arc::new(StubTransport::default()),
            store.clone(),
            &fast_config(),
        )
        .unwrap();

        engine.enqueue_acceptance_check(
            "meeting-1".to_string(),
            CrmId::from_raw("m-9").unwrap(),
        );

        assert!(wait_until(2000, || {
            store
                .property("meeting-1", "crmlink.acceptance.u-1")
                .is_some()
        }));
        assert_eq!(
            store.property("meeting-1", "crmlink.acceptance.u-1").unwrap(),
            "accept"
        );
        engine.stop();
    }

    #[test]
    fn test_direct_archive_of_unrelated_email_is_quiet_failure() {
        let store = Arc::new(MemoryStore::default());
        let engine = SyncEngine::start(
            Arc::new(StubTransport::default()),
            store,
            &fast_config(),
        )
        .unwrap();

        let email = EmailDocument {
            item_id: None,
            from: vec!["a@x.com".to_string()],
            to: vec!["b@y.com".to_string()],
            cc: Vec::new(),
            subject: "hello".to_string(),
            text_body: String::new(),
            html_body: None,
            sent_at: ts(10),
            attachments: Vec::new(),
            crm_id: None,
        };
        let result = engine.archive(&email, &[], &[]);
        assert!(!result.is_success());
        assert!(result.is_unrelated());
        engine.stop();
    }
}
