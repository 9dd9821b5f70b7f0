//! Auto-save coordinator: debounced and immediate draft saves for one wizard
//! session.
//!
//! Every key has a slot holding the latest in-memory record, a revision
//! counter, and at most one pending debounce timer. A timer is a spawned task
//! racing `tokio::time::sleep_until` against a `CancellationToken`; resetting
//! or clearing a key cancels the token.
//!
//! All physical writes and clears for the session go through one async
//! mutex. A write snapshots the slot under that mutex and bails out if the
//! slot is gone or was replaced, so a clear can never be undone by a save
//! that was scheduled before it.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use tutorhub_types::config::AutoSaveConfig;
use tutorhub_types::draft::{DraftKey, DraftRecord};
use tutorhub_types::event::SaveStatus;
use tutorhub_types::form::FormDefinition;

use crate::draft::{DraftStore, SaveOutcome};
use crate::repository::draft::DraftRepository;

use super::unload::UnloadGuard;

/// Default debounce delay.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1_000);

const STORAGE_UNAVAILABLE_MESSAGE: &str =
    "draft storage is unavailable; changes are kept in memory only";

static NEXT_SLOT_ID: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// Per-key slot
// ---------------------------------------------------------------------------

struct KeySlot {
    /// Unique per slot instance; a cleared and re-created key gets a new id.
    id: u64,
    latest: DraftRecord,
    revision: u64,
    persisted_revision: u64,
    timer: Option<CancellationToken>,
}

impl KeySlot {
    fn new(record: DraftRecord) -> Self {
        Self {
            id: NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed),
            latest: record,
            revision: 0,
            persisted_revision: 0,
            timer: None,
        }
    }

    fn is_dirty(&self) -> bool {
        self.revision > self.persisted_revision
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

/// Resets `is_saving` on every exit path of a write.
struct SavingGuard<'a> {
    status: &'a watch::Sender<SaveStatus>,
}

impl<'a> SavingGuard<'a> {
    fn start(status: &'a watch::Sender<SaveStatus>) -> Self {
        status.send_modify(|s| s.is_saving = true);
        Self { status }
    }
}

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        self.status.send_modify(|s| s.is_saving = false);
    }
}

// ---------------------------------------------------------------------------
// AutoSaveCoordinator
// ---------------------------------------------------------------------------

struct Inner<R> {
    store: DraftStore<R>,
    debounce: Duration,
    critical_fields: HashSet<String>,
    slots: DashMap<DraftKey, KeySlot>,
    write_lock: Mutex<()>,
    status: watch::Sender<SaveStatus>,
}

/// Owns the save policy for one wizard session.
///
/// Cheap to clone; clones share the same slots, timers, and status.
pub struct AutoSaveCoordinator<R> {
    inner: Arc<Inner<R>>,
}

impl<R> Clone for AutoSaveCoordinator<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: DraftRepository + 'static> AutoSaveCoordinator<R> {
    pub fn new(
        store: DraftStore<R>,
        debounce: Duration,
        critical_fields: impl IntoIterator<Item = String>,
    ) -> Self {
        let (status, _) = watch::channel(SaveStatus::default());
        Self {
            inner: Arc::new(Inner {
                store,
                debounce,
                critical_fields: critical_fields.into_iter().collect(),
                slots: DashMap::new(),
                write_lock: Mutex::new(()),
                status,
            }),
        }
    }

    /// Build a coordinator whose critical fields are the form's own plus any
    /// configured extras.
    pub fn from_config(store: DraftStore<R>, config: &AutoSaveConfig, form: &FormDefinition) -> Self {
        let critical = form
            .critical_fields
            .iter()
            .chain(config.critical_fields.iter())
            .cloned();
        Self::new(store, Duration::from_millis(config.debounce_ms), critical)
    }

    pub fn store(&self) -> &DraftStore<R> {
        &self.inner.store
    }

    pub fn debounce(&self) -> Duration {
        self.inner.debounce
    }

    pub fn is_critical(&self, field: &str) -> bool {
        self.inner.critical_fields.contains(field)
    }

    // -----------------------------------------------------------------------
    // Save policy
    // -----------------------------------------------------------------------

    /// Schedule a save of `record` once edits to its key go quiet.
    ///
    /// Each call resets the key's timer; only the last record of a burst is
    /// written.
    pub fn debounced_save(&self, record: DraftRecord) {
        let key = record.key.clone();
        let token = CancellationToken::new();
        {
            let mut slot = self.stage(record);
            slot.cancel_timer();
            slot.timer = Some(token.clone());
        }

        let deadline = Instant::now() + self.inner.debounce;
        let coordinator = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => coordinator.fire(&key, &token).await,
            }
        });
    }

    /// Save now if `field` is critical, otherwise debounce.
    ///
    /// Returns `None` when the save was deferred.
    pub async fn immediate_save(&self, field: &str, record: DraftRecord) -> Option<SaveOutcome> {
        if !self.is_critical(field) {
            self.debounced_save(record);
            return None;
        }
        debug!(key = %record.key, field = %field, "critical field changed, saving immediately");
        Some(self.save(record).await)
    }

    /// Save `record` unconditionally, superseding any pending timer.
    pub async fn save(&self, record: DraftRecord) -> SaveOutcome {
        let key = record.key.clone();
        {
            let mut slot = self.stage(record);
            slot.cancel_timer();
        }
        self.persist(&key).await.unwrap_or(SaveOutcome::Skipped)
    }

    /// Save every key whose latest data has not been persisted yet.
    ///
    /// Returns the number of keys written.
    pub async fn flush(&self) -> usize {
        let dirty: Vec<DraftKey> = self
            .inner
            .slots
            .iter_mut()
            .filter_map(|mut slot| {
                if !slot.is_dirty() {
                    return None;
                }
                slot.cancel_timer();
                Some(slot.key().clone())
            })
            .collect();

        let mut saved = 0;
        for key in &dirty {
            if matches!(self.persist(key).await, Some(outcome) if outcome.is_saved()) {
                saved += 1;
            }
        }
        if !dirty.is_empty() {
            debug!(dirty = dirty.len(), saved, "flushed pending drafts");
        }
        saved
    }

    /// Arm unload protection for this session.
    pub fn protect_unload(&self) -> UnloadGuard<R> {
        UnloadGuard::new(self.clone())
    }

    // -----------------------------------------------------------------------
    // Clear
    // -----------------------------------------------------------------------

    /// Cancel any pending save for `key`, forget its data, and delete the
    /// stored draft.
    pub async fn clear(&self, key: &DraftKey) -> bool {
        if let Some((_, mut slot)) = self.inner.slots.remove(key) {
            slot.cancel_timer();
        }
        let _write = self.inner.write_lock.lock().await;
        self.inner.store.clear(key).await
    }

    /// Clear every step of `form`. Returns the number of stored drafts removed.
    pub async fn clear_form(&self, form: &str) -> usize {
        self.inner.slots.retain(|key, slot| {
            if key.form == form {
                slot.cancel_timer();
                false
            } else {
                true
            }
        });
        let _write = self.inner.write_lock.lock().await;
        self.inner.store.clear_form(form).await
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Latest in-memory record for `key`, saved or not.
    pub fn latest(&self, key: &DraftKey) -> Option<DraftRecord> {
        self.inner.slots.get(key).map(|slot| slot.latest.clone())
    }

    /// Whether a debounce timer is pending for `key`.
    pub fn has_pending(&self, key: &DraftKey) -> bool {
        self.inner
            .slots
            .get(key)
            .is_some_and(|slot| slot.timer.is_some())
    }

    pub fn is_dirty(&self, key: &DraftKey) -> bool {
        self.inner.slots.get(key).is_some_and(|slot| slot.is_dirty())
    }

    pub fn status(&self) -> SaveStatus {
        self.inner.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SaveStatus> {
        self.inner.status.subscribe()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn stage(&self, record: DraftRecord) -> dashmap::mapref::one::RefMut<'_, DraftKey, KeySlot> {
        let mut slot = self
            .inner
            .slots
            .entry(record.key.clone())
            .or_insert_with(|| KeySlot::new(record.clone()));
        slot.latest = record;
        slot.revision += 1;
        slot
    }

    async fn fire(&self, key: &DraftKey, token: &CancellationToken) {
        {
            let Some(mut slot) = self.inner.slots.get_mut(key) else {
                return;
            };
            // A reset or clear cancels the token while holding the slot.
            if token.is_cancelled() {
                return;
            }
            slot.timer = None;
        }
        self.persist(key).await;
    }

    async fn persist(&self, key: &DraftKey) -> Option<SaveOutcome> {
        let _write = self.inner.write_lock.lock().await;

        let (slot_id, record, revision) = {
            let slot = self.inner.slots.get(key)?;
            (slot.id, slot.latest.clone(), slot.revision)
        };

        let outcome = {
            let _saving = SavingGuard::start(&self.inner.status);
            self.inner.store.save(&record).await
        };

        if outcome.is_saved() {
            if let Some(mut slot) = self.inner.slots.get_mut(key) {
                if slot.id == slot_id {
                    slot.persisted_revision = slot.persisted_revision.max(revision);
                }
            }
        }
        self.record_outcome(key, &outcome);
        Some(outcome)
    }

    fn record_outcome(&self, key: &DraftKey, outcome: &SaveOutcome) {
        self.inner.status.send_modify(|status| match outcome {
            SaveOutcome::Saved(at) => {
                status.last_saved_at = Some(*at);
                status.has_error = false;
                status.last_error = None;
            }
            SaveOutcome::Failed(reason) => {
                warn!(key = %key, error = %reason, "auto-save failed, draft kept in memory");
                status.has_error = true;
                status.last_error = Some(reason.clone());
            }
            SaveOutcome::Skipped => {
                status.has_error = true;
                status.last_error = Some(STORAGE_UNAVAILABLE_MESSAGE.to_string());
            }
        });
    }
}

impl<R> std::fmt::Debug for AutoSaveCoordinator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoSaveCoordinator")
            .field("debounce", &self.inner.debounce)
            .field("keys", &self.inner.slots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::event::SaveEventBus;
    use crate::testing::MemoryRepo;

    const FORM: &str = "institution-signup/test";

    fn coordinator(repo: Arc<MemoryRepo>) -> AutoSaveCoordinator<Arc<MemoryRepo>> {
        let store = DraftStore::new(repo, SaveEventBus::default());
        AutoSaveCoordinator::new(store, DEFAULT_DEBOUNCE, ["course_categories".to_string()])
    }

    fn record_with(step: u32, field: &str, value: serde_json::Value) -> DraftRecord {
        let mut record = DraftRecord::new(DraftKey::new(FORM, step));
        record.set_field(field, value);
        record
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_edits_coalesce_into_one_write_after_last_edit() {
        let repo = Arc::new(MemoryRepo::default());
        let autosave = coordinator(repo.clone());
        let key = DraftKey::new(FORM, 1);

        autosave.debounced_save(record_with(1, "institution_name", json!("L")));
        tokio::time::sleep(Duration::from_millis(100)).await;
        autosave.debounced_save(record_with(1, "institution_name", json!("La")));
        tokio::time::sleep(Duration::from_millis(100)).await;
        autosave.debounced_save(record_with(1, "institution_name", json!("Lake")));
        let last_edit = Instant::now();

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(repo.write_count(&key), 0);
        assert!(autosave.has_pending(&key));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(repo.write_count(&key), 1);
        assert_eq!(repo.write_times(&key)[0] - last_edit, DEFAULT_DEBOUNCE);
        assert_eq!(
            repo.stored_field(&key, "institution_name"),
            Some(json!("Lake"))
        );
        assert!(!autosave.has_pending(&key));
        assert!(!autosave.is_dirty(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn different_keys_debounce_independently() {
        let repo = Arc::new(MemoryRepo::default());
        let autosave = coordinator(repo.clone());

        autosave.debounced_save(record_with(1, "city", json!("Pune")));
        autosave.debounced_save(record_with(3, "city", json!("Agra")));
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        assert_eq!(repo.write_count(&DraftKey::new(FORM, 1)), 1);
        assert_eq!(repo.write_count(&DraftKey::new(FORM, 3)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn critical_field_saves_immediately_and_cancels_timer() {
        let repo = Arc::new(MemoryRepo::default());
        let autosave = coordinator(repo.clone());
        let key = DraftKey::new(FORM, 4);

        autosave.debounced_save(record_with(4, "teaching_modes", json!(["online"])));
        let mut record = record_with(4, "teaching_modes", json!(["online"]));
        record.set_field("course_categories", json!(["science"]));
        let outcome = autosave.immediate_save("course_categories", record).await;

        assert!(matches!(outcome, Some(SaveOutcome::Saved(_))));
        assert_eq!(repo.write_count(&key), 1);
        assert!(!autosave.has_pending(&key));

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert_eq!(repo.write_count(&key), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_critical_field_is_deferred() {
        let repo = Arc::new(MemoryRepo::default());
        let autosave = coordinator(repo.clone());
        let key = DraftKey::new(FORM, 2);

        let outcome = autosave
            .immediate_save("email", record_with(2, "email", json!("a@b.in")))
            .await;
        assert!(outcome.is_none());
        assert_eq!(repo.write_count(&key), 0);
        assert!(autosave.has_pending(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn clear_cancels_pending_timer() {
        let repo = Arc::new(MemoryRepo::default());
        let autosave = coordinator(repo.clone());
        let key = DraftKey::new(FORM, 3);

        autosave.debounced_save(record_with(3, "pincode", json!("411001")));
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(autosave.clear(&key).await);

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert_eq!(repo.write_count(&key), 0);
        assert!(!repo.contains(&key));
        assert!(autosave.latest(&key).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn edits_after_clear_are_saved_normally() {
        let repo = Arc::new(MemoryRepo::default());
        let autosave = coordinator(repo.clone());
        let key = DraftKey::new(FORM, 3);

        autosave.debounced_save(record_with(3, "city", json!("Old")));
        autosave.clear(&key).await;
        autosave.debounced_save(record_with(3, "city", json!("New")));
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        assert_eq!(repo.write_count(&key), 1);
        assert_eq!(repo.stored_field(&key, "city"), Some(json!("New")));
    }

    #[tokio::test(start_paused = true)]
    async fn flush_writes_only_dirty_keys() {
        let repo = Arc::new(MemoryRepo::default());
        let autosave = coordinator(repo.clone());

        autosave.save(record_with(1, "city", json!("Pune"))).await;
        autosave.debounced_save(record_with(2, "email", json!("x@y.in")));
        autosave.debounced_save(record_with(3, "city", json!("Agra")));

        assert_eq!(autosave.flush().await, 2);
        assert_eq!(autosave.flush().await, 0);

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert_eq!(repo.write_count(&DraftKey::new(FORM, 1)), 1);
        assert_eq!(repo.write_count(&DraftKey::new(FORM, 2)), 1);
        assert_eq!(repo.write_count(&DraftKey::new(FORM, 3)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_sets_error_until_next_success() {
        let repo = Arc::new(MemoryRepo::default());
        let autosave = coordinator(repo.clone());
        let key = DraftKey::new(FORM, 1);
        assert!(autosave.store().is_available().await);

        repo.set_fail_puts(true);
        let outcome = autosave.save(record_with(1, "city", json!("Pune"))).await;
        assert!(matches!(outcome, SaveOutcome::Failed(_)));
        let status = autosave.status();
        assert!(status.has_error);
        assert!(!status.is_saving);
        assert!(status.last_error.is_some());
        assert!(autosave.is_dirty(&key));
        assert_eq!(
            autosave.latest(&key).unwrap().field("city"),
            Some(&json!("Pune"))
        );

        repo.set_fail_puts(false);
        assert_eq!(autosave.flush().await, 1);
        let status = autosave.status();
        assert!(!status.has_error);
        assert!(status.last_saved_at.is_some());
        assert!(status.last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_storage_keeps_data_in_memory() {
        let repo = Arc::new(MemoryRepo::unavailable());
        let autosave = coordinator(repo.clone());
        let key = DraftKey::new(FORM, 1);

        let outcome = autosave.save(record_with(1, "city", json!("Pune"))).await;
        assert_eq!(outcome, SaveOutcome::Skipped);
        assert!(autosave.status().has_error);
        assert!(autosave.latest(&key).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn status_subscribers_see_saves() {
        let repo = Arc::new(MemoryRepo::default());
        let autosave = coordinator(repo);
        let mut rx = autosave.subscribe_status();

        autosave.save(record_with(1, "city", json!("Pune"))).await;

        assert!(rx.has_changed().unwrap());
        let status = rx.borrow_and_update().clone();
        assert!(status.last_saved_at.is_some());
        assert!(!status.is_saving);
    }

    #[tokio::test(start_paused = true)]
    async fn is_saving_is_reported_while_a_write_is_in_flight() {
        let repo = Arc::new(MemoryRepo::default());
        repo.set_put_delay(Duration::from_millis(500));
        let autosave = coordinator(repo.clone());
        let mut rx = autosave.subscribe_status();
        let key = DraftKey::new(FORM, 1);

        let writer = autosave.clone();
        let handle = tokio::spawn(async move { writer.save(record_with(1, "city", json!("Pune"))).await });

        rx.wait_for(|status| status.is_saving).await.unwrap();
        assert!(!repo.contains(&key));

        assert!(handle.await.unwrap().is_saved());
        let status = rx.borrow_and_update().clone();
        assert!(!status.is_saving);
        assert!(status.last_saved_at.is_some());
        assert!(repo.contains(&key));
    }

    #[test]
    fn from_config_merges_critical_fields() {
        let store = DraftStore::new(Arc::new(MemoryRepo::default()), SaveEventBus::default());
        let form = crate::form::institution_signup_form();
        let config = AutoSaveConfig {
            debounce_ms: 250,
            critical_fields: vec!["facilities".to_string()],
        };
        let autosave = AutoSaveCoordinator::from_config(store, &config, &form);

        assert_eq!(autosave.debounce(), Duration::from_millis(250));
        assert!(autosave.is_critical("course_categories"));
        assert!(autosave.is_critical("facilities"));
        assert!(!autosave.is_critical("city"));
    }
}
