//! Draft store: serializes step drafts into versioned envelopes and writes
//! them to a [`DraftRepository`].
//!
//! The store never returns storage errors to its callers. Failures are
//! logged, reported through the [`SaveEventBus`], and surfaced to the
//! auto-save coordinator as a [`SaveOutcome`]. A failed write never loses
//! data because the caller still holds the in-memory record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use tutorhub_types::draft::{DraftEnvelope, DraftKey, DraftRecord};
use tutorhub_types::error::StorageError;
use tutorhub_types::event::SaveEvent;

use crate::event::SaveEventBus;
use crate::repository::draft::DraftRepository;

/// Key written and removed once to check that storage accepts writes.
pub const PROBE_KEY: &str = "__tutorhub_storage_probe__";

/// Result of a single save attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The draft was written at the given time.
    Saved(DateTime<Utc>),
    /// Storage is unavailable for this session; nothing was written.
    Skipped,
    /// The write failed with the given reason.
    Failed(String),
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved(_))
    }
}

/// Versioned, fault-tolerant persistence for step drafts.
pub struct DraftStore<R> {
    repo: R,
    events: SaveEventBus,
    availability: OnceCell<Result<(), String>>,
}

impl<R: DraftRepository> DraftStore<R> {
    pub fn new(repo: R, events: SaveEventBus) -> Self {
        Self {
            repo,
            events,
            availability: OnceCell::new(),
        }
    }

    pub fn events(&self) -> &SaveEventBus {
        &self.events
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Whether durable storage accepts writes.
    ///
    /// The probe runs on first use and its result is cached for the lifetime
    /// of the store, so `StorageUnavailable` is published at most once.
    pub async fn is_available(&self) -> bool {
        self.availability
            .get_or_init(|| self.probe())
            .await
            .is_ok()
    }

    async fn probe(&self) -> Result<(), String> {
        let result = match self.repo.put(PROBE_KEY, "1").await {
            Ok(()) => self.repo.delete(PROBE_KEY).await,
            Err(e) => Err(e),
        };

        result.map_err(|e| {
            let reason = e.to_string();
            warn!(error = %reason, "draft storage unavailable, continuing without persistence");
            self.events.publish(SaveEvent::StorageUnavailable {
                reason: reason.clone(),
            });
            reason
        })
    }

    // -----------------------------------------------------------------------
    // Save / restore
    // -----------------------------------------------------------------------

    /// Serialize `record` and write it under its storage key.
    pub async fn save(&self, record: &DraftRecord) -> SaveOutcome {
        if !self.is_available().await {
            return SaveOutcome::Skipped;
        }

        let key = record.key.storage_key();
        let envelope = DraftEnvelope::wrap(record);
        let payload = match serde_json::to_string(&envelope) {
            Ok(payload) => payload,
            Err(e) => return self.save_failed(key, StorageError::Serialization(e.to_string())),
        };

        match self.repo.put(&key, &payload).await {
            Ok(()) => {
                debug!(key = %key, bytes = payload.len(), "draft saved");
                self.events.publish(SaveEvent::Saved {
                    key,
                    at: envelope.saved_at,
                });
                SaveOutcome::Saved(envelope.saved_at)
            }
            Err(e) => self.save_failed(key, e),
        }
    }

    fn save_failed(&self, key: String, err: StorageError) -> SaveOutcome {
        let reason = err.to_string();
        warn!(key = %key, error = %reason, "draft save failed");
        self.events.publish(SaveEvent::SaveFailed {
            key,
            reason: reason.clone(),
        });
        SaveOutcome::Failed(reason)
    }

    /// Read the draft for `key`.
    ///
    /// Missing, unreadable, corrupt, or version-mismatched drafts are all
    /// reported as `None`.
    pub async fn restore(&self, key: &DraftKey) -> Option<DraftRecord> {
        if !self.is_available().await {
            return None;
        }

        let storage_key = key.storage_key();
        let raw = match self.repo.get(&storage_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %storage_key, error = %e, "draft read failed");
                return None;
            }
        };

        let envelope: DraftEnvelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.discard(storage_key, format!("corrupt draft: {e}"));
                return None;
            }
        };

        match envelope.unwrap_for(key) {
            Ok(record) => Some(record),
            Err(mismatch) => {
                self.discard(storage_key, mismatch.to_string());
                None
            }
        }
    }

    fn discard(&self, key: String, reason: String) {
        warn!(key = %key, reason = %reason, "stored draft discarded");
        self.events
            .publish(SaveEvent::RestoreDiscarded { key, reason });
    }

    /// Restore every step `1..=step_count` of `form` that has a usable draft.
    pub async fn restore_form(&self, form: &str, step_count: u32) -> BTreeMap<u32, DraftRecord> {
        let mut records = BTreeMap::new();
        for step in 1..=step_count {
            if let Some(record) = self.restore(&DraftKey::new(form, step)).await {
                records.insert(step, record);
            }
        }
        records
    }

    // -----------------------------------------------------------------------
    // Clear
    // -----------------------------------------------------------------------

    /// Remove the draft for `key`. Clearing an absent draft succeeds.
    ///
    /// Returns `false` only when storage reported an error.
    pub async fn clear(&self, key: &DraftKey) -> bool {
        if !self.is_available().await {
            return true;
        }

        let storage_key = key.storage_key();
        match self.repo.delete(&storage_key).await {
            Ok(()) => {
                debug!(key = %storage_key, "draft cleared");
                self.events.publish(SaveEvent::Cleared { key: storage_key });
                true
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(key = %storage_key, error = %reason, "draft clear failed");
                self.events.publish(SaveEvent::ClearFailed {
                    key: storage_key,
                    reason,
                });
                false
            }
        }
    }

    /// Remove every stored step of `form`. Returns the number of drafts removed.
    pub async fn clear_form(&self, form: &str) -> usize {
        let keys = match self.stored_keys(&DraftKey::form_prefix(form)).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(form = %form, error = %e, "failed to list drafts for clearing");
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys.iter().filter(|k| k.form == form) {
            if self.clear(key).await {
                removed += 1;
            }
        }
        removed
    }

    /// Keys of stored drafts whose storage key starts with `prefix`.
    ///
    /// Entries that are not draft keys (such as the probe key) are skipped.
    pub async fn stored_keys(&self, prefix: &str) -> Result<Vec<DraftKey>, StorageError> {
        let raw = self.repo.list_keys(prefix).await?;
        Ok(raw.iter().filter_map(|k| k.parse().ok()).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::testing::MemoryRepo;

    fn store_with(repo: Arc<MemoryRepo>) -> DraftStore<Arc<MemoryRepo>> {
        DraftStore::new(repo, SaveEventBus::default())
    }

    fn record(form: &str, step: u32) -> DraftRecord {
        let mut record = DraftRecord::new(DraftKey::new(form, step));
        record.visited = true;
        record.set_field("city", json!("Pune"));
        record
    }

    #[tokio::test]
    async fn save_then_restore_returns_same_data() {
        let repo = Arc::new(MemoryRepo::default());
        let store = store_with(repo.clone());
        let rec = record("signup/a", 3);

        assert!(store.save(&rec).await.is_saved());
        let restored = store.restore(&rec.key).await.unwrap();
        assert_eq!(restored.data, rec.data);
        assert!(restored.visited);
        assert_eq!(repo.user_key_count(), 1);
    }

    #[tokio::test]
    async fn restore_missing_is_none() {
        let store = store_with(Arc::new(MemoryRepo::default()));
        assert!(store.restore(&DraftKey::new("signup/a", 1)).await.is_none());
    }

    #[tokio::test]
    async fn corrupt_draft_is_treated_as_absent() {
        let repo = Arc::new(MemoryRepo::default());
        let store = store_with(repo.clone());
        let key = DraftKey::new("signup/a", 2);
        repo.insert_raw(&key, "{not json");
        let mut rx = store.events().subscribe();

        assert!(store.restore(&key).await.is_none());
        assert!(matches!(
            rx.try_recv().unwrap(),
            SaveEvent::RestoreDiscarded { .. }
        ));
    }

    #[tokio::test]
    async fn draft_from_other_schema_version_is_discarded() {
        let repo = Arc::new(MemoryRepo::default());
        let store = store_with(repo.clone());
        let key = DraftKey::new("signup/a", 1);
        let mut envelope = DraftEnvelope::wrap(&record("signup/a", 1));
        envelope.schema_version = 99;
        repo.insert_raw(&key, &serde_json::to_string(&envelope).unwrap());

        assert!(store.restore(&key).await.is_none());
    }

    #[tokio::test]
    async fn unavailable_storage_is_reported_once() {
        let store = store_with(Arc::new(MemoryRepo::unavailable()));
        let mut rx = store.events().subscribe();

        assert_eq!(store.save(&record("f", 1)).await, SaveOutcome::Skipped);
        assert_eq!(store.save(&record("f", 2)).await, SaveOutcome::Skipped);
        assert!(store.restore(&DraftKey::new("f", 1)).await.is_none());
        assert!(store.clear(&DraftKey::new("f", 1)).await);

        assert!(matches!(
            rx.try_recv().unwrap(),
            SaveEvent::StorageUnavailable { .. }
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_write_publishes_event_and_returns_failed() {
        let repo = Arc::new(MemoryRepo::default());
        let store = store_with(repo.clone());
        assert!(store.is_available().await);
        repo.set_fail_puts(true);
        let mut rx = store.events().subscribe();

        let outcome = store.save(&record("f", 1)).await;
        assert!(matches!(outcome, SaveOutcome::Failed(ref r) if r.contains("quota")));
        assert!(matches!(rx.try_recv().unwrap(), SaveEvent::SaveFailed { .. }));
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let repo = Arc::new(MemoryRepo::default());
        let store = store_with(repo.clone());
        let rec = record("f", 4);
        store.save(&rec).await;

        assert!(store.clear(&rec.key).await);
        assert!(store.clear(&rec.key).await);
        assert!(!repo.contains(&rec.key));
    }

    #[tokio::test]
    async fn restore_form_and_clear_form_stay_within_form() {
        let repo = Arc::new(MemoryRepo::default());
        let store = store_with(repo.clone());
        for step in [1, 2, 4] {
            store.save(&record("signup/a", step)).await;
        }
        store.save(&record("signup/b", 1)).await;

        let restored = store.restore_form("signup/a", 7).await;
        assert_eq!(restored.keys().copied().collect::<Vec<_>>(), vec![1, 2, 4]);

        assert_eq!(store.clear_form("signup/a").await, 3);
        assert!(store.restore_form("signup/a", 7).await.is_empty());
        assert!(repo.contains(&DraftKey::new("signup/b", 1)));
    }
}
