//! In-memory draft repository.
//!
//! Models browser-style key/value storage: process-local, optionally bounded
//! by a byte quota. Used for ephemeral sessions and as the fallback when no
//! database is wanted.

use dashmap::DashMap;

use tutorhub_core::repository::draft::DraftRepository;
use tutorhub_types::error::StorageError;

/// DashMap-backed draft storage with an optional byte quota.
///
/// The quota counts key and value bytes, the way browser storage does.
#[derive(Debug, Default)]
pub struct InMemoryDraftRepository {
    entries: DashMap<String, String>,
    quota_bytes: Option<usize>,
}

impl InMemoryDraftRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: Option<usize>) -> Self {
        Self {
            entries: DashMap::new(),
            quota_bytes,
        }
    }

    /// Bytes currently held across all keys.
    pub fn used_bytes(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| entry.key().len() + entry.value().len())
            .sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DraftRepository for InMemoryDraftRepository {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(quota) = self.quota_bytes {
            let replaced = self
                .entries
                .get(key)
                .map(|v| key.len() + v.value().len())
                .unwrap_or(0);
            let used = self.used_bytes() - replaced + key.len() + value.len();
            if used > quota {
                tracing::warn!(key, used, quota, "draft storage quota exceeded");
                return Err(StorageError::QuotaExceeded { used, quota });
            }
        }

        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let repo = InMemoryDraftRepository::new();
        repo.put("f::step-1", "a").await.unwrap();
        assert_eq!(repo.get("f::step-1").await.unwrap().as_deref(), Some("a"));

        repo.delete("f::step-1").await.unwrap();
        repo.delete("f::step-1").await.unwrap();
        assert!(repo.get("f::step-1").await.unwrap().is_none());
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_list_keys_sorted_by_prefix() {
        let repo = InMemoryDraftRepository::new();
        for key in ["f::step-3", "f::step-1", "g::step-1"] {
            repo.put(key, "{}").await.unwrap();
        }
        assert_eq!(
            repo.list_keys("f::").await.unwrap(),
            vec!["f::step-1", "f::step-3"]
        );
    }

    #[tokio::test]
    async fn test_quota_rejects_oversized_write() {
        let repo = InMemoryDraftRepository::with_quota(Some(20));
        repo.put("k1", "0123456789").await.unwrap();

        let err = repo.put("k2", "0123456789").await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::QuotaExceeded { used: 24, quota: 20 }
        ));
        assert!(repo.get("k2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_quota_counts_replacement_not_addition() {
        let repo = InMemoryDraftRepository::with_quota(Some(12));
        repo.put("k1", "0123456789").await.unwrap();
        repo.put("k1", "9876543210").await.unwrap();
        assert_eq!(repo.used_bytes(), 12);
    }
}
