//! SQLite implementation of `DraftRepository`.
//!
//! Drafts live in the `form_drafts` table, one row per storage key, written
//! with INSERT OR REPLACE so the last write wins.

use chrono::{DateTime, Utc};
use sqlx::Row;

use tutorhub_core::repository::draft::DraftRepository;
use tutorhub_types::error::StorageError;

use crate::sqlite::pool::DatabasePool;

/// Metadata of a stored draft, for maintenance listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDraftSummary {
    pub storage_key: String,
    pub size_bytes: usize,
    pub updated_at: DateTime<Utc>,
}

/// SQLite-backed draft persistence.
#[derive(Clone)]
pub struct SqliteDraftRepository {
    pool: DatabasePool,
}

impl SqliteDraftRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Stored drafts whose key starts with `prefix`, most recently updated first.
    pub async fn list_summaries(&self, prefix: &str) -> Result<Vec<StoredDraftSummary>, StorageError> {
        let rows = sqlx::query(
            "SELECT storage_key, length(CAST(payload AS BLOB)) AS size_bytes, updated_at FROM form_drafts
             WHERE substr(storage_key, 1, length(?1)) = ?1
             ORDER BY updated_at DESC",
        )
        .bind(prefix)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(backend)?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in &rows {
            let storage_key: String = row.try_get("storage_key").map_err(backend)?;
            let size_bytes: i64 = row.try_get("size_bytes").map_err(backend)?;
            let updated_at: String = row.try_get("updated_at").map_err(backend)?;
            summaries.push(StoredDraftSummary {
                storage_key,
                size_bytes: size_bytes.max(0) as usize,
                updated_at: parse_datetime(&updated_at)?,
            });
        }
        Ok(summaries)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn backend(e: sqlx::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Backend(format!("invalid datetime: {e}")))
}

// ---------------------------------------------------------------------------
// DraftRepository implementation
// ---------------------------------------------------------------------------

impl DraftRepository for SqliteDraftRepository {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let row = sqlx::query("SELECT payload FROM form_drafts WHERE storage_key = ?")
            .bind(key)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(backend)?;

        row.map(|row| row.try_get::<String, _>("payload").map_err(backend))
            .transpose()
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT OR REPLACE INTO form_drafts (storage_key, payload, updated_at) VALUES (?, ?, ?)",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool.writer)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM form_drafts WHERE storage_key = ?")
            .bind(key)
            .execute(&self.pool.writer)
            .await
            .map_err(backend)?;

        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT storage_key FROM form_drafts
             WHERE substr(storage_key, 1, length(?1)) = ?1
             ORDER BY storage_key",
        )
        .bind(prefix)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(backend)?;

        Ok(rows.into_iter().map(|(key,)| key).collect())
    }
}

#[cfg(test)]
mod tests {
    use tutorhub_core::draft::DraftStore;
    use tutorhub_core::event::SaveEventBus;
    use tutorhub_types::draft::{DraftKey, DraftRecord};

    use super::*;
    use crate::sqlite::pool::database_url;

    async fn test_repo() -> (SqliteDraftRepository, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = DatabasePool::new(&database_url(dir.path())).await.unwrap();
        (SqliteDraftRepository::new(pool), dir)
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let (repo, _dir) = test_repo().await;

        assert!(repo.get("f::step-1").await.unwrap().is_none());
        repo.put("f::step-1", r#"{"a":1}"#).await.unwrap();
        repo.put("f::step-1", r#"{"a":2}"#).await.unwrap();
        assert_eq!(repo.get("f::step-1").await.unwrap().as_deref(), Some(r#"{"a":2}"#));

        repo.delete("f::step-1").await.unwrap();
        repo.delete("f::step-1").await.unwrap();
        assert!(repo.get("f::step-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_keys_matches_prefix_literally() {
        let (repo, _dir) = test_repo().await;
        for key in ["a/1::step-2", "a/1::step-1", "a/10::step-1", "b%::step-1"] {
            repo.put(key, "{}").await.unwrap();
        }

        assert_eq!(
            repo.list_keys("a/1::step-").await.unwrap(),
            vec!["a/1::step-1", "a/1::step-2"]
        );
        assert_eq!(repo.list_keys("b%").await.unwrap(), vec!["b%::step-1"]);
        assert_eq!(repo.list_keys("").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_list_summaries_reports_size() {
        let (repo, _dir) = test_repo().await;
        repo.put("f::step-3", "12345").await.unwrap();

        let summaries = repo.list_summaries("f::").await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].storage_key, "f::step-3");
        assert_eq!(summaries[0].size_bytes, 5);
    }

    #[tokio::test]
    async fn test_draft_store_roundtrip_through_sqlite() {
        let (repo, _dir) = test_repo().await;
        let store = DraftStore::new(repo, SaveEventBus::default());
        let key = DraftKey::new("institution-signup/s1", 3);
        let mut record = DraftRecord::new(key.clone());
        record.visited = true;
        record.set_field("city", serde_json::json!("Mysuru"));

        assert!(store.is_available().await);
        assert!(store.save(&record).await.is_saved());
        let restored = store.restore(&key).await.unwrap();
        assert_eq!(restored.data, record.data);

        assert_eq!(store.clear_form("institution-signup/s1").await, 1);
        assert!(store.restore(&key).await.is_none());
    }
}
