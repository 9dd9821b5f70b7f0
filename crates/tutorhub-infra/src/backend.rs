//! Runtime selection of the draft storage backend.

use std::path::Path;

use tutorhub_core::repository::draft::DraftRepository;
use tutorhub_types::config::{StorageBackend, StorageConfig};
use tutorhub_types::error::StorageError;

use crate::memory::InMemoryDraftRepository;
use crate::sqlite::draft::SqliteDraftRepository;
use crate::sqlite::pool::{DatabasePool, database_url};

/// The configured draft repository.
///
/// An enum rather than a trait object: `DraftRepository` uses native async
/// fns and is not dyn-compatible.
pub enum DraftBackend {
    Sqlite(SqliteDraftRepository),
    Memory(InMemoryDraftRepository),
}

impl DraftBackend {
    /// Open the backend named by `config`, creating the SQLite database in
    /// `data_dir` when needed.
    pub async fn open(config: &StorageConfig, data_dir: &Path) -> Result<Self, StorageError> {
        match config.backend {
            StorageBackend::Sqlite => {
                tokio::fs::create_dir_all(data_dir)
                    .await
                    .map_err(|e| StorageError::Unavailable(e.to_string()))?;
                let pool = DatabasePool::new(&database_url(data_dir))
                    .await
                    .map_err(|e| StorageError::Unavailable(e.to_string()))?;
                tracing::debug!(data_dir = %data_dir.display(), "opened sqlite draft storage");
                Ok(Self::Sqlite(SqliteDraftRepository::new(pool)))
            }
            StorageBackend::Memory => {
                tracing::debug!(quota_bytes = ?config.quota_bytes, "using in-memory draft storage");
                Ok(Self::Memory(InMemoryDraftRepository::with_quota(
                    config.quota_bytes,
                )))
            }
        }
    }

    pub fn kind(&self) -> StorageBackend {
        match self {
            Self::Sqlite(_) => StorageBackend::Sqlite,
            Self::Memory(_) => StorageBackend::Memory,
        }
    }

    /// The SQLite repository, when that is the active backend.
    pub fn as_sqlite(&self) -> Option<&SqliteDraftRepository> {
        match self {
            Self::Sqlite(repo) => Some(repo),
            Self::Memory(_) => None,
        }
    }
}

impl DraftRepository for DraftBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self {
            Self::Sqlite(repo) => repo.get(key).await,
            Self::Memory(repo) => repo.get(key).await,
        }
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        match self {
            Self::Sqlite(repo) => repo.put(key, value).await,
            Self::Memory(repo) => repo.put(key, value).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        match self {
            Self::Sqlite(repo) => repo.delete(key).await,
            Self::Memory(repo) => repo.delete(key).await,
        }
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        match self {
            Self::Sqlite(repo) => repo.list_keys(prefix).await,
            Self::Memory(repo) => repo.list_keys(prefix).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_memory_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            backend: StorageBackend::Memory,
            quota_bytes: Some(64),
        };
        let backend = DraftBackend::open(&config, dir.path()).await.unwrap();
        assert_eq!(backend.kind(), StorageBackend::Memory);
        assert!(backend.as_sqlite().is_none());

        backend.put("f::step-1", "{}").await.unwrap();
        assert_eq!(backend.list_keys("f::").await.unwrap(), vec!["f::step-1"]);
    }

    #[tokio::test]
    async fn test_open_sqlite_backend_creates_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("nested");
        let backend = DraftBackend::open(&StorageConfig::default(), &data_dir)
            .await
            .unwrap();
        assert_eq!(backend.kind(), StorageBackend::Sqlite);
        assert!(data_dir.join(crate::sqlite::pool::DATABASE_FILE).exists());

        backend.put("f::step-2", "{}").await.unwrap();
        assert_eq!(backend.get("f::step-2").await.unwrap().as_deref(), Some("{}"));
    }
}
