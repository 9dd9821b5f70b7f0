//! Draft repository trait: the durable keyed store that holds in-progress
//! wizard drafts.

use std::future::Future;
use std::sync::Arc;

use tutorhub_types::error::StorageError;

/// Durable keyed storage for serialized drafts.
///
/// Values are opaque strings (JSON envelopes written by the draft store).
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait DraftRepository: Send + Sync {
    /// Read the value stored under `key`. Returns `None` if absent.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StorageError>> + Send;

    /// Write `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: &str) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Remove `key`. No-op if the key does not exist.
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// List every stored key starting with `prefix`, sorted ascending.
    fn list_keys(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<String>, StorageError>> + Send;
}

impl<T: DraftRepository> DraftRepository for Arc<T> {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StorageError>> + Send {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &str) -> impl Future<Output = Result<(), StorageError>> + Send {
        (**self).put(key, value)
    }

    fn delete(&self, key: &str) -> impl Future<Output = Result<(), StorageError>> + Send {
        (**self).delete(key)
    }

    fn list_keys(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<String>, StorageError>> + Send {
        (**self).list_keys(prefix)
    }
}
