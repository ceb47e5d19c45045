//! The key/value document seam every backend implements.

use async_trait::async_trait;

use crate::DbError;

/// One change in a batch passed to [`DocumentStore::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentOp {
    Put(serde_json::Value),
    Delete,
}

/// Keyed changes, applied in order.
pub type DocumentBatch = Vec<(String, DocumentOp)>;

/// A flat namespace of JSON documents addressed by string keys.
///
/// Each `put` and `delete` is atomic for its key: a reader sees either the
/// previous document or the new one, never a partial write. `apply` extends
/// that to a whole batch.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch the document at `key`.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, DbError>;

    /// Insert or replace the document at `key`.
    async fn put(&self, key: &str, value: serde_json::Value) -> Result<(), DbError>;

    /// Remove the document at `key`. Returns `true` if it existed.
    async fn delete(&self, key: &str) -> Result<bool, DbError>;

    /// Apply every change in `batch` as one unit: readers see all of it or
    /// none of it, and a failure leaves the store as it was.
    async fn apply(&self, batch: DocumentBatch) -> Result<(), DbError>;

    /// Every key starting with `prefix`, sorted in ascending byte order.
    async fn list_keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>, DbError>;

    /// Verify the backend is reachable.
    async fn ping(&self) -> Result<(), DbError> {
        Ok(())
    }
}
