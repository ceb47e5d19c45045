use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{DbError, DocumentBatch, DocumentOp, DocumentStore};

/// In-process document store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<BTreeMap<String, serde_json::Value>>,
}

impl MemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, DbError> {
        Ok(self.documents.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> Result<(), DbError> {
        self.documents.write().await.insert(key.to_owned(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, DbError> {
        Ok(self.documents.write().await.remove(key).is_some())
    }

    async fn apply(&self, batch: DocumentBatch) -> Result<(), DbError> {
        let mut documents = self.documents.write().await;
        for (key, op) in batch {
            match op {
                DocumentOp::Put(value) => {
                    documents.insert(key, value);
                }
                DocumentOp::Delete => {
                    documents.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn list_keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>, DbError> {
        let documents = self.documents.read().await;
        Ok(documents
            .range(prefix.to_owned()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}
